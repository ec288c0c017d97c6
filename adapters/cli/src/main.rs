#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless Grid Duel match.
//!
//! Two autopilots play against each other through the authoritative world
//! while a replication system keeps one client replica per session in sync.

mod match_summary;

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use gridduel_core::{Command, Event, GameConfig, PlayerId, SessionId, UnitRecord};
use gridduel_system_autopilot::{Autopilot, MatchView};
use gridduel_system_replication::{decode, encode, Replica, Replication, ReplicationView};
use gridduel_world::{self as world, query, World};
use match_summary::MatchSummary;
use tracing_subscriber::EnvFilter;

/// Headless self-play for the Grid Duel combat core.
#[derive(Debug, Parser)]
#[command(name = "gridduel", version)]
struct Args {
    /// TOML file with match settings. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the obstacle placement seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated seconds advanced per scheduler tick.
    #[arg(long, default_value_t = 1.5)]
    tick_secs: f32,
    /// Scheduler ticks to run before giving up on the match.
    #[arg(long, default_value_t = 10_000)]
    max_ticks: u32,
    /// Prints a previously emitted summary string instead of playing.
    #[arg(long, conflicts_with_all = ["config", "seed"])]
    inspect: Option<String>,
}

/// Entry point for the Grid Duel command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Some(encoded) = &args.inspect {
        let summary = MatchSummary::decode(encoded).context("invalid match summary")?;
        print_summary(&summary);
        return Ok(());
    }

    let config = load_config(&args)?;
    let mut world = World::new(config).context("failed to build the combat field")?;
    println!("{}", query::welcome_banner(&world));
    let stats = query::field_stats(&world);
    tracing::info!(
        width = stats.width,
        height = stats.height,
        obstacles = stats.obstacle_count,
        connected = stats.spawns_connected(),
        "field ready"
    );

    let summary = play(&mut world, &args)?;
    print_summary(&summary);
    println!("{}", summary.encode().context("failed to encode match summary")?);
    Ok(())
}

fn load_config(args: &Args) -> Result<GameConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => GameConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.field_seed = seed;
    }
    config.validate().context("invalid match settings")?;
    Ok(config)
}

fn play(world: &mut World, args: &Args) -> Result<MatchSummary> {
    let tick = Duration::try_from_secs_f32(args.tick_secs)
        .with_context(|| format!("invalid tick length {}", args.tick_secs))?;
    let sessions = [SessionId::new(1), SessionId::new(2)];
    let mut pilots = PlayerId::ALL.map(Autopilot::new);
    let mut replication = Replication::default();
    let mut replicas = sessions.map(|session| (session, Replica::new()));

    let mut pending = Vec::new();
    for session in sessions {
        world::apply(world, Command::ConnectPlayer { session }, &mut pending);
    }

    for _ in 0..args.max_ticks {
        let units: Vec<UnitRecord> = query::units(world).cloned().collect();
        replicate(world, &units, &pending, &mut replication, &mut replicas)?;

        let mut commands = Vec::new();
        for pilot in &mut pilots {
            pilot.handle(
                &pending,
                MatchView {
                    state: query::state(world),
                    units: &units,
                    field: query::field(world),
                    line_of_sight_required: query::config(world).validate_line_of_sight,
                },
                &mut commands,
            );
        }

        pending.clear();
        for command in commands {
            world::apply(world, command, &mut pending);
        }
        if let Some(end) = query::end_of_match(world) {
            let units: Vec<UnitRecord> = query::units(world).cloned().collect();
            replicate(world, &units, &pending, &mut replication, &mut replicas)?;
            log_rejections(&pending);
            let field = query::field(world);
            return Ok(MatchSummary::capture(
                field.width(),
                field.height(),
                end,
                &units,
            ));
        }
        log_rejections(&pending);
        world::apply(world, Command::Tick { dt: tick }, &mut pending);
    }

    bail!("match did not finish within {} ticks", args.max_ticks)
}

fn replicate(
    world: &World,
    units: &[UnitRecord],
    events: &[Event],
    replication: &mut Replication,
    replicas: &mut [(SessionId, Replica)],
) -> Result<()> {
    let mut outbound = Vec::new();
    replication.handle(
        events,
        ReplicationView {
            version: query::version(world),
            state: query::state(world),
            units,
        },
        &mut outbound,
    );
    for message in outbound {
        let bytes = encode(&message.message)?;
        if let Some((_, replica)) = replicas.iter_mut().find(|(id, _)| *id == message.session) {
            replica
                .apply(decode(&bytes)?)
                .with_context(|| format!("replica {} fell out of sync", message.session.get()))?;
        }
    }
    Ok(())
}

fn log_rejections(events: &[Event]) {
    for event in events {
        if let Event::CommandRejected {
            player,
            action,
            outcome,
        } = event
        {
            tracing::warn!(?player, ?action, reason = outcome.message(), "autopilot command rejected");
        }
    }
}

fn print_summary(summary: &MatchSummary) {
    match summary.winner {
        Some(player) => println!(
            "{player:?} wins on turn {} ({:?})",
            summary.final_turn, summary.reason
        ),
        None => println!(
            "draw on turn {} ({:?})",
            summary.final_turn, summary.reason
        ),
    }
    println!("field {}x{}", summary.width, summary.height);
    for survivor in &summary.survivors {
        println!(
            "  {:?} {:?} at ({}, {})",
            survivor.owner,
            survivor.kind,
            survivor.position.column(),
            survivor.position.row()
        );
    }
}
