use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use gridduel_core::{CellCoord, EndOfMatch, EndReason, PlayerId, UnitKind, UnitRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SUMMARY_DOMAIN: &str = "gridduel";
const SUMMARY_VERSION: &str = "v1";

/// Identifier prefix emitted before the encoded summary payload.
pub(crate) const SUMMARY_HEADER: &str = "gridduel:v1";
const FIELD_DELIMITER: char = ':';

/// Outcome of a finished match, shareable as a single line of text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct MatchSummary {
    /// Number of columns on the combat field.
    pub width: u32,
    /// Number of rows on the combat field.
    pub height: u32,
    /// Winning side, absent for a draw.
    pub winner: Option<PlayerId>,
    /// Why the match ended.
    pub reason: EndReason,
    /// Round in which the match ended.
    pub final_turn: u32,
    /// Units still standing when the match ended.
    pub survivors: Vec<Survivor>,
}

/// Unit left on the field at the end of a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Survivor {
    /// Side the unit fought for.
    pub owner: PlayerId,
    /// Archetype of the unit.
    pub kind: UnitKind,
    /// Final cell occupied by the unit.
    pub position: CellCoord,
}

#[derive(Serialize, Deserialize)]
struct SerializableSummary {
    winner: Option<PlayerId>,
    reason: EndReason,
    final_turn: u32,
    survivors: Vec<Survivor>,
}

impl MatchSummary {
    /// Captures the end-of-match signal together with the surviving roster.
    pub(crate) fn capture<'a>(
        width: u32,
        height: u32,
        end: EndOfMatch,
        units: impl IntoIterator<Item = &'a UnitRecord>,
    ) -> Self {
        Self {
            width,
            height,
            winner: end.winner,
            reason: end.reason,
            final_turn: end.final_turn,
            survivors: units
                .into_iter()
                .map(|unit| Survivor {
                    owner: unit.owner,
                    kind: unit.kind,
                    position: unit.position,
                })
                .collect(),
        }
    }

    /// Encodes the summary into a single-line string.
    pub(crate) fn encode(&self) -> Result<String, SummaryTransferError> {
        let payload = SerializableSummary {
            winner: self.winner,
            reason: self.reason,
            final_turn: self.final_turn,
            survivors: self.survivors.clone(),
        };
        let json = serde_json::to_vec(&payload).map_err(SummaryTransferError::InvalidPayload)?;
        let encoded = STANDARD_NO_PAD.encode(json);
        Ok(format!(
            "{SUMMARY_HEADER}:{}x{}:{encoded}",
            self.width, self.height
        ))
    }

    /// Decodes a summary from its string representation.
    pub(crate) fn decode(value: &str) -> Result<Self, SummaryTransferError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SummaryTransferError::EmptyPayload);
        }

        let mut parts = trimmed.split(FIELD_DELIMITER);
        let domain = parts.next().ok_or(SummaryTransferError::MissingPrefix)?;
        let version = parts.next().ok_or(SummaryTransferError::MissingVersion)?;
        let dimensions = parts
            .next()
            .ok_or(SummaryTransferError::MissingDimensions)?;
        let payload = parts.next().ok_or(SummaryTransferError::MissingPayload)?;

        if domain != SUMMARY_DOMAIN {
            return Err(SummaryTransferError::InvalidPrefix(domain.to_owned()));
        }
        if version != SUMMARY_VERSION {
            return Err(SummaryTransferError::UnsupportedVersion(version.to_owned()));
        }

        let (width, height) = parse_dimensions(dimensions)?;
        let bytes = STANDARD_NO_PAD
            .decode(payload.as_bytes())
            .map_err(SummaryTransferError::InvalidEncoding)?;
        let decoded: SerializableSummary =
            serde_json::from_slice(&bytes).map_err(SummaryTransferError::InvalidPayload)?;

        if let Some(outside) = decoded
            .survivors
            .iter()
            .find(|survivor| survivor.position.column() >= width || survivor.position.row() >= height)
        {
            return Err(SummaryTransferError::SurvivorOutOfBounds(outside.position));
        }

        Ok(Self {
            width,
            height,
            winner: decoded.winner,
            reason: decoded.reason,
            final_turn: decoded.final_turn,
            survivors: decoded.survivors,
        })
    }
}

/// Errors that can occur while transferring match summaries.
#[derive(Debug, Error)]
pub(crate) enum SummaryTransferError {
    /// The provided string was empty or contained only whitespace.
    #[error("summary string was empty")]
    EmptyPayload,
    /// The prefix segment was missing.
    #[error("summary string is missing the prefix")]
    MissingPrefix,
    /// The version segment was missing.
    #[error("summary string is missing the version")]
    MissingVersion,
    /// The field dimensions were missing.
    #[error("summary string is missing the field dimensions")]
    MissingDimensions,
    /// The payload segment was missing.
    #[error("summary string is missing the payload")]
    MissingPayload,
    /// The prefix segment did not name this game.
    #[error("summary prefix '{0}' is not supported")]
    InvalidPrefix(String),
    /// The version identifier is not understood.
    #[error("summary version '{0}' is not supported")]
    UnsupportedVersion(String),
    /// The field dimensions could not be parsed.
    #[error("could not parse field dimensions '{0}'")]
    InvalidDimensions(String),
    /// A survivor lies outside the stated field.
    #[error("survivor at {0:?} lies outside the field")]
    SurvivorOutOfBounds(CellCoord),
    /// The base64 payload could not be decoded.
    #[error("could not decode summary payload")]
    InvalidEncoding(#[source] base64::DecodeError),
    /// The payload could not be (de)serialised.
    #[error("could not process summary payload")]
    InvalidPayload(#[source] serde_json::Error),
}

fn parse_dimensions(dimensions: &str) -> Result<(u32, u32), SummaryTransferError> {
    let invalid = || SummaryTransferError::InvalidDimensions(dimensions.to_owned());
    let (width, height) = dimensions.split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = width.trim().parse::<u32>().map_err(|_| invalid())?;
    let height = height.trim().parse::<u32>().map_err(|_| invalid())?;

    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}
