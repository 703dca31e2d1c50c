//! Log output selection shared by the monitor binary and embedding hosts.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output encodings understood by the telemetry layer.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for collectors.
    #[default]
    Json,
    /// Single human-readable line per event.
    Compact,
}

/// Error returned when a [`LogFormat`] name is not recognised.
pub type LogFormatParseError = strum::ParseError;
