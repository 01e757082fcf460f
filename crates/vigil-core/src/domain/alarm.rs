//! Alarm snapshots: standing conditions the server has raised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alarm severity, in the server's four-color scheme.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum AlarmSeverity {
    Gray,
    Green,
    Yellow,
    Red,
}

impl AlarmSeverity {
    /// Marker used when rendering an alarm line.
    pub fn marker(self) -> &'static str {
        match self {
            AlarmSeverity::Gray => "[gray]",
            AlarmSeverity::Green => "[green]",
            AlarmSeverity::Yellow => "[yellow]",
            AlarmSeverity::Red => "[red]",
        }
    }
}

/// Point-in-time view of one active alarm. Ephemeral, like `TaskSnapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSnapshot {
    pub description: String,

    /// Name of the entity the alarm is raised against.
    pub entity: String,

    pub severity: AlarmSeverity,

    pub raised_at: DateTime<Utc>,
}
