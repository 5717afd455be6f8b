use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine state as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    None,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl MachineState {
    /// Map a virtual machine instance phase to a machine state.
    pub fn from_phase(phase: &str) -> Self {
        match phase {
            "Pending" | "Scheduling" | "Scheduled" => Self::Starting,
            "Running" => Self::Running,
            "Succeeded" => Self::Stopping,
            "Failed" => Self::Error,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
