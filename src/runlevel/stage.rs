//! Runlevel stage definitions.

use serde::Serialize;
use std::fmt;

/// Ordered bootstrap phase gating subsystem availability.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunlevelStage {
    Offline = 0,
    CoreObject = 1,
    Initializing = 2,
    ShellAccess = 3,
    ServletAccess = 4,
}

impl RunlevelStage {
    /// Numeric level of the stage.
    pub fn level(self) -> u8 {
        self as u8
    }

    /// The stage directly after this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            RunlevelStage::Offline => Some(RunlevelStage::CoreObject),
            RunlevelStage::CoreObject => Some(RunlevelStage::Initializing),
            RunlevelStage::Initializing => Some(RunlevelStage::ShellAccess),
            RunlevelStage::ShellAccess => Some(RunlevelStage::ServletAccess),
            RunlevelStage::ServletAccess => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            RunlevelStage::Offline => "offline",
            RunlevelStage::CoreObject => "core object",
            RunlevelStage::Initializing => "initializing",
            RunlevelStage::ShellAccess => "shell access",
            RunlevelStage::ServletAccess => "servlet access",
        }
    }
}

impl From<u8> for RunlevelStage {
    fn from(val: u8) -> Self {
        match val {
            1 => RunlevelStage::CoreObject,
            2 => RunlevelStage::Initializing,
            3 => RunlevelStage::ShellAccess,
            4 => RunlevelStage::ServletAccess,
            _ => RunlevelStage::Offline,
        }
    }
}

impl fmt::Display for RunlevelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.level(), self.label())
    }
}
