//! ---
//! cosim_section: "04-driver"
//! cosim_subsection: "module"
//! cosim_type: "source"
//! cosim_scope: "code"
//! cosim_description: "Driver lifecycle state machine."
//! cosim_version: "v0.0.0-prealpha"
//! cosim_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;

use crate::error::{DriverError, Result};

/// Lifecycle position of the driver relative to its engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    #[default]
    Unloaded,
    Instantiated,
    Loaded,
    Initialized,
    Running,
    Finalized,
    Released,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Unloaded => "unloaded",
            DriverState::Instantiated => "instantiated",
            DriverState::Loaded => "loaded",
            DriverState::Initialized => "initialized",
            DriverState::Running => "running",
            DriverState::Finalized => "finalized",
            DriverState::Released => "released",
        }
    }

    pub fn can_transition_to(&self, next: DriverState) -> bool {
        use DriverState::*;
        matches!(
            (*self, next),
            (Unloaded, Instantiated)
                | (Instantiated, Loaded)
                | (Loaded, Initialized)
                | (Initialized, Running)
                | (Running, Finalized)
                | (Instantiated | Loaded | Initialized | Finalized, Released)
        )
    }

    /// Fails with [`DriverError::InvalidTransition`] unless `next` is reachable.
    pub fn check(&self, next: DriverState) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(DriverError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }

    pub fn transition(&mut self, next: DriverState) -> Result<()> {
        self.check(next)?;
        *self = next;
        Ok(())
    }

    /// Per-step engine calls are only legal while running.
    pub fn ensure_running(&self) -> Result<()> {
        if *self == DriverState::Running {
            Ok(())
        } else {
            Err(DriverError::InvalidTransition {
                from: *self,
                to: DriverState::Running,
            })
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
