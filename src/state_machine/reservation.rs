// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reservation Lifecycle State Machine
//!
//! Per-resource lifecycle, combining the federation's reservation states
//! with the data-plane reachability established afterwards.
//!
//! # States
//!
//! ```text
//! Ticketed → Provisioning → Active → {Reachable, ActiveUnreachable} → Closed
//!                         ↘ Failed → Closed
//! any → Dead (parent slice died)
//! ```
//!
//! Ticketed/Provisioning are the only unsettled states. `Closed` and
//! `Dead` are terminal.
//!
//! # Monotonicity
//!
//! States are ranked `Ticketed < Provisioning < {Active, Failed} <
//! {Reachable, ActiveUnreachable} < Closed < Dead`. Observations from
//! the control plane may only move a resource forward; see
//! [`ReservationState::input_for_report`].

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Cause recorded on resources failed because their slice died
pub const SLICE_DEAD_CAUSE: &str = "SliceDead";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationState {
    Ticketed,
    Provisioning,
    Active,
    /// Active with an established management session
    Reachable,
    /// Control plane succeeded, data plane never answered
    ActiveUnreachable,
    Failed,
    Closed,
    Dead,
}

impl ReservationState {
    /// Position in the forward-only order
    pub fn rank(&self) -> u8 {
        match self {
            Self::Ticketed => 0,
            Self::Provisioning => 1,
            Self::Active | Self::Failed => 2,
            Self::Reachable | Self::ActiveUnreachable => 3,
            Self::Closed => 4,
            Self::Dead => 5,
        }
    }

    /// Provisioning has finished, one way or the other
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Ticketed | Self::Provisioning)
    }

    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Dead)
    }

    /// Control plane reports the resource as running
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Reachable | Self::ActiveUnreachable)
    }

    /// The state as the control plane itself would name it
    pub fn control_plane_phase(&self) -> ReservationState {
        match self {
            Self::Reachable | Self::ActiveUnreachable => Self::Active,
            other => *other,
        }
    }

    /// Translate a control-plane observation into a lifecycle input
    ///
    /// Returns `Ok(None)` when the report matches what is already known.
    /// A report that would move the resource backwards, or flip a settled
    /// outcome between Active and Failed, is a `Regression`.
    pub fn input_for_report(
        &self,
        reported: ReservationState,
        error: Option<&str>,
    ) -> TransitionResult<Option<ReservationInput>> {
        let current = self.control_plane_phase();
        let reported = reported.control_plane_phase();

        if current == reported {
            return Ok(None);
        }
        if reported.rank() <= current.rank() {
            return Err(TransitionError::Regression {
                from: current.to_string(),
                to: reported.to_string(),
            });
        }

        let input = match reported {
            Self::Provisioning => ReservationInput::Provision,
            Self::Active => ReservationInput::Activate,
            Self::Failed => ReservationInput::Fail {
                cause: error.unwrap_or("reported failed without message").to_string(),
            },
            Self::Closed => ReservationInput::Close,
            Self::Dead => ReservationInput::SliceDied,
            Self::Ticketed | Self::Reachable | Self::ActiveUnreachable => {
                return Err(TransitionError::InvalidTransition {
                    from: current.to_string(),
                    to: reported.to_string(),
                })
            }
        };
        Ok(Some(input))
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ticketed => "Ticketed",
            Self::Provisioning => "Provisioning",
            Self::Active => "Active",
            Self::Reachable => "Reachable",
            Self::ActiveUnreachable => "Active-Unreachable",
            Self::Failed => "Failed",
            Self::Closed => "Closed",
            Self::Dead => "Dead",
        };
        f.write_str(name)
    }
}

/// Lifecycle input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationInput {
    Provision,
    Activate,
    Fail { cause: String },
    Reach,
    Unreachable { cause: String },
    Close,
    SliceDied,
}

/// Transition output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutput {
    /// Diagnostic cause to record on the resource
    pub cause: Option<String>,

    /// Whether the resource ended up failed, unreachable or dead
    pub is_critical: bool,
}

impl TransitionOutput {
    fn ok() -> Self {
        Self {
            cause: None,
            is_critical: false,
        }
    }

    fn critical(cause: impl Into<String>) -> Self {
        Self {
            cause: Some(cause.into()),
            is_critical: true,
        }
    }
}

impl StateMachine for ReservationState {
    type Input = ReservationInput;
    type Output = TransitionOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use ReservationInput::*;
        use ReservationState::*;

        match (self, input) {
            (Ticketed | Provisioning, Provision) => Ok((Provisioning, TransitionOutput::ok())),
            (Ticketed | Provisioning | Active, Activate) => Ok((Active, TransitionOutput::ok())),
            (Ticketed | Provisioning | Failed, Fail { cause }) => {
                Ok((Failed, TransitionOutput::critical(cause.clone())))
            }

            // Data-plane reachability; probes may flip it either way
            (Active | ActiveUnreachable | Reachable, Reach) => {
                Ok((Reachable, TransitionOutput::ok()))
            }
            (Active | Reachable | ActiveUnreachable, Unreachable { cause }) => {
                Ok((ActiveUnreachable, TransitionOutput::critical(cause.clone())))
            }

            (Dead, Close) => Ok((Dead, TransitionOutput::ok())),
            (_, Close) => Ok((Closed, TransitionOutput::ok())),

            (Ticketed | Provisioning, SliceDied) => {
                Ok((Failed, TransitionOutput::critical(SLICE_DEAD_CAUSE)))
            }
            (Active | Reachable | ActiveUnreachable | Dead, SliceDied) => {
                Ok((Dead, TransitionOutput::critical(SLICE_DEAD_CAUSE)))
            }
            (Failed, SliceDied) => Ok((Failed, TransitionOutput::ok())),
            (Closed, SliceDied) => Ok((Closed, TransitionOutput::ok())),

            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                to: format!("{input:?}"),
            }),
        }
    }
}
