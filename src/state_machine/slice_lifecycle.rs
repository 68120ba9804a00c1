// Copyright (c) 2025 - Cowboy AI, Inc.
//! Slice Lifecycle
//!
//! Slice-level state as reported by the control plane.
//!
//! ```text
//! Configuring ⇄ {StableOK, StableError} → Closing → Closed
//! any → Dead
//! ```
//!
//! The input of this machine is the next observed state; the machine only
//! rejects observations that leave a terminal state or re-open a slice
//! that is already closing.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SliceState {
    Configuring,
    StableOK,
    StableError,
    Closing,
    Closed,
    Dead,
}

impl SliceState {
    /// Map a federation slice-state name
    ///
    /// The federation distinguishes allocation and modification outcomes;
    /// those collapse onto the stable pair here.
    pub fn from_control_plane(name: &str) -> Option<Self> {
        let state = match name {
            "Nascent" | "Configuring" | "Modifying" => Self::Configuring,
            "StableOK" | "ModifyOK" | "AllocatedOK" => Self::StableOK,
            "StableError" | "ModifyError" | "AllocatedError" => Self::StableError,
            "Closing" => Self::Closing,
            "Closed" => Self::Closed,
            "Dead" => Self::Dead,
            _ => return None,
        };
        Some(state)
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, Self::StableOK | Self::StableError)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Dead)
    }

    /// Downgrade a stable report while any resource is still unsettled
    pub fn guarded(self, all_settled: bool) -> Self {
        if self.is_stable() && !all_settled {
            Self::Configuring
        } else {
            self
        }
    }
}

impl fmt::Display for SliceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl StateMachine for SliceState {
    type Input = SliceState;
    type Output = ();

    fn transition(&self, observed: &SliceState) -> TransitionResult<(Self, ())> {
        use SliceState::*;

        let allowed = match (self, observed) {
            (from, to) if from == to => true,
            (_, Dead) => true,
            (Closed | Dead, _) => false,
            (Closing, Closed) => true,
            (Closing, _) => false,
            _ => true,
        };

        if allowed {
            Ok((*observed, ()))
        } else {
            Err(TransitionError::Regression {
                from: self.to_string(),
                to: observed.to_string(),
            })
        }
    }
}
