// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Never launched. A stopped process restarts from `Stopped`, not from here.
    Init,
    /// Launched, waiting to become operational.
    Starting,
    /// Operational.
    Started,
    /// Stop requested, waiting for exit.
    Stopping,
    Stopped,
}

impl ProcessState {
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Started | ProcessState::Stopping
        )
    }

    pub(crate) fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Init, Starting)
                | (Starting, Started)
                | (Starting, Stopping)
                | (Started, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Starting)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Init => write!(f, "init"),
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Started => write!(f, "started"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Stopped => write!(f, "stopped"),
        }
    }
}
