// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::process_id::ProcessId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A single launch attempt failed. Any child that was already started has
/// been killed by the time this is returned.
#[derive(Error, Debug)]
#[error("failed to launch process [{process}]")]
pub struct LaunchError {
    pub process: ProcessId,
    #[source]
    pub cause: LaunchFailure,
}

impl LaunchError {
    pub fn new(process: ProcessId, cause: impl Into<LaunchFailure>) -> Self {
        Self {
            process,
            cause: cause.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LaunchFailure {
    #[error("working directory is not set")]
    MissingWorkDir,
    #[error("entry class is not set")]
    MissingClassName,
    #[error("executable is not set")]
    MissingExecutable,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error("failed to start process: {0}")]
    Spawn(#[source] io::Error),
    #[error("process output stream is not available")]
    OutputUnavailable,
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("command channel slot {index} is out of range (max {max})")]
    InvalidSlot { index: usize, max: usize },
    #[error("command channel {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
#[error("failed to write process properties in {}: {source}", dir.display())]
pub struct HandoffError {
    pub dir: PathBuf,
    #[source]
    pub source: io::Error,
}
