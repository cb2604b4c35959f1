// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod channel;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
pub mod es_health;
pub mod factory;
pub mod handoff;
pub mod launcher;
pub mod monitor;
pub mod process_id;
pub mod scheduler;
mod spawn;
pub mod state;
pub mod supervisor;

// Re-export the public API
pub use channel::{CommandChannel, FileCommandChannel, ProcessCommands};
pub use command::{Command, CommandBase, EsCommand, JavaCommand};
pub use error::{ChannelError, HandoffError, LaunchError, LaunchFailure};
pub use es_health::{ClusterHealthCheck, HttpClusterHealthCheck};
pub use launcher::{JavaRuntime, LaunchCommand, ProcessLauncher};
pub use monitor::ProcessMonitor;
pub use process_id::ProcessId;
pub use scheduler::{Scheduler, SupervisionOutcome};
pub use spawn::{ChildProcess, OsSpawner, OutputStream, SpawnSpec, Spawner};
