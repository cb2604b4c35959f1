// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Per-process supervision handle.
//!
//! A monitor is either backed by a command-channel slot (JVM children) or by
//! HTTP health polling (the search engine). Liveness, termination and waiting
//! go straight to the OS process in both cases.

use crate::channel::ProcessCommands;
use crate::es_health::{ClusterHealthCheck, ClusterStatus};
use crate::handoff;
use crate::process_id::ProcessId;
use crate::spawn::ChildProcess;
use log::{debug, info, warn};
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Delay between two health requests while the node refuses connections.
pub const WAIT_FOR_UP_DELAY: Duration = Duration::from_millis(100);
/// Number of delayed retries before giving up on a refusing node.
pub const WAIT_FOR_UP_MAX_ATTEMPTS: u32 = 600;

/// How long `close_streams` waits for the output relay to reach end of stream.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

enum Control {
    Channel(Box<dyn ProcessCommands>),
    Health(HealthPoll),
}

struct HealthPoll {
    check: Arc<dyn ClusterHealthCheck>,
    cancel: CancellationToken,
    delay: Duration,
    max_attempts: u32,
}

impl HealthPoll {
    /// Query until the node accepts connections, then report whether the
    /// cluster is at least yellow. Cancellation reports "not ready".
    async fn check_operational(&self, id: ProcessId) -> bool {
        let Some(mut status) = self.check_once(id).await else {
            return false;
        };
        let mut attempts = 0;
        while status == ClusterStatus::ConnectionRefused && attempts < self.max_attempts {
            tokio::select! {
                () = sleep(self.delay) => {}
                () = self.cancel.cancelled() => {
                    debug!("[{id}] cancelled while waiting for the node to come up");
                    return false;
                }
            }
            attempts += 1;
            let Some(next) = self.check_once(id).await else {
                return false;
            };
            status = next;
        }
        debug!("[{id}] cluster status {status:?} after {attempts} retries");
        status.is_ready()
    }

    /// The HTTP client blocks, so each request runs on the blocking pool.
    async fn check_once(&self, id: ProcessId) -> Option<ClusterStatus> {
        let check = Arc::clone(&self.check);
        let request = tokio::task::spawn_blocking(move || check.check());
        tokio::select! {
            res = request => Some(res.unwrap_or_else(|e| {
                warn!("[{id}] health request task failed: {e}");
                ClusterStatus::Unavailable
            })),
            () = self.cancel.cancelled() => {
                debug!("[{id}] cancelled during a health request");
                None
            }
        }
    }
}

pub struct ProcessMonitor {
    id: ProcessId,
    child: ChildProcess,
    relay: Option<JoinHandle<()>>,
    control: Control,
    operational: bool,
    handoff_file: Option<PathBuf>,
}

impl ProcessMonitor {
    pub(crate) fn with_commands(
        id: ProcessId,
        child: ChildProcess,
        relay: Option<JoinHandle<()>>,
        commands: Box<dyn ProcessCommands>,
    ) -> Self {
        Self {
            id,
            child,
            relay,
            control: Control::Channel(commands),
            operational: false,
            handoff_file: None,
        }
    }

    pub(crate) fn with_health_check(
        id: ProcessId,
        child: ChildProcess,
        relay: Option<JoinHandle<()>>,
        check: Arc<dyn ClusterHealthCheck>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            child,
            relay,
            control: Control::Health(HealthPoll {
                check,
                cancel,
                delay: WAIT_FOR_UP_DELAY,
                max_attempts: WAIT_FOR_UP_MAX_ATTEMPTS,
            }),
            operational: false,
            handoff_file: None,
        }
    }

    /// Properties file handed to the child, removed by `close_streams`.
    pub(crate) fn with_handoff_file(mut self, path: PathBuf) -> Self {
        self.handoff_file = Some(path);
        self
    }

    pub fn process_id(&self) -> ProcessId {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => {
                warn!("[{}] failed to query process status: {e}", self.id);
                false
            }
        }
    }

    pub fn destroy_forcibly(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("[{}] kill failed: {e}", self.id);
        }
    }

    /// Resolves once the process exits.
    pub async fn wait_for(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Resolves once the process exits or `limit` elapses. `Ok(None)` on timeout.
    /// Timeouts too large for the clock wait without a deadline.
    pub async fn wait_for_timeout(&mut self, limit: Duration) -> io::Result<Option<ExitStatus>> {
        match timeout(limit, self.child.wait()).await {
            Ok(status) => status.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Release the output stream and the handoff file. The relay task is
    /// given a short time to log what is left, then detached.
    pub async fn close_streams(&mut self) {
        if let Some(relay) = self.relay.take()
            && timeout(OUTPUT_DRAIN_TIMEOUT, relay).await.is_err()
        {
            debug!("[{}] detaching output relay", self.id);
        }
        if let Some(path) = self.handoff_file.take() {
            handoff::remove_properties(&path);
        }
    }

    /// Whether the process is ready to serve. Once true, stays true without
    /// further checks.
    pub async fn is_operational(&mut self) -> bool {
        if self.operational {
            return true;
        }
        let operational = match &self.control {
            Control::Channel(commands) => commands.is_operational(),
            Control::Health(poll) => poll.check_operational(self.id).await,
        };
        if operational {
            info!("[{}] process is operational", self.id);
            self.operational = true;
        }
        operational
    }

    pub fn ask_for_stop(&mut self) {
        match &self.control {
            Control::Channel(commands) => commands.ask_for_stop(),
            Control::Health(_) => {
                if let Err(e) = self.child.terminate() {
                    warn!("[{}] failed to send SIGTERM: {e}", self.id);
                }
            }
        }
    }

    /// The search engine never asks for a restart.
    pub fn asked_for_restart(&self) -> bool {
        match &self.control {
            Control::Channel(commands) => commands.asked_for_restart(),
            Control::Health(_) => false,
        }
    }

    pub fn acknowledge_ask_for_restart(&self) {
        if let Control::Channel(commands) = &self.control {
            commands.acknowledge_ask_for_restart();
        }
    }
}

impl std::fmt::Debug for ProcessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessMonitor")
            .field("id", &self.id)
            .field("pid", &self.child.id())
            .field(
                "control",
                &match self.control {
                    Control::Channel(_) => "channel",
                    Control::Health(_) => "health",
                },
            )
            .field("operational", &self.operational)
            .finish()
    }
}
