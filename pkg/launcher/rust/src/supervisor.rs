// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::LaunchError;
use crate::launcher::{LaunchCommand, ProcessLauncher};
use crate::monitor::ProcessMonitor;
use crate::process_id::ProcessId;
use crate::state::ProcessState;
use log::{info, warn};
use std::process::ExitStatus;
use std::time::Duration;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);
const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// One supervised role and the monitor of its current incarnation, if any.
#[derive(Debug)]
pub struct ManagedProcess {
    id: ProcessId,
    state: ProcessState,
    monitor: Option<ProcessMonitor>,
    stop_timeout: Duration,
}

impl ManagedProcess {
    pub fn new(id: ProcessId) -> Self {
        Self {
            id,
            state: ProcessState::Init,
            monitor: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn process_id(&self) -> ProcessId {
        self.id
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn pid(&self) -> Option<u32> {
        self.monitor.as_ref().map(ProcessMonitor::pid)
    }

    fn transition(&mut self, next: ProcessState) {
        if !self.state.can_transition_to(next) {
            warn!("[{}] unexpected transition {} -> {next}", self.id, self.state);
        }
        self.state = next;
    }

    pub async fn start(
        &mut self,
        launcher: &ProcessLauncher,
        command: LaunchCommand,
    ) -> Result<(), LaunchError> {
        if self.state.is_alive() {
            warn!("[{}] already {}, not starting again", self.id, self.state);
            return Ok(());
        }
        let monitor = launcher.launch(command).await?;
        info!("[{}] {} is starting", self.id, self.id.human_readable_name());
        self.monitor = Some(monitor);
        self.transition(ProcessState::Starting);
        Ok(())
    }

    /// Move to `Started` once the process reports itself operational.
    pub async fn refresh_state(&mut self) -> ProcessState {
        if self.state == ProcessState::Starting
            && let Some(monitor) = self.monitor.as_mut()
            && monitor.is_operational().await
        {
            info!("[{}] {} is up", self.id, self.id.human_readable_name());
            self.transition(ProcessState::Started);
        }
        self.state
    }

    pub fn is_alive(&mut self) -> bool {
        self.monitor.as_mut().is_some_and(ProcessMonitor::is_alive)
    }

    pub fn restart_requested(&self) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(ProcessMonitor::asked_for_restart)
    }

    pub fn acknowledge_restart(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.acknowledge_ask_for_restart();
        }
    }

    /// Ask the process to stop, wait up to `stop_timeout`, then kill it.
    /// Returns the exit status when one could be collected.
    pub async fn stop(&mut self) -> Option<ExitStatus> {
        let mut monitor = self.monitor.take()?;
        self.transition(ProcessState::Stopping);
        info!("[{}] stopping (pid={})", self.id, monitor.pid());
        monitor.ask_for_stop();

        let status = match monitor.wait_for_timeout(self.stop_timeout).await {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                warn!(
                    "[{}] stop timeout ({}s) reached, killing",
                    self.id,
                    self.stop_timeout.as_secs()
                );
                monitor.destroy_forcibly();
                match monitor.wait_for_timeout(KILL_TIMEOUT).await {
                    Ok(status) => {
                        if status.is_none() {
                            warn!("[{}] still running after kill, giving up", self.id);
                        }
                        status
                    }
                    Err(e) => {
                        warn!("[{}] failed to wait after kill: {e}", self.id);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("[{}] failed to wait for exit: {e}", self.id);
                monitor.destroy_forcibly();
                None
            }
        };
        monitor.close_streams().await;

        match status {
            Some(status) => info!("[{}] exited with {status}", self.id),
            None => info!("[{}] stopped", self.id),
        }
        self.transition(ProcessState::Stopped);
        status
    }
}

/// Stop every process, last started first.
pub async fn stop_all(processes: &mut [ManagedProcess]) {
    for proc in processes.iter_mut().rev() {
        proc.stop().await;
    }
}
