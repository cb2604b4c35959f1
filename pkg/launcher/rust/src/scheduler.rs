// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Starts the roles in order, watches them and restarts or stops everything
//! when needed.

use crate::factory::CommandFactory;
use crate::launcher::ProcessLauncher;
use crate::process_id::ProcessId;
use crate::state::ProcessState;
use crate::supervisor::{ManagedProcess, stop_all};
use log::{error, info, warn};
use std::fmt;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Why the scheduler returned. Every process is stopped by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionOutcome {
    /// Cancelled from outside, typically by a signal.
    Shutdown,
    /// A role could not be launched.
    StartupFailed(ProcessId),
    /// A role exited on its own.
    ProcessCrashed(ProcessId),
}

impl SupervisionOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            SupervisionOutcome::Shutdown => 0,
            SupervisionOutcome::StartupFailed(_) | SupervisionOutcome::ProcessCrashed(_) => 1,
        }
    }
}

impl fmt::Display for SupervisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisionOutcome::Shutdown => write!(f, "shutdown requested"),
            SupervisionOutcome::StartupFailed(id) => write!(f, "[{id}] failed to start"),
            SupervisionOutcome::ProcessCrashed(id) => write!(f, "[{id}] exited unexpectedly"),
        }
    }
}

enum Watch {
    Restart,
    Stop(SupervisionOutcome),
}

pub struct Scheduler {
    factory: CommandFactory,
    launcher: ProcessLauncher,
    processes: Vec<ManagedProcess>,
    cancel: CancellationToken,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(factory: CommandFactory, launcher: ProcessLauncher) -> Self {
        let stop_timeout = factory.config().stop_timeout();
        let processes = factory
            .enabled_processes()
            .into_iter()
            .map(|id| ManagedProcess::new(id).with_stop_timeout(stop_timeout))
            .collect();
        let cancel = launcher.cancellation_token().clone();
        Self {
            factory,
            launcher,
            processes,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Cancelling it makes [`Scheduler::run`] stop everything and return.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn processes(&self) -> &[ManagedProcess] {
        &self.processes
    }

    /// Supervise until shutdown or failure.
    pub async fn run(&mut self) -> SupervisionOutcome {
        loop {
            let watch = match self.start_all().await {
                Ok(()) => self.watch().await,
                Err(outcome) => Watch::Stop(outcome),
            };
            stop_all(&mut self.processes).await;
            match watch {
                Watch::Restart => info!("restarting all processes"),
                Watch::Stop(outcome) => {
                    match outcome {
                        SupervisionOutcome::Shutdown => info!("all processes stopped"),
                        _ => error!("{outcome}, all processes stopped"),
                    }
                    return outcome;
                }
            }
        }
    }

    /// Start each role and wait for it to be operational before the next.
    async fn start_all(&mut self) -> Result<(), SupervisionOutcome> {
        for proc in self.processes.iter_mut() {
            if self.cancel.is_cancelled() {
                return Err(SupervisionOutcome::Shutdown);
            }
            let id = proc.process_id();
            let Some(command) = self.factory.create(id) else {
                continue;
            };
            if proc.start(&self.launcher, command).await.is_err() {
                return Err(SupervisionOutcome::StartupFailed(id));
            }
            wait_for_operational(proc, &self.cancel, self.poll_interval).await?;
        }
        Ok(())
    }

    async fn watch(&mut self) -> Watch {
        loop {
            if self.cancel.is_cancelled() {
                return Watch::Stop(SupervisionOutcome::Shutdown);
            }
            for proc in self.processes.iter_mut() {
                if proc.state() == ProcessState::Init {
                    continue;
                }
                if !proc.is_alive() {
                    return Watch::Stop(SupervisionOutcome::ProcessCrashed(proc.process_id()));
                }
                if proc.restart_requested() {
                    info!("[{}] asked for restart", proc.process_id());
                    proc.acknowledge_restart();
                    return Watch::Restart;
                }
            }
            if !pause(&self.cancel, self.poll_interval).await {
                return Watch::Stop(SupervisionOutcome::Shutdown);
            }
        }
    }
}

async fn wait_for_operational(
    proc: &mut ManagedProcess,
    cancel: &CancellationToken,
    poll_interval: Duration,
) -> Result<(), SupervisionOutcome> {
    let id = proc.process_id();
    loop {
        if cancel.is_cancelled() {
            return Err(SupervisionOutcome::Shutdown);
        }
        if !proc.is_alive() {
            warn!("[{id}] exited before becoming operational");
            return Err(SupervisionOutcome::ProcessCrashed(id));
        }
        if proc.refresh_state().await == ProcessState::Started {
            return Ok(());
        }
        if !pause(cancel, poll_interval).await {
            return Err(SupervisionOutcome::Shutdown);
        }
    }
}

/// False when cancelled before `delay` elapsed.
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::channel::testing::{InMemoryCommandChannel, Slot};
    use crate::config::load_config;
    use crate::handoff::FILE_PREFIX;
    use crate::launcher::JavaRuntime;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(20);

    /// Answer every health request with a green cluster.
    fn serve_green() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap_or(0) > 2 {
                    line.clear();
                }
                let body = r#"{"status":"green"}"#;
                let _ = write!(
                    stream,
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
            }
        });
        port
    }

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct Fixture {
        _home: tempfile::TempDir,
        temp: PathBuf,
        channel: Arc<InMemoryCommandChannel>,
        scheduler: Scheduler,
    }

    /// `java_body` is the shell body of the fake JVM; the search engine is a
    /// sleeping script with a green health endpoint next to it.
    fn fixture(java_body: &str) -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let temp = home.path().join("temp");
        std::fs::create_dir_all(&temp).unwrap();
        std::fs::create_dir_all(home.path().join("elasticsearch")).unwrap();
        let es = script(home.path(), "es.sh", "exec sleep 60");
        let java = script(home.path(), "java.sh", java_body);

        let yaml = format!(
            "home_dir: {}\ntemp_dir: {}\nstop_timeout: 0\nsearch:\n  executable: {}\n  port: {}\n",
            home.path().display(),
            temp.display(),
            es.display(),
            serve_green()
        );
        let config_path = home.path().join("launcher.yaml");
        std::fs::write(&config_path, yaml).unwrap();
        let factory = CommandFactory::new(load_config(&config_path).unwrap()).unwrap();

        let channel = Arc::new(InMemoryCommandChannel::default());
        let launcher = ProcessLauncher::new(&temp, JavaRuntime::new(java), channel.clone());
        let scheduler =
            Scheduler::new(factory, launcher).with_poll_interval(Duration::from_millis(20));
        Fixture {
            _home: home,
            temp,
            channel,
            scheduler,
        }
    }

    /// Wait for the `nth` (1-based) slot created for `id`.
    async fn wait_for_slot(
        channel: &InMemoryCommandChannel,
        id: ProcessId,
        nth: usize,
    ) -> Arc<Slot> {
        let deadline = Instant::now() + WAIT;
        loop {
            {
                let slots = channel.slots.lock().unwrap();
                let matching: Vec<_> = slots.iter().filter(|(i, _)| *i == id.ipc_index()).collect();
                if matching.len() >= nth {
                    return Arc::clone(&matching[nth - 1].1);
                }
            }
            assert!(Instant::now() < deadline, "no slot {nth} for [{id}]");
            sleep(Duration::from_millis(10)).await;
        }
    }

    fn handoff_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                let name = e.as_ref().unwrap().file_name();
                name.to_string_lossy().starts_with(FILE_PREFIX)
            })
            .count()
    }

    #[tokio::test]
    async fn test_starts_in_order_and_shuts_down() {
        let Fixture {
            _home,
            temp,
            channel,
            mut scheduler,
        } = fixture("exec sleep 60");
        let cancel = scheduler.cancellation_token();
        let driver = async {
            let web = wait_for_slot(&channel, ProcessId::WebServer, 1).await;
            // The compute engine waits for the web server.
            sleep(Duration::from_millis(100)).await;
            assert!(channel.slot(ProcessId::ComputeEngine.ipc_index()).is_none());

            web.operational.store(true, Ordering::SeqCst);
            let ce = wait_for_slot(&channel, ProcessId::ComputeEngine, 1).await;
            ce.operational.store(true, Ordering::SeqCst);
            sleep(Duration::from_millis(100)).await;
            assert_eq!(handoff_files(&temp), 2);

            cancel.cancel();
            (web, ce)
        };

        let (outcome, (web, ce)) = tokio::join!(scheduler.run(), driver);
        assert_eq!(outcome, SupervisionOutcome::Shutdown);
        assert_eq!(outcome.exit_code(), 0);
        assert!(web.stop.load(Ordering::SeqCst));
        assert!(ce.stop.load(Ordering::SeqCst));
        assert!(
            scheduler
                .processes()
                .iter()
                .all(|p| p.state() == ProcessState::Stopped)
        );
        assert_eq!(handoff_files(&temp), 0);
    }

    #[tokio::test]
    async fn test_crash_stops_everything() {
        let Fixture {
            _home,
            channel,
            mut scheduler,
            ..
        } = fixture("case \"$*\" in *CeServer*) exit 3;; esac\nexec sleep 60");
        let driver = async {
            let web = wait_for_slot(&channel, ProcessId::WebServer, 1).await;
            web.operational.store(true, Ordering::SeqCst);
            web
        };

        let (outcome, web) = tokio::join!(scheduler.run(), driver);
        assert_eq!(
            outcome,
            SupervisionOutcome::ProcessCrashed(ProcessId::ComputeEngine)
        );
        assert_eq!(outcome.exit_code(), 1);
        assert!(web.stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_restart_request_restarts_all() {
        let Fixture {
            _home,
            channel,
            mut scheduler,
            ..
        } = fixture("exec sleep 60");
        let cancel = scheduler.cancellation_token();
        let driver = async {
            let web = wait_for_slot(&channel, ProcessId::WebServer, 1).await;
            web.operational.store(true, Ordering::SeqCst);
            let ce = wait_for_slot(&channel, ProcessId::ComputeEngine, 1).await;
            ce.operational.store(true, Ordering::SeqCst);

            ce.restart.store(true, Ordering::SeqCst);
            let web_again = wait_for_slot(&channel, ProcessId::WebServer, 2).await;
            assert!(!ce.restart.load(Ordering::SeqCst));
            assert!(web.stop.load(Ordering::SeqCst));
            assert!(!web_again.stop.load(Ordering::SeqCst));
            cancel.cancel();
        };

        let (outcome, ()) = tokio::join!(scheduler.run(), driver);
        assert_eq!(outcome, SupervisionOutcome::Shutdown);
    }

    #[tokio::test]
    async fn test_startup_failure() {
        let Fixture {
            _home,
            channel,
            mut scheduler,
            ..
        } = fixture("exec sleep 60");
        channel.fail.store(true, Ordering::SeqCst);

        assert_eq!(
            scheduler.run().await,
            SupervisionOutcome::StartupFailed(ProcessId::WebServer)
        );
        assert!(
            scheduler
                .processes()
                .iter()
                .all(|p| p.state() == ProcessState::Stopped || p.state() == ProcessState::Init)
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let Fixture {
            _home,
            mut scheduler,
            ..
        } = fixture("exec sleep 60");
        scheduler.cancellation_token().cancel();
        assert_eq!(scheduler.run().await, SupervisionOutcome::Shutdown);
        assert!(scheduler.processes().iter().all(|p| p.pid().is_none()));
    }
}
