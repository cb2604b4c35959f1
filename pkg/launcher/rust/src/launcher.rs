// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Turns commands into running OS processes and their monitors.

use crate::channel::{CommandChannel, ProcessCommands};
use crate::command::{Command, EsCommand, JavaCommand};
use crate::error::{LaunchError, LaunchFailure};
use crate::es_health::HttpClusterHealthCheck;
use crate::handoff;
use crate::monitor::ProcessMonitor;
use crate::process_id::ProcessId;
use crate::spawn::{ChildProcess, OsSpawner, OutputStream, SpawnSpec, Spawner};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

/// Location of the JVM used for JVM children, and the separator used to join
/// classpath entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaRuntime {
    pub java_path: PathBuf,
    pub path_separator: char,
}

impl JavaRuntime {
    pub fn new(java_path: impl Into<PathBuf>) -> Self {
        Self {
            java_path: java_path.into(),
            path_separator: PATH_SEPARATOR,
        }
    }

    /// `$JAVA_HOME/bin/java` when `JAVA_HOME` is set, `java` from `PATH` otherwise.
    pub fn detect() -> Self {
        let java_path = std::env::var_os("JAVA_HOME")
            .map(|home| PathBuf::from(home).join("bin").join("java"))
            .unwrap_or_else(|| PathBuf::from("java"));
        Self::new(java_path)
    }
}

/// A command of either kind, ready to launch.
#[derive(Debug, Clone)]
pub enum LaunchCommand {
    Java(JavaCommand),
    Es(EsCommand),
}

impl LaunchCommand {
    pub fn process_id(&self) -> ProcessId {
        match self {
            LaunchCommand::Java(cmd) => cmd.process_id(),
            LaunchCommand::Es(cmd) => cmd.process_id(),
        }
    }
}

impl From<JavaCommand> for LaunchCommand {
    fn from(cmd: JavaCommand) -> Self {
        LaunchCommand::Java(cmd)
    }
}

impl From<EsCommand> for LaunchCommand {
    fn from(cmd: EsCommand) -> Self {
        LaunchCommand::Es(cmd)
    }
}

pub struct ProcessLauncher {
    temp_dir: PathBuf,
    runtime: JavaRuntime,
    channel: Arc<dyn CommandChannel>,
    spawner: Arc<dyn Spawner>,
    cancel: CancellationToken,
}

impl ProcessLauncher {
    /// `temp_dir` is shared with the children: it holds the handoff files and
    /// is passed to JVMs as `java.io.tmpdir`.
    pub fn new(
        temp_dir: impl Into<PathBuf>,
        runtime: JavaRuntime,
        channel: Arc<dyn CommandChannel>,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            runtime,
            channel,
            spawner: Arc::new(OsSpawner),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Cancelling it aborts any readiness poll of the monitors this launcher
    /// creates. It is never reset.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub async fn launch(&self, command: LaunchCommand) -> Result<ProcessMonitor, LaunchError> {
        match command {
            LaunchCommand::Java(cmd) => self.launch_java(cmd).await,
            LaunchCommand::Es(cmd) => self.launch_es(cmd).await,
        }
    }

    pub async fn launch_java(&self, command: JavaCommand) -> Result<ProcessMonitor, LaunchError> {
        let id = command.process_id();
        self.try_launch_java(&command)
            .await
            .map_err(|cause| launch_error(id, cause))
    }

    pub async fn launch_es(&self, command: EsCommand) -> Result<ProcessMonitor, LaunchError> {
        let id = command.process_id();
        self.try_launch_es(&command)
            .await
            .map_err(|cause| launch_error(id, cause))
    }

    async fn try_launch_java(&self, command: &JavaCommand) -> Result<ProcessMonitor, LaunchFailure> {
        let id = command.process_id();
        let work_dir = command
            .base()
            .work_dir()
            .ok_or(LaunchFailure::MissingWorkDir)?
            .to_path_buf();
        let class_name = command
            .class_name()
            .ok_or(LaunchFailure::MissingClassName)?;

        // The slot must be clean before the child can read it.
        let commands = self.channel.create_after_clean(id.ipc_index())?;
        let props_file = handoff::write_properties(&self.temp_dir, command)?;

        let spec = SpawnSpec {
            program: self.runtime.java_path.clone(),
            args: self.java_args(command, class_name, &props_file),
            work_dir,
            env: command.base().env().clone(),
        };
        match self.start_java(id, &spec, commands).await {
            Ok(monitor) => Ok(monitor.with_handoff_file(props_file)),
            Err(cause) => {
                handoff::remove_properties(&props_file);
                Err(cause)
            }
        }
    }

    async fn start_java(
        &self,
        id: ProcessId,
        spec: &SpawnSpec,
        commands: Box<dyn ProcessCommands>,
    ) -> Result<ProcessMonitor, LaunchFailure> {
        let child = self.spawn(id, spec)?;
        let (child, relay) = start_relay(id, child).await?;
        Ok(ProcessMonitor::with_commands(id, child, Some(relay), commands))
    }

    async fn try_launch_es(&self, command: &EsCommand) -> Result<ProcessMonitor, LaunchFailure> {
        let id = command.process_id();
        let work_dir = command
            .base()
            .work_dir()
            .ok_or(LaunchFailure::MissingWorkDir)?
            .to_path_buf();
        let program = command
            .executable()
            .ok_or(LaunchFailure::MissingExecutable)?
            .to_path_buf();

        let spec = SpawnSpec {
            program,
            args: command.options().to_vec(),
            work_dir,
            env: command.base().env().clone(),
        };
        let child = self.spawn(id, &spec)?;
        let (child, relay) = start_relay(id, child).await?;
        Ok(ProcessMonitor::with_health_check(
            id,
            child,
            Some(relay),
            Arc::new(HttpClusterHealthCheck::new(command.url())),
            self.cancel.clone(),
        ))
    }

    /// Arguments following the java executable: JVM flags, temp dir,
    /// classpath, entry class, handoff file.
    fn java_args(&self, command: &JavaCommand, class_name: &str, props_file: &Path) -> Vec<String> {
        let separator = self.runtime.path_separator.to_string();
        let mut args: Vec<String> = command.java_options().to_vec();
        args.push(format!("-Djava.io.tmpdir={}", self.temp_dir.display()));
        args.push("-cp".to_string());
        args.push(command.classpath().join(separator.as_str()));
        args.push(class_name.to_string());
        args.push(props_file.display().to_string());
        args
    }

    fn spawn(&self, id: ProcessId, spec: &SpawnSpec) -> Result<ChildProcess, LaunchFailure> {
        let child = self.spawner.spawn(spec).map_err(LaunchFailure::Spawn)?;
        info!(
            "[{id}] spawned (pid={}, cmd={})",
            child.id(),
            spec.argv().join(" ")
        );
        Ok(child)
    }
}

fn launch_error(id: ProcessId, cause: LaunchFailure) -> LaunchError {
    error!("[{id}] failed to launch {}: {cause}", id.human_readable_name());
    LaunchError::new(id, cause)
}

/// Start the task that relays the child's output to the log. Kills the
/// child if there is no output to relay.
async fn start_relay(
    id: ProcessId,
    mut child: ChildProcess,
) -> Result<(ChildProcess, JoinHandle<()>), LaunchFailure> {
    if let Some(output) = child.take_output() {
        return Ok((child, tokio::spawn(relay_output(id, output))));
    }
    warn!("[{id}] killing pid {} after failed launch", child.id());
    if let Err(e) = child.kill() {
        warn!("[{id}] failed to kill: {e}");
    }
    let _ = child.wait().await;
    Err(LaunchFailure::OutputUnavailable)
}

/// Log each line of `output` until end of stream. Bytes that are not valid
/// UTF-8 are replaced, so only EOF or a read error stops the relay.
async fn relay_output(id: ProcessId, output: OutputStream) {
    let mut reader = BufReader::new(output);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                info!("[{id}] {}", text.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                debug!("[{id}] output relay stopped: {e}");
                break;
            }
        }
    }
}
