// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! OS process invocation.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// Combined stdout and stderr of a child.
pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Everything needed to start one OS process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    /// Complete environment of the child. Nothing else is inherited.
    pub env: BTreeMap<OsString, OsString>,
}

impl SpawnSpec {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Handle on a started OS process. Dropping it kills a process still running.
pub struct ChildProcess {
    child: Child,
    pid: u32,
    output: Option<OutputStream>,
}

impl ChildProcess {
    fn new(child: Child, output: Option<OutputStream>) -> Self {
        let pid = child.id().unwrap_or(0);
        Self { child, pid, output }
    }

    /// Pid assigned at spawn time. Still reported after the child is reaped.
    pub fn id(&self) -> u32 {
        self.pid
    }

    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process to exit (SIGTERM on unix). A no-op once it exited.
    #[cfg(unix)]
    pub fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        let pid = i32::try_from(self.pid).map_err(io::Error::other)?;
        signal::kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> io::Result<()> {
        self.kill()
    }

    /// Kill the process (SIGKILL on unix) without waiting. A no-op once it exited.
    pub fn kill(&mut self) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.start_kill()
    }

    /// Returns `None` once taken.
    pub fn take_output(&mut self) -> Option<OutputStream> {
        self.output.take()
    }
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("pid", &self.pid)
            .field("has_output", &self.output.is_some())
            .finish()
    }
}

/// Must be called from within a tokio runtime.
pub trait Spawner: Send + Sync {
    fn spawn(&self, spec: &SpawnSpec) -> io::Result<ChildProcess>;
}

/// Starts real OS processes with stderr merged into stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    #[cfg(unix)]
    fn spawn(&self, spec: &SpawnSpec) -> io::Result<ChildProcess> {
        use std::os::fd::OwnedFd;
        use tokio::net::unix::pipe;

        let (reader, writer) = io::pipe()?;
        let mut cmd = command(spec);
        cmd.stdout(writer.try_clone()?).stderr(writer);

        let child = cmd.spawn()?;
        // Release our copies of the write end so the reader sees EOF on exit.
        drop(cmd);

        let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
        Ok(ChildProcess::new(child, Some(Box::new(output))))
    }

    #[cfg(not(unix))]
    fn spawn(&self, spec: &SpawnSpec) -> io::Result<ChildProcess> {
        let mut cmd = command(spec);
        cmd.stdout(Stdio::piped()).stderr(Stdio::inherit());
        let mut child = cmd.spawn()?;
        let output = child
            .stdout
            .take()
            .map(|out| Box::new(out) as OutputStream);
        Ok(ChildProcess::new(child, output))
    }
}

fn command(spec: &SpawnSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.work_dir)
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}
