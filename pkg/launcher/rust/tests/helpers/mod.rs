// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Handle to a running sq-launcherd daemon process.
pub struct DaemonHandle {
    child: Child,
    log_lines: Arc<Mutex<Vec<String>>>,
    _reader_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

impl DaemonHandle {
    /// Start the daemon with `--config` pointing to the given file.
    pub fn start(config: &Path) -> Self {
        let bin = env!("CARGO_BIN_EXE_sq-launcherd");
        let mut child = Command::new(bin)
            .arg("--config")
            .arg(config)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start sq-launcherd");

        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));

        let reader_thread = spawn_reader(stdout, "daemon", Arc::clone(&log_lines));
        let _stderr_thread = spawn_reader(stderr, "daemon:err", Arc::clone(&log_lines));

        Self {
            child,
            log_lines,
            _reader_thread: reader_thread,
            _stderr_thread,
        }
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        self.wait_for_log_count(pattern, 1, timeout)
    }

    /// Wait until a log line containing `pattern` appears using the default timeout.
    pub fn wait_for_log_default(&self, pattern: &str) -> bool {
        self.wait_for_log(pattern, DEFAULT_TIMEOUT)
    }

    /// Count how many log lines contain `pattern`.
    pub fn count_log_matches(&self, pattern: &str) -> usize {
        let lines = self.log_lines.lock().unwrap();
        lines.iter().filter(|l| l.contains(pattern)).count()
    }

    /// Wait until the count of log lines matching `pattern` reaches at least `n`.
    pub fn wait_for_log_count(&self, pattern: &str, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count_log_matches(pattern) >= n {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    /// Send a signal to the daemon process.
    pub fn send_signal(&self, sig: Signal) {
        let pid = i32::try_from(self.child.id()).expect("pid out of range");
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to daemon");
    }

    /// Send SIGTERM and wait for the daemon to exit. Returns the exit status.
    pub fn stop(&mut self) -> std::process::ExitStatus {
        self.send_signal(Signal::SIGTERM);
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }

    /// Wait for the daemon to exit within the given timeout.
    pub fn wait_with_timeout(&mut self, timeout: Duration) -> std::process::ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .child
                .try_wait()
                .expect("failed to check daemon status")
            {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed daemon");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    /// Extract PIDs from "spawned (pid=NNN" log lines.
    pub fn spawned_pids(&self) -> Vec<u32> {
        let lines = self.log_lines.lock().unwrap();
        lines
            .iter()
            .filter_map(|l| {
                let marker = "spawned (pid=";
                let start = l.find(marker)? + marker.len();
                let end = l[start..].find(|c: char| !c.is_ascii_digit())? + start;
                l[start..end].parse().ok()
            })
            .collect()
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_reader(
    stream: impl std::io::Read + Send + 'static,
    tag: &'static str,
    lines: Arc<Mutex<Vec<String>>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(l) => {
                    eprintln!("[{tag}] {l}");
                    lines.lock().unwrap().push(l);
                }
                Err(_) => break,
            }
        }
    })
}

/// Answer every request with a green cluster health document. Returns the port.
pub fn serve_green_cluster() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind health server");
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 2 {
                line.clear();
            }
            let body = r#"{"cluster_name":"sonarqube","status":"green"}"#;
            let _ = write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
        }
    });
    port
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n"))
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Write a fake JVM into `dir`. It prints its handoff file, raises its
/// operational flag in the shared file, then waits for the stop flag.
/// `before_ready` and `after_ready` are shell snippets run around the
/// operational flag; `$key` holds the process key.
pub fn fake_java(dir: &Path, before_ready: &str, after_ready: &str) -> PathBuf {
    let path = dir.join("java");
    write_script(
        &path,
        &format!(
            r#"for last; do :; done
props="$last"
key=$(sed -n 's/^process\.key=//p' "$props")
idx=$(sed -n 's/^process\.index=//p' "$props")
dir=$(sed -n 's/^process\.sharedDir=//p' "$props")
shm="$dir/sharedmemory"
setflag() {{ printf '\001' | dd of="$shm" bs=1 seek=$((idx * 8 + $1)) conv=notrunc 2>/dev/null; }}
getflag() {{ dd if="$shm" bs=1 skip=$((idx * 8 + $1)) count=1 2>/dev/null | od -An -tu1 | tr -d ' \n'; }}
cat "$props"
echo "main class: $(for a; do case "$a" in org.*) echo "$a";; esac; done)"
{before_ready}
setflag 0
{after_ready}
while [ "$(getflag 1)" != 1 ]; do sleep 0.1; done
echo "stopping gracefully""#
        ),
    );
    path
}

/// Write a fake search engine into `dir` that runs until signalled.
pub fn fake_search_engine(dir: &Path) -> PathBuf {
    let path = dir.join("elasticsearch");
    write_script(&path, "echo \"search engine args: $*\"\nexec sleep 300");
    path
}

/// Lay out a home directory and write a launcher config for it.
/// `extra` is appended to the generated YAML.
pub fn write_config(home: &Path, java: &Path, extra: &str) -> PathBuf {
    std::fs::create_dir_all(home.join("elasticsearch")).unwrap();
    let search = fake_search_engine(&home.join("elasticsearch"));
    let yaml = format!(
        "home_dir: {home}\ntemp_dir: {home}/temp\njava_path: {java}\nlog_level: debug\n{extra}search:\n  executable: {search}\n  port: {port}\n",
        home = home.display(),
        java = java.display(),
        search = search.display(),
        port = serve_green_cluster(),
    );
    let path = home.join("launcher.yaml");
    std::fs::write(&path, yaml)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    path
}

/// Check if a PID is still alive.
pub fn pid_is_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    signal::kill(Pid::from_raw(pid), None).is_ok()
}

/// Wait until a PID is no longer alive, or timeout.
pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_is_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
