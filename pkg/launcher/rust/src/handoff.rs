// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Passes a JVM child its configuration through a properties file whose path
//! is the child's only positional argument.

use crate::command::{Command, JavaCommand};
use crate::error::HandoffError;
use crate::process_id::ProcessId;
use anyhow::{Context, Result, anyhow};
use java_properties::{PropertiesError, PropertiesIter, PropertiesWriter};
use log::{debug, warn};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

pub const PROPERTY_PROCESS_KEY: &str = "process.key";
pub const PROPERTY_PROCESS_INDEX: &str = "process.index";
pub const PROPERTY_SHARED_PATH: &str = "process.sharedDir";
pub const PROPERTY_TERMINATION_TIMEOUT: &str = "process.terminationTimeoutMs";

pub const DEFAULT_TERMINATION_TIMEOUT_MS: u64 = 60_000;

/// Handoff files are named `<prefix><random><suffix>` inside the shared directory.
pub const FILE_PREFIX: &str = "sq-process";
pub const FILE_SUFFIX: &str = ".properties";

const IDENTITY_KEYS: [&str; 4] = [
    PROPERTY_PROCESS_KEY,
    PROPERTY_PROCESS_INDEX,
    PROPERTY_SHARED_PATH,
    PROPERTY_TERMINATION_TIMEOUT,
];

/// Write every argument of `command` plus the process identity into a new
/// file under `shared_dir`. Returns the file path.
pub fn write_properties(shared_dir: &Path, command: &JavaCommand) -> Result<PathBuf, HandoffError> {
    let to_err = |source| HandoffError {
        dir: shared_dir.to_path_buf(),
        source,
    };
    let shared_dir_abs = std::path::absolute(shared_dir).map_err(to_err)?;
    let id = command.process_id();

    let mut entries: Vec<(String, String)> = command
        .base()
        .arguments()
        .iter()
        .filter(|(k, _)| !IDENTITY_KEYS.contains(&k.as_str()))
        .cloned()
        .collect();
    entries.push((PROPERTY_PROCESS_KEY.to_string(), id.key().to_string()));
    entries.push((PROPERTY_PROCESS_INDEX.to_string(), id.ipc_index().to_string()));
    entries.push((
        PROPERTY_SHARED_PATH.to_string(),
        shared_dir_abs.display().to_string(),
    ));
    entries.push((
        PROPERTY_TERMINATION_TIMEOUT.to_string(),
        DEFAULT_TERMINATION_TIMEOUT_MS.to_string(),
    ));

    let mut file = tempfile::Builder::new()
        .prefix(FILE_PREFIX)
        .suffix(FILE_SUFFIX)
        .tempfile_in(shared_dir)
        .map_err(to_err)?;
    write_entries(file.as_file_mut(), &entries).map_err(|e| to_err(io::Error::other(e)))?;
    let (_, path) = file.keep().map_err(|e| to_err(e.error))?;

    debug!("[{id}] wrote process properties to {}", path.display());
    Ok(path)
}

fn write_entries(file: &mut File, entries: &[(String, String)]) -> Result<(), PropertiesError> {
    let mut writer = PropertiesWriter::new(file);
    writer.write_comment("Process properties")?;
    for (key, value) in entries {
        writer.write(key, value)?;
    }
    writer.finish()
}

/// Delete a handoff file whose child no longer needs it.
pub fn remove_properties(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove {}: {e}", path.display()),
    }
}

/// Delete the handoff files a previous run left in `shared_dir`. Returns the
/// number of files removed.
pub fn remove_stale_files(shared_dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(shared_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_handoff = name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX);
        if is_handoff && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// What a JVM child reads back on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessProperties {
    pub process_id: ProcessId,
    pub shared_dir: PathBuf,
    pub termination_timeout_ms: u64,
    /// Command arguments, in file order, without the identity keys.
    pub arguments: Vec<(String, String)>,
}

impl ProcessProperties {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
        let mut entries: Vec<(String, String)> = Vec::new();
        PropertiesIter::new(BufReader::new(file))
            .read_into(|key, value| match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            })
            .with_context(|| format!("parsing {}", path.display()))?;

        let mut take = |key: &str| -> Option<String> {
            let pos = entries.iter().position(|(k, _)| k == key)?;
            Some(entries.remove(pos).1)
        };
        let key = take(PROPERTY_PROCESS_KEY).context("missing process.key")?;
        let index = take(PROPERTY_PROCESS_INDEX).context("missing process.index")?;
        let shared_dir = take(PROPERTY_SHARED_PATH).context("missing process.sharedDir")?;
        let timeout = take(PROPERTY_TERMINATION_TIMEOUT);

        let process_id =
            ProcessId::from_key(&key).ok_or_else(|| anyhow!("unknown process key: {key}"))?;
        let index: usize = index
            .parse()
            .with_context(|| format!("invalid process.index: {index}"))?;
        if index != process_id.ipc_index() {
            return Err(anyhow!(
                "process.index {index} does not match process [{process_id}]"
            ));
        }
        let termination_timeout_ms = match timeout {
            Some(t) => t
                .parse()
                .with_context(|| format!("invalid process.terminationTimeoutMs: {t}"))?,
            None => DEFAULT_TERMINATION_TIMEOUT_MS,
        };

        Ok(Self {
            process_id,
            shared_dir: PathBuf::from(shared_dir),
            termination_timeout_ms,
            arguments: entries,
        })
    }
}
