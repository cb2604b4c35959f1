// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Control surface shared between the supervisor and its JVM children.
//!
//! Each child owns one fixed-size record in a memory-mapped file located in the
//! shared directory. The child raises `operational` and `restart`; the
//! supervisor raises `stop` and clears `restart` once it has acted on it.

use crate::error::ChannelError;
use crate::process_id::MAX_PROCESSES;
use log::debug;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const SHARED_MEMORY_FILE: &str = "sharedmemory";
pub const BYTES_PER_PROCESS: usize = 8;

const OPERATIONAL_OFFSET: usize = 0;
const STOP_OFFSET: usize = 1;
const RESTART_OFFSET: usize = 2;

const SET: u8 = 0x01;
const CLEAR: u8 = 0x00;

/// Supervisor-side view of one slot.
pub trait ProcessCommands: Send + Sync {
    /// Monotone within one process lifetime.
    fn is_operational(&self) -> bool;
    /// One-shot; does not wait for the child to react.
    fn ask_for_stop(&self);
    fn asked_for_restart(&self) -> bool;
    fn acknowledge_ask_for_restart(&self);
}

/// Allocates slots. `create_after_clean` must run before the child is spawned.
pub trait CommandChannel: Send + Sync {
    fn create_after_clean(&self, index: usize) -> Result<Box<dyn ProcessCommands>, ChannelError>;
}

/// Command channel backed by a memory-mapped file.
pub struct FileCommandChannel {
    path: PathBuf,
    mmap: Arc<Mutex<MmapMut>>,
}

impl FileCommandChannel {
    /// Open (creating if needed) the shared file in `shared_dir`. Existing
    /// contents are kept so a child can attach to a slot the supervisor set up.
    pub fn open(shared_dir: &Path) -> Result<Self, ChannelError> {
        let path = shared_dir.join(SHARED_MEMORY_FILE);
        let io_err = |source| ChannelError::Io {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;
        file.set_len((MAX_PROCESSES * BYTES_PER_PROCESS) as u64)
            .map_err(io_err)?;
        // SAFETY: the file is sized above and only ever accessed through this
        // mapping's byte slice; concurrent writers are other processes touching
        // disjoint flags of single bytes.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(io_err)?;

        debug!("command channel mapped at {}", path.display());
        Ok(Self {
            path,
            mmap: Arc::new(Mutex::new(mmap)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attach to a slot without resetting it. Used from the child side.
    pub fn attach(&self, index: usize) -> Result<FileProcessCommands, ChannelError> {
        check_index(index)?;
        Ok(FileProcessCommands {
            mmap: Arc::clone(&self.mmap),
            offset: index * BYTES_PER_PROCESS,
        })
    }

    /// Reset every slot.
    pub fn clean(&self) {
        let mut mmap = self.mmap.lock().unwrap_or_else(PoisonError::into_inner);
        mmap.fill(CLEAR);
    }
}

impl CommandChannel for FileCommandChannel {
    fn create_after_clean(&self, index: usize) -> Result<Box<dyn ProcessCommands>, ChannelError> {
        let commands = self.attach(index)?;
        commands.reset();
        debug!("command channel slot {index} cleaned");
        Ok(Box::new(commands))
    }
}

fn check_index(index: usize) -> Result<(), ChannelError> {
    if index >= MAX_PROCESSES {
        return Err(ChannelError::InvalidSlot {
            index,
            max: MAX_PROCESSES,
        });
    }
    Ok(())
}

/// One slot of a [`FileCommandChannel`].
pub struct FileProcessCommands {
    mmap: Arc<Mutex<MmapMut>>,
    offset: usize,
}

impl FileProcessCommands {
    fn read(&self, flag: usize) -> bool {
        let mmap = self.mmap.lock().unwrap_or_else(PoisonError::into_inner);
        mmap.get(self.offset + flag).is_some_and(|&b| b == SET)
    }

    fn write(&self, flag: usize, value: u8) {
        let mut mmap = self.mmap.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(b) = mmap.get_mut(self.offset + flag) {
            *b = value;
        }
    }

    fn reset(&self) {
        let mut mmap = self.mmap.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = mmap.get_mut(self.offset..self.offset + BYTES_PER_PROCESS) {
            record.fill(CLEAR);
        }
    }

    /// Child side: declare the process ready to serve.
    pub fn set_operational(&self) {
        self.write(OPERATIONAL_OFFSET, SET);
    }

    /// Child side: request that the supervisor restart everything.
    pub fn ask_for_restart(&self) {
        self.write(RESTART_OFFSET, SET);
    }

    /// Child side: whether the supervisor asked this process to stop.
    pub fn asked_for_stop(&self) -> bool {
        self.read(STOP_OFFSET)
    }
}

impl ProcessCommands for FileProcessCommands {
    fn is_operational(&self) -> bool {
        self.read(OPERATIONAL_OFFSET)
    }

    fn ask_for_stop(&self) {
        self.write(STOP_OFFSET, SET);
    }

    fn asked_for_restart(&self) -> bool {
        self.read(RESTART_OFFSET)
    }

    fn acknowledge_ask_for_restart(&self) {
        self.write(RESTART_OFFSET, CLEAR);
    }
}
