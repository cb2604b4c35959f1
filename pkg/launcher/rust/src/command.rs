// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory descriptions of how to invoke a child process.
//!
//! A command is mutable while it is being built and is moved into the
//! launcher, which reads it once.

use crate::process_id::ProcessId;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Attributes shared by every kind of child process.
#[derive(Debug, Clone)]
pub struct CommandBase {
    id: ProcessId,
    work_dir: Option<PathBuf>,
    arguments: Vec<(String, String)>,
    env: BTreeMap<OsString, OsString>,
}

impl CommandBase {
    /// Create a command whose environment is seeded from the current process.
    /// Names and values are kept as the OS reported them, UTF-8 or not.
    pub fn new(id: ProcessId) -> Self {
        Self::with_env(id, std::env::vars_os().collect())
    }

    /// Create a command with an explicit initial environment.
    pub fn with_env(id: ProcessId, env: BTreeMap<OsString, OsString>) -> Self {
        Self {
            id,
            work_dir: None,
            arguments: Vec::new(),
            env,
        }
    }

    pub fn process_id(&self) -> ProcessId {
        self.id
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Arguments in insertion order.
    pub fn arguments(&self) -> &[(String, String)] {
        &self.arguments
    }

    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn env(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }
}

/// Fluent setters shared by [`JavaCommand`] and [`EsCommand`].
pub trait Command {
    fn base(&self) -> &CommandBase;
    fn base_mut(&mut self) -> &mut CommandBase;

    fn process_id(&self) -> ProcessId {
        self.base().id
    }

    fn set_work_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self
    where
        Self: Sized,
    {
        self.base_mut().work_dir = Some(dir.into());
        self
    }

    /// Set an argument. A key that is already present keeps its position and
    /// takes the new value.
    fn set_argument(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self
    where
        Self: Sized,
    {
        let key = key.into();
        let value = value.into();
        let arguments = &mut self.base_mut().arguments;
        match arguments.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => arguments.push((key, value)),
        }
        self
    }

    fn remove_argument(&mut self, key: &str) -> &mut Self
    where
        Self: Sized,
    {
        self.base_mut().arguments.retain(|(k, _)| k != key);
        self
    }

    /// Set or remove an argument depending on `value`.
    fn set_optional_argument(&mut self, key: &str, value: Option<&str>) -> &mut Self
    where
        Self: Sized,
    {
        match value {
            Some(v) => self.set_argument(key, v),
            None => self.remove_argument(key),
        }
    }

    fn set_arguments<K, V>(&mut self, args: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        Self: Sized,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in args {
            self.set_argument(k, v);
        }
        self
    }

    fn set_env_variable(
        &mut self,
        key: impl Into<OsString>,
        value: impl Into<OsString>,
    ) -> &mut Self
    where
        Self: Sized,
    {
        self.base_mut().env.insert(key.into(), value.into());
        self
    }

    fn remove_env_variable(&mut self, key: impl AsRef<OsStr>) -> &mut Self
    where
        Self: Sized,
    {
        self.base_mut().env.remove(key.as_ref());
        self
    }
}

/// A child hosted by a JVM.
#[derive(Debug, Clone)]
pub struct JavaCommand {
    base: CommandBase,
    class_name: Option<String>,
    java_options: Vec<String>,
    classpath: Vec<String>,
}

impl JavaCommand {
    pub fn new(id: ProcessId) -> Self {
        Self::from_base(CommandBase::new(id))
    }

    pub fn from_base(base: CommandBase) -> Self {
        Self {
            base,
            class_name: None,
            java_options: Vec::new(),
            classpath: Vec::new(),
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn java_options(&self) -> &[String] {
        &self.java_options
    }

    pub fn classpath(&self) -> &[String] {
        &self.classpath
    }

    pub fn set_class_name(&mut self, class_name: impl Into<String>) -> &mut Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Append a single JVM flag. Blank tokens are ignored.
    pub fn add_java_option(&mut self, option: &str) -> &mut Self {
        let option = option.trim();
        if !option.is_empty() {
            self.java_options.push(option.to_string());
        }
        self
    }

    /// Split a whitespace-separated options string and append every token.
    pub fn add_java_options(&mut self, options: &str) -> &mut Self {
        for token in options.split_whitespace() {
            self.add_java_option(token);
        }
        self
    }

    pub fn add_classpath(&mut self, entry: impl Into<String>) -> &mut Self {
        self.classpath.push(entry.into());
        self
    }
}

impl Command for JavaCommand {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }
}

/// The search-engine child, started from its own native launcher script.
#[derive(Debug, Clone)]
pub struct EsCommand {
    base: CommandBase,
    executable: Option<PathBuf>,
    options: Vec<String>,
    url: String,
}

impl EsCommand {
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_base(CommandBase::new(ProcessId::Elasticsearch), url)
    }

    pub fn from_base(base: CommandBase, url: impl Into<String>) -> Self {
        Self {
            base,
            executable: None,
            options: Vec::new(),
            url: url.into(),
        }
    }

    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Base URL of the node's HTTP API, e.g. `http://127.0.0.1:9001`.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_executable(&mut self, executable: impl Into<PathBuf>) -> &mut Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn add_option(&mut self, option: impl Into<String>) -> &mut Self {
        self.options.push(option.into());
        self
    }
}

impl Command for EsCommand {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }
}
