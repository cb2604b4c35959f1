// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

/// Number of command-channel slots. Every `ipc_index` must be below this.
pub const MAX_PROCESSES: usize = 5;

/// A supervised role. Each role owns a fixed command-channel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessId {
    App,
    Elasticsearch,
    WebServer,
    ComputeEngine,
}

impl ProcessId {
    pub const ALL: [ProcessId; 4] = [
        ProcessId::App,
        ProcessId::Elasticsearch,
        ProcessId::WebServer,
        ProcessId::ComputeEngine,
    ];

    /// Short key, written to the handoff file as `process.key`.
    pub fn key(self) -> &'static str {
        match self {
            ProcessId::App => "app",
            ProcessId::Elasticsearch => "es",
            ProcessId::WebServer => "web",
            ProcessId::ComputeEngine => "ce",
        }
    }

    pub fn ipc_index(self) -> usize {
        match self {
            ProcessId::App => 0,
            ProcessId::Elasticsearch => 1,
            ProcessId::WebServer => 2,
            ProcessId::ComputeEngine => 3,
        }
    }

    pub fn human_readable_name(self) -> &'static str {
        match self {
            ProcessId::App => "SonarQube",
            ProcessId::Elasticsearch => "ElasticSearch",
            ProcessId::WebServer => "Web Server",
            ProcessId::ComputeEngine => "Compute Engine",
        }
    }

    pub fn from_key(key: &str) -> Option<ProcessId> {
        Self::ALL.into_iter().find(|id| id.key() == key)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
