// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Cluster health checks for the search-engine child, which has no command
//! channel and reports readiness only through its HTTP API.

use log::{debug, warn};
use serde::Deserialize;
use std::time::Duration;

pub const HEALTH_PATH: &str = "/_cluster/health?wait_for_status=yellow&timeout=30s";

/// Per-request timeout. Larger than the server-side `timeout=30s` so the
/// node answers before the client gives up.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(35);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Green,
    Yellow,
    Red,
    /// Nothing is listening yet.
    ConnectionRefused,
    /// Any other failure: unexpected body, timeout, broken connection.
    Unavailable,
}

impl ClusterStatus {
    pub fn is_ready(self) -> bool {
        matches!(self, ClusterStatus::Green | ClusterStatus::Yellow)
    }

    /// Parse a `_cluster/health` response body.
    pub fn from_body(body: &str) -> ClusterStatus {
        match serde_json::from_str::<HealthDocument>(body) {
            Ok(doc) => match doc.status.as_str() {
                "green" => ClusterStatus::Green,
                "yellow" => ClusterStatus::Yellow,
                "red" => ClusterStatus::Red,
                other => {
                    debug!("[es] unknown cluster status {other:?}");
                    ClusterStatus::Unavailable
                }
            },
            Err(e) => {
                debug!("[es] unparseable cluster health document: {e}");
                ClusterStatus::Unavailable
            }
        }
    }
}

#[derive(Deserialize)]
struct HealthDocument {
    status: String,
}

/// One blocking health request. Called off the async workers.
pub trait ClusterHealthCheck: Send + Sync {
    fn check(&self) -> ClusterStatus;
}

/// Queries `<base url>/_cluster/health` over HTTP.
pub struct HttpClusterHealthCheck {
    url: String,
    agent: ureq::Agent,
}

impl HttpClusterHealthCheck {
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/')),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ClusterHealthCheck for HttpClusterHealthCheck {
    fn check(&self) -> ClusterStatus {
        match self.agent.get(&self.url).call() {
            Ok(resp) => status_from_response(resp),
            // The node answers 408 when the wait_for_status deadline expires,
            // still with a health document in the body.
            Err(ureq::Error::Status(code, resp)) => {
                debug!("[es] cluster health answered {code}");
                status_from_response(resp)
            }
            Err(ureq::Error::Transport(t)) if t.kind() == ureq::ErrorKind::ConnectionFailed => {
                ClusterStatus::ConnectionRefused
            }
            Err(e) => {
                warn!("[es] failed to check status: {e}");
                ClusterStatus::Unavailable
            }
        }
    }
}

fn status_from_response(resp: ureq::Response) -> ClusterStatus {
    match resp.into_string() {
        Ok(body) => ClusterStatus::from_body(&body),
        Err(e) => {
            warn!("[es] failed to read cluster health response: {e}");
            ClusterStatus::Unavailable
        }
    }
}
