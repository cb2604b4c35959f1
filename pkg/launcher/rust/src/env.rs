// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use log::warn;
use std::collections::BTreeMap;
use std::path::Path;

/// Parse a systemd-style environment file into a map.
/// Supports `KEY=VALUE`, `KEY="VALUE"`, `KEY='VALUE'`, an `export ` prefix,
/// comments (#) and blank lines. A path starting with `-` is optional: a
/// missing file yields an empty map.
pub fn parse_environment_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let (path, optional) = match path.to_str().and_then(|p| p.strip_prefix('-')) {
        Some(stripped) => (Path::new(stripped), true),
        None => (path, false),
    };
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if optional && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(BTreeMap::new());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("reading environment file: {}", path.display()));
        }
    };

    let mut vars = BTreeMap::new();
    for (lineno, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        match trimmed.split_once('=') {
            Some((key, raw_val)) => {
                let val = raw_val
                    .trim()
                    .trim_matches('"')
                    .trim_matches('\'')
                    .to_string();
                vars.insert(key.trim().to_string(), val);
            }
            None => warn!(
                "{}:{}: ignoring line without '='",
                path.display(),
                lineno + 1
            ),
        }
    }
    Ok(vars)
}
