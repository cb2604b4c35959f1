// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/sonarqube/launcher.yaml";
pub const CONFIG_PATH_ENV: &str = "SQ_LAUNCHER_CONFIG";

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stop_timeout() -> u64 {
    60
}

fn default_search_host() -> String {
    "127.0.0.1".to_string()
}

fn default_search_port() -> u16 {
    9001
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LauncherConfig {
    pub home_dir: PathBuf,
    /// Shared with the children: handoff files and the command channel live here.
    pub temp_dir: PathBuf,
    pub java_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds to wait for a process to exit after asking it to stop.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
    pub environment_file: Option<PathBuf>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub web: JavaProcessConfig,
    #[serde(default)]
    pub compute_engine: JavaProcessConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `<home_dir>/elasticsearch/bin/elasticsearch`.
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default = "default_search_host")]
    pub host: String,
    #[serde(default = "default_search_port")]
    pub port: u16,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            executable: None,
            options: Vec::new(),
            host: default_search_host(),
            port: default_search_port(),
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JavaProcessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub java_opts: String,
    #[serde(default)]
    pub java_additional_opts: String,
    pub entry_class: Option<String>,
    /// Replaces the default classpath of the role when set.
    pub classpath: Option<Vec<String>>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for JavaProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            java_opts: String::new(),
            java_additional_opts: String::new(),
            entry_class: None,
            classpath: None,
            properties: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

impl LauncherConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }

    pub fn log_level(&self) -> Result<log::LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| anyhow!("invalid log_level: {}", self.log_level))
    }

    fn validate(&self) -> Result<()> {
        if !self.home_dir.is_absolute() {
            bail!("home_dir must be absolute: {}", self.home_dir.display());
        }
        if !self.search.enabled && (self.web.enabled || self.compute_engine.enabled) {
            bail!("web and compute_engine require search to be enabled");
        }
        if !self.web.enabled && self.compute_engine.enabled {
            bail!("compute_engine requires web to be enabled");
        }
        self.log_level()?;
        Ok(())
    }
}

/// `--config` wins over `SQ_LAUNCHER_CONFIG`, which wins over the default path.
pub fn config_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: LauncherConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, yaml: &str) -> PathBuf {
        let path = dir.join("launcher.yaml");
        fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn test_parse_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
home_dir: /opt/sonarqube
temp_dir: /opt/sonarqube/temp
java_path: /usr/lib/jvm/java-17/bin/java
log_level: debug
stop_timeout: 30
environment_file: /etc/default/sonarqube
search:
  executable: /opt/sonarqube/elasticsearch/bin/elasticsearch
  options: ["-Ecluster.name=sonarqube"]
  host: 10.0.0.1
  port: 9200
  env:
    ES_JAVA_OPTS: -Xmx1g
web:
  java_opts: -Xmx512m -Xms128m
  java_additional_opts: -Dfoo=bar
  properties:
    sonar.web.port: "9000"
  env:
    LANG: C
compute_engine:
  enabled: false
"#;
        let config = load_config(&write(dir.path(), yaml)).unwrap();

        assert_eq!(config.home_dir, PathBuf::from("/opt/sonarqube"));
        assert_eq!(config.temp_dir, PathBuf::from("/opt/sonarqube/temp"));
        assert_eq!(
            config.java_path.as_deref(),
            Some(Path::new("/usr/lib/jvm/java-17/bin/java"))
        );
        assert_eq!(config.log_level().unwrap(), log::LevelFilter::Debug);
        assert_eq!(config.stop_timeout(), Duration::from_secs(30));
        assert_eq!(config.search.host, "10.0.0.1");
        assert_eq!(config.search.port, 9200);
        assert_eq!(config.search.options, vec!["-Ecluster.name=sonarqube"]);
        assert_eq!(config.search.env["ES_JAVA_OPTS"], "-Xmx1g");
        assert!(config.web.enabled);
        assert_eq!(config.web.java_opts, "-Xmx512m -Xms128m");
        assert_eq!(config.web.properties["sonar.web.port"], "9000");
        assert!(!config.compute_engine.enabled);
    }

    #[test]
    fn test_parse_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            load_config(&write(dir.path(), "home_dir: /opt/sq\ntemp_dir: /tmp/sq\n")).unwrap();

        assert!(config.java_path.is_none());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.stop_timeout(), Duration::from_secs(60));
        assert!(config.search.enabled);
        assert_eq!(config.search.host, "127.0.0.1");
        assert_eq!(config.search.port, 9001);
        assert!(config.web.enabled);
        assert!(config.web.classpath.is_none());
        assert!(config.compute_engine.enabled);
    }

    #[test]
    fn test_rejects_relative_home() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&write(dir.path(), "home_dir: sq\ntemp_dir: /tmp\n")).unwrap_err();
        assert!(format!("{err:#}").contains("home_dir must be absolute"));
    }

    #[test]
    fn test_rejects_ce_without_web() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "home_dir: /sq\ntemp_dir: /tmp\nweb:\n  enabled: false\n";
        assert!(load_config(&write(dir.path(), yaml)).is_err());
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "home_dir: /sq\ntemp_dir: /tmp\nweb:\n  jvm_opts: -Xmx1g\n";
        assert!(load_config(&write(dir.path(), yaml)).is_err());
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "home_dir: /sq\ntemp_dir: /tmp\nlog_level: chatty\n";
        assert!(load_config(&write(dir.path(), yaml)).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_config(Path::new("/nonexistent/launcher.yaml")).is_err());
    }

    #[test]
    fn test_config_path_precedence() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("/env/launcher.yaml"), || {
            assert_eq!(
                config_path(Some(PathBuf::from("/cli/launcher.yaml"))),
                PathBuf::from("/cli/launcher.yaml")
            );
            assert_eq!(config_path(None), PathBuf::from("/env/launcher.yaml"));
        });
        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            assert_eq!(config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
        });
    }
}
