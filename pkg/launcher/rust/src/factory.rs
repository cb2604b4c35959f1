// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Builds the command of each role from the launcher configuration.

use crate::command::{Command, CommandBase, EsCommand, JavaCommand};
use crate::config::{JavaProcessConfig, LauncherConfig};
use crate::env::parse_environment_file;
use crate::launcher::LaunchCommand;
use crate::process_id::ProcessId;
use anyhow::Result;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

pub const WEB_SERVER_CLASS: &str = "org.sonar.server.app.WebServer";
pub const COMPUTE_ENGINE_CLASS: &str = "org.sonar.ce.app.CeServer";

pub const PROPERTY_PATH_HOME: &str = "sonar.path.home";
pub const PROPERTY_PATH_TEMP: &str = "sonar.path.temp";
pub const PROPERTY_SEARCH_HOST: &str = "sonar.search.host";
pub const PROPERTY_SEARCH_PORT: &str = "sonar.search.port";

const WEB_CLASSPATH: [&str; 2] = ["./lib/common/*", "./lib/server/*"];
const CE_CLASSPATH: [&str; 3] = ["./lib/common/*", "./lib/server/*", "./lib/ce/*"];

pub struct CommandFactory {
    config: LauncherConfig,
    /// Variables from the environment file, applied on top of the parent's.
    file_env: BTreeMap<String, String>,
}

impl CommandFactory {
    pub fn new(config: LauncherConfig) -> Result<Self> {
        let file_env = match &config.environment_file {
            Some(path) => parse_environment_file(path)?,
            None => BTreeMap::new(),
        };
        Ok(Self { config, file_env })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// Enabled roles, in start order.
    pub fn enabled_processes(&self) -> Vec<ProcessId> {
        let mut ids = Vec::new();
        if self.config.search.enabled {
            ids.push(ProcessId::Elasticsearch);
        }
        if self.config.web.enabled {
            ids.push(ProcessId::WebServer);
        }
        if self.config.compute_engine.enabled {
            ids.push(ProcessId::ComputeEngine);
        }
        ids
    }

    /// Fresh command for `id`, or `None` if nothing runs under that role.
    pub fn create(&self, id: ProcessId) -> Option<LaunchCommand> {
        match id {
            ProcessId::Elasticsearch => Some(self.create_es_command().into()),
            ProcessId::WebServer => Some(self.create_web_command().into()),
            ProcessId::ComputeEngine => Some(self.create_ce_command().into()),
            ProcessId::App => None,
        }
    }

    fn base(&self, id: ProcessId, role_env: &BTreeMap<String, String>) -> CommandBase {
        let mut env = CommandBase::new(id).env().clone();
        let layered = self.file_env.iter().chain(role_env);
        env.extend(layered.map(|(k, v)| (OsString::from(k), OsString::from(v))));
        CommandBase::with_env(id, env)
    }

    pub fn search_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.search.host, self.config.search.port
        )
    }

    pub fn create_es_command(&self) -> EsCommand {
        let search = &self.config.search;
        let es_home = self.config.home_dir.join("elasticsearch");
        let executable = search
            .executable
            .clone()
            .unwrap_or_else(|| es_home.join("bin").join("elasticsearch"));

        let mut cmd = EsCommand::from_base(
            self.base(ProcessId::Elasticsearch, &search.env),
            self.search_url(),
        );
        cmd.set_work_dir(es_home);
        cmd.set_executable(executable)
            .add_option(format!("-Ehttp.host={}", search.host))
            .add_option(format!("-Ehttp.port={}", search.port));
        for option in &search.options {
            cmd.add_option(option.clone());
        }
        cmd
    }

    pub fn create_web_command(&self) -> JavaCommand {
        self.java_command(
            ProcessId::WebServer,
            &self.config.web,
            WEB_SERVER_CLASS,
            &WEB_CLASSPATH,
        )
    }

    pub fn create_ce_command(&self) -> JavaCommand {
        self.java_command(
            ProcessId::ComputeEngine,
            &self.config.compute_engine,
            COMPUTE_ENGINE_CLASS,
            &CE_CLASSPATH,
        )
    }

    fn java_command(
        &self,
        id: ProcessId,
        role: &JavaProcessConfig,
        default_class: &str,
        default_classpath: &[&str],
    ) -> JavaCommand {
        let mut cmd = JavaCommand::from_base(self.base(id, &role.env));
        cmd.set_work_dir(self.config.home_dir.clone())
            .set_argument(PROPERTY_PATH_HOME, path_string(&self.config.home_dir))
            .set_argument(PROPERTY_PATH_TEMP, path_string(&self.config.temp_dir))
            .set_argument(PROPERTY_SEARCH_HOST, self.config.search.host.clone())
            .set_argument(PROPERTY_SEARCH_PORT, self.config.search.port.to_string())
            .set_arguments(role.properties.iter());

        cmd.add_java_options(&role.java_opts)
            .add_java_options(&role.java_additional_opts)
            .set_class_name(role.entry_class.as_deref().unwrap_or(default_class));
        match &role.classpath {
            Some(classpath) => {
                for entry in classpath {
                    cmd.add_classpath(entry.clone());
                }
            }
            None => {
                for entry in default_classpath {
                    cmd.add_classpath(*entry);
                }
            }
        }
        cmd
    }
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}
