use clap::{Args, Subcommand};
use serde::Serialize;

use gitship::defaults::{self, Defaults, GitshipConfig};

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display configuration (merged defaults + file)
    Show,
    /// Show the built-in defaults (ignore gitship.json)
    Builtin,
    /// Show the path to gitship.json
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<GitshipConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    defaults: Option<Defaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
}

impl ConfigOutput {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            config: None,
            defaults: None,
            path: None,
            exists: None,
        }
    }
}

pub fn run(args: ConfigArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show => Ok((
            ConfigOutput {
                config: Some(defaults::load_config()),
                ..ConfigOutput::new("config.show")
            },
            0,
        )),
        ConfigCommand::Builtin => Ok((
            ConfigOutput {
                defaults: Some(defaults::builtin_defaults()),
                ..ConfigOutput::new("config.builtin")
            },
            0,
        )),
        ConfigCommand::Path => Ok((
            ConfigOutput {
                path: Some(defaults::config_path()?),
                exists: Some(defaults::config_exists()),
                ..ConfigOutput::new("config.path")
            },
            0,
        )),
    }
}
