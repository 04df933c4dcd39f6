//! Configuration view and validation commands: `kanbanmgr config`.

use anyhow::{Context, Result};

use super::super::{Cli, ConfigCommands};
use super::load_config;

const MASK: &str = "********";

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let mut config = load_config(cli)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            for secret in [&mut config.github.token, &mut config.github.webhook_secret] {
                if !secret.is_empty() {
                    *secret = MASK.to_string();
                }
            }
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            config.validate()?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
