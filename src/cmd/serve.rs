//! Webhook server command: `kanbanmgr serve`.

use anyhow::Result;

use super::super::Cli;
use super::load_config;

pub async fn cmd_serve(cli: &Cli, port: Option<u16>) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    kanbanmgr::board::server::start_server(config).await
}
