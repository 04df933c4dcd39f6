//! Database bootstrap command: `kanbanmgr init-db`.

use std::path::PathBuf;

use anyhow::Result;

use super::super::Cli;
use super::load_config;

pub fn cmd_init_db(cli: &Cli, db_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(path) = db_path {
        config.server.db_path = path;
    }

    kanbanmgr::board::server::open_db(&config)?;
    println!(
        "Deadline database initialized at {}",
        config.server.db_path.display()
    );
    Ok(())
}
