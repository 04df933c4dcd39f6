//! One-off deadline sweep: `kanbanmgr sweep`.

use anyhow::Result;
use chrono::Utc;
use kanbanmgr::board::server::{Services, github_provider, open_db};

use super::super::Cli;
use super::load_config;

pub async fn cmd_sweep(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    config.validate()?;

    let services = Services::new(&config, github_provider(&config)?, open_db(&config)?);
    services.rebuild().await?;
    let report = services.deadlines.sweep_all(Utc::now()).await;

    println!(
        "Checked {} issues: {} overdue, {} failed",
        report.checked, report.overdue, report.failed
    );
    if report.failed > 0 {
        anyhow::bail!("{} issues could not be processed", report.failed);
    }
    Ok(())
}
