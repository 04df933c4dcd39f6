//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `init_db` | `InitDb`         |
//! | `sweep`   | `Sweep`          |
//! | `parse`   | `Parse`          |
//! | `config`  | `Config`         |

pub mod config;
pub mod init_db;
pub mod parse;
pub mod serve;
pub mod sweep;

pub use config::cmd_config;
pub use init_db::cmd_init_db;
pub use parse::cmd_parse;
pub use serve::cmd_serve;
pub use sweep::cmd_sweep;

use anyhow::Result;
use kanbanmgr::config::Config;

use super::Cli;

/// Resolve configuration from the `--config` file, defaults and environment.
fn load_config(cli: &Cli) -> Result<Config> {
    Config::resolve(cli.config.as_deref())
}
