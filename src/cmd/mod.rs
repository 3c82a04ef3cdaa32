//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `verify` | `Verify`         |
//! | `config` | `Config`         |

pub mod config;
pub mod serve;
pub mod verify;

pub use config::cmd_config;
pub use serve::cmd_serve;
pub use verify::cmd_verify;

use anyhow::{Result, bail};
use patchwright::config::Config;

/// Log every validation problem and fail if there were any.
pub(crate) fn require_valid(config: &Config) -> Result<()> {
    let problems = config.validate();
    if problems.is_empty() {
        return Ok(());
    }
    for problem in &problems {
        tracing::error!("{}", problem);
    }
    bail!("Invalid configuration ({} problem(s))", problems.len())
}
