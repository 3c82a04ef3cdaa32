//! `patchwright config`: print the effective configuration.

use std::path::Path;

use anyhow::Result;
use patchwright::config::Config;

pub fn cmd_config(config_path: &Path, config: &Config) -> Result<()> {
    if config_path.exists() {
        println!("# Config file: {}", config_path.display());
    } else {
        println!("# Config file: {} (not found, using defaults)", config_path.display());
    }
    println!();
    print!("{}", config.redacted()?);

    let problems = config.validate();
    if !problems.is_empty() {
        eprintln!();
        for problem in &problems {
            eprintln!("warning: {}", problem);
        }
    }
    Ok(())
}
