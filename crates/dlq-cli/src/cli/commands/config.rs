//! `dlq config` – show where the config lives and what is in effect.

use anyhow::Result;
use dlq_core::config::{self, DlqConfig};
use dlq_core::logging;

pub fn run_config(cfg: &DlqConfig) -> Result<()> {
    println!("# config: {}", config::config_path()?.display());
    if let Ok(log) = logging::log_path() {
        println!("# log:    {}", log.display());
    }
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
