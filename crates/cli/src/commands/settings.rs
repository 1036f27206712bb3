//! Saved CLI defaults

use anyhow::Result;

use crate::config::Config;
use crate::output::{print_json, print_success};

/// Print the saved defaults
pub fn show() -> Result<()> {
    print_json(&Config::load()?)
}

/// Merge `update` into the saved defaults
pub fn set(update: Config) -> Result<()> {
    let config = Config::load()?.merged(update);
    let path = config.save()?;
    print_success(&format!("Saved {}", path.display()));
    Ok(())
}
