//! `slippymap providers` - list registered providers.

use slippymap::provider::ProviderRegistry;

use super::common::load_config;
use crate::error::CliError;
use crate::GlobalArgs;

pub fn run(global: &GlobalArgs) -> Result<(), CliError> {
    let config = load_config(global.config.as_deref())?;
    let credentials = config.provider.credentials();
    let registry = ProviderRegistry::with_defaults();

    let mut names: Vec<&str> = registry.names().collect();
    names.sort_unstable();

    println!("Available providers:");
    for name in names {
        let marker = if name == config.provider.provider_type { "*" } else { " " };
        let status = match registry.create(name, &credentials) {
            Ok(_) => "ready".to_string(),
            Err(e) => e.to_string(),
        };
        println!(" {} {:<14} {}", marker, name, status);
    }
    println!();
    println!("* = configured default");
    Ok(())
}
