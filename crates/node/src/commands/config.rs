//! Config command - print the effective configuration.

use eyre::Result;

use crate::cli::RunArgs;

/// Run the config command.
pub fn run(args: &RunArgs) -> Result<()> {
    let config = super::resolve_config(args)?;
    let mut effective = config.clone();
    effective.membership = config.membership_options();
    effective.transport = Default::default();

    print!("{}", effective.to_toml()?);
    Ok(())
}
