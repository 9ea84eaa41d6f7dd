//! Command implementations.
//!
//! Both commands resolve configuration the same way: defaults, environment,
//! config file, then CLI overrides.

pub mod config;
pub mod run;

use eyre::Result;

use crate::{cli::RunArgs, config::NodeConfig};

/// Resolve the effective configuration for `args`.
pub(crate) fn resolve_config(args: &RunArgs) -> Result<NodeConfig> {
    let config = NodeConfig::load(args.config.as_deref())?.apply_args(args);
    config.rendezvous.connect_timeout()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_zero_connect_timeout_fails_resolution() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("muster.toml");
        fs::write(&path, "[rendezvous]\nconnect_timeout_ms = 0\n").unwrap();

        let args = RunArgs {
            config: Some(path),
            ..RunArgs::default()
        };
        let error = resolve_config(&args).unwrap_err();
        assert!(error.to_string().contains("connect_timeout_ms"), "{error}");
    }
}
