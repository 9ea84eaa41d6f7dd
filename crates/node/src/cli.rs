//! Command-line arguments.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

/// Muster - cluster membership discovery over PostgreSQL LISTEN/NOTIFY
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging configuration.
    #[command(flatten)]
    pub logs: LogArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Node commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a node until interrupted.
    Run(RunArgs),
    /// Print the effective configuration as TOML and exit.
    Config(RunArgs),
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Log filter directive (e.g., "muster_membership=debug").
    #[arg(long = "log.filter", value_name = "DIRECTIVE", global = true)]
    pub filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json", global = true)]
    pub json: bool,
}

/// Arguments shared by `run` and `config`.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Local node identity.
    #[command(flatten)]
    pub node: NodeArgs,

    /// Membership protocol.
    #[command(flatten)]
    pub membership: MembershipArgs,

    /// Rendezvous backend.
    #[command(flatten)]
    pub rendezvous: RendezvousArgs,

    /// Metrics exporter.
    #[command(flatten)]
    pub metrics: MetricsArgs,
}

/// Local node identity.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Node")]
pub struct NodeArgs {
    /// Node name announced on the primary channel, as `label@host:port`.
    #[arg(long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Address to accept peer links on. May be repeated.
    #[arg(long = "listen", value_name = "ADDR")]
    pub listen_addrs: Vec<SocketAddr>,
}

/// Membership protocol.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Membership")]
pub struct MembershipArgs {
    /// Rendezvous endpoint (libpq URL or key/value string).
    #[arg(long = "endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Interval between heartbeats in milliseconds.
    #[arg(long = "heartbeat.interval", value_name = "MS")]
    pub heartbeat_interval_ms: Option<u64>,

    /// Give up on a single announcement publish after this many milliseconds.
    #[arg(
        long = "heartbeat.publish-timeout",
        value_name = "MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub publish_timeout_ms: Option<u64>,

    /// Channel for plain node-name announcements.
    #[arg(long = "channel.primary", value_name = "CHANNEL")]
    pub primary_channel: Option<String>,

    /// Channel for encoded peer-descriptor announcements.
    #[arg(long = "channel.secondary", value_name = "CHANNEL")]
    pub secondary_channel: Option<String>,
}

/// Rendezvous backend.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Rendezvous")]
pub struct RendezvousArgs {
    /// Timeout for opening each backend connection, in milliseconds.
    #[arg(
        long = "rendezvous.connect-timeout",
        value_name = "MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub connect_timeout_ms: Option<u64>,
}

/// Metrics exporter.
#[derive(Debug, Clone, Default, Args)]
#[command(next_help_heading = "Metrics")]
pub struct MetricsArgs {
    /// Serve Prometheus metrics on this address.
    #[arg(long = "metrics.addr", value_name = "ADDR")]
    pub addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "muster",
            "-vv",
            "run",
            "--endpoint",
            "postgres://localhost/muster",
            "--name",
            "alpha@127.0.0.1:7946",
            "--listen",
            "127.0.0.1:7946",
            "--listen",
            "[::1]:7946",
            "--heartbeat.interval",
            "250",
            "--heartbeat.publish-timeout",
            "1000",
            "--channel.secondary",
            "peers",
        ])
        .unwrap();

        assert_eq!(cli.logs.verbosity, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.node.name.as_deref(), Some("alpha@127.0.0.1:7946"));
        assert_eq!(args.node.listen_addrs.len(), 2);
        assert_eq!(args.membership.heartbeat_interval_ms, Some(250));
        assert_eq!(args.membership.publish_timeout_ms, Some(1000));
        assert_eq!(args.membership.primary_channel, None);
        assert_eq!(args.membership.secondary_channel.as_deref(), Some("peers"));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        for flag in ["--rendezvous.connect-timeout", "--heartbeat.publish-timeout"] {
            assert!(Cli::try_parse_from(["muster", "run", flag, "0"]).is_err(), "{flag}");
            assert!(Cli::try_parse_from(["muster", "run", flag, "1"]).is_ok(), "{flag}");
        }
    }

    #[test]
    fn test_rejects_bad_listen_addr() {
        assert!(Cli::try_parse_from(["muster", "run", "--listen", "localhost"]).is_err());
    }
}
