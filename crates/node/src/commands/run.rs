//! Run command - start a node.
//!
//! Wires the PostgreSQL rendezvous backend, the TCP peer connector and the
//! static local identity into a [`Membership`] instance and runs it until
//! ctrl-c. A membership error ends the command with an error so a supervisor
//! can restart the process.

use std::net::SocketAddr;

use eyre::{Result, WrapErr};
use metrics_exporter_prometheus::PrometheusBuilder;
use muster_membership::{Membership, StaticIdentity};
use muster_rendezvous::PgRendezvous;
use tokio::{net::TcpListener, task::JoinSet};
use tracing::{error, info};

use crate::{cli::RunArgs, tcp::TcpConnector};

/// Run the node command.
pub async fn run(args: &RunArgs) -> Result<()> {
    let config = super::resolve_config(args)?;

    let descriptor = config.descriptor()?;
    let membership_config = config
        .membership_options()
        .build()
        .wrap_err("invalid membership configuration")?;
    let rendezvous = PgRendezvous::new(membership_config.endpoint())
        .wrap_err("invalid rendezvous endpoint")?
        .with_connect_timeout(config.rendezvous.connect_timeout()?);

    if let Some(addr) = config.metrics.addr {
        install_metrics(addr)?;
    }

    let connector = TcpConnector::default();
    let mut acceptors = JoinSet::new();
    for addr in &descriptor.listen_addrs {
        let listener = TcpListener::bind(addr)
            .await
            .wrap_err_with(|| format!("failed to listen on {addr}"))?;
        info!(%addr, "accepting peer links");
        acceptors.spawn(connector.clone().accept_inbound(listener));
    }

    info!(node = %descriptor, "starting membership");
    let membership = Membership::new(
        membership_config,
        rendezvous,
        StaticIdentity::new(descriptor),
        connector,
    );
    let result = membership.run(shutdown_signal()).await;

    acceptors.shutdown().await;
    result.wrap_err("membership stopped")
}

fn install_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .wrap_err_with(|| format!("failed to start metrics exporter on {addr}"))?;
    info!(%addr, "serving metrics");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received ctrl-c"),
        Err(e) => {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
