//! Muster node binary.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    muster_node::run().await
}
