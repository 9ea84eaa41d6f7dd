//! Plain TCP peer links.
//!
//! A link is a held-open TCP stream. Nothing is exchanged over it; its
//! existence is the membership, and dropping it is leaving.
//!
//! Each link is owned by a watcher task that reads until the remote end
//! closes, then releases the link. A peer that went away can therefore be
//! dialled again, and its descriptor stops counting as known.
//!
//! Node names have the form `label@host:port`, where `host:port` is where the
//! node accepts links.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use muster_codec::PeerDescriptor;
use muster_membership::{PeerConnectError, PeerConnector};
use parking_lot::Mutex;
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
    task::AbortHandle,
};
use tracing::{debug, trace, warn};

/// Default time allowed for a single dial.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Split a `label@host:port` node name into its dial target.
pub fn dial_target(name: &str) -> Result<&str, PeerConnectError> {
    let invalid =
        || PeerConnectError::new(format!("invalid node name {name:?}, expected label@host:port"));

    let (label, target) = name.rsplit_once('@').ok_or_else(invalid)?;
    let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
    if label.is_empty() || host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(target)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LinkKey {
    Outbound(String),
    Inbound(SocketAddr),
}

/// A held link. The stream lives in the watcher task; dropping the link
/// aborts the task and closes the stream.
#[derive(Debug)]
struct Link {
    id: u64,
    watcher: AbortHandle,
}

impl Link {
    fn is_open(&self) -> bool {
        !self.watcher.is_finished()
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[derive(Debug, Default)]
struct Links {
    next_id: u64,
    /// Outbound links by peer name.
    outbound: HashMap<String, Link>,
    /// Inbound links by remote address.
    inbound: HashMap<SocketAddr, Link>,
    /// Descriptors joined successfully, by peer name. Dropped with the link.
    known: HashMap<String, PeerDescriptor>,
}

impl Links {
    /// Remove the link under `key` if it is still the one numbered `id`.
    fn release(&mut self, key: &LinkKey, id: u64) -> bool {
        match key {
            LinkKey::Outbound(name) => {
                if self.outbound.get(name).is_some_and(|link| link.id == id) {
                    self.outbound.remove(name);
                    self.known.remove(name);
                    return true;
                }
            }
            LinkKey::Inbound(remote) => {
                if self.inbound.get(remote).is_some_and(|link| link.id == id) {
                    self.inbound.remove(remote);
                    return true;
                }
            }
        }
        false
    }
}

/// Hold `stream` until the remote end closes it, then release `key`.
async fn watch_link(mut stream: TcpStream, key: LinkKey, id: u64, links: Weak<Mutex<Links>>) {
    let mut buf = [0u8; 256];
    let error = loop {
        match stream.read(&mut buf).await {
            Ok(0) => break None,
            // Peers send nothing; anything received is discarded.
            Ok(_) => {}
            Err(error) => break Some(error),
        }
    };
    drop(stream);

    let Some(links) = links.upgrade() else {
        return;
    };
    if links.lock().release(&key, id) {
        match error {
            Some(error) => debug!(link = ?key, %error, "link failed"),
            None => debug!(link = ?key, "link closed by peer"),
        }
    }
}

/// [`PeerConnector`] holding one TCP stream per peer.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    dial_timeout: Duration,
    links: Arc<Mutex<Links>>,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_TIMEOUT)
    }
}

impl TcpConnector {
    /// Create a connector with the given per-dial timeout.
    pub fn new(dial_timeout: Duration) -> Self {
        Self {
            dial_timeout,
            links: Arc::default(),
        }
    }

    /// Number of outbound links held.
    pub fn outbound_links(&self) -> usize {
        self.links.lock().outbound.len()
    }

    /// Number of inbound links held.
    pub fn inbound_links(&self) -> usize {
        self.links.lock().inbound.len()
    }

    /// Hand `stream` to a watcher task and record it under `key`, replacing
    /// any previous link there. `descriptor` is marked known along with it.
    fn hold(&self, key: LinkKey, stream: TcpStream, descriptor: Option<&PeerDescriptor>) {
        // The watcher is spawned under the lock so its release cannot run
        // before the insert.
        let mut links = self.links.lock();
        links.next_id += 1;
        let id = links.next_id;
        let watcher = tokio::spawn(watch_link(
            stream,
            key.clone(),
            id,
            Arc::downgrade(&self.links),
        ))
        .abort_handle();

        let link = Link { id, watcher };
        match key {
            LinkKey::Outbound(name) => {
                if let Some(descriptor) = descriptor {
                    links.known.insert(name.clone(), descriptor.clone());
                }
                links.outbound.insert(name, link);
            }
            LinkKey::Inbound(remote) => {
                links.inbound.insert(remote, link);
            }
        }
    }

    /// Accept inbound links on `listener` forever.
    ///
    /// Accept errors are logged and do not stop the loop.
    pub async fn accept_inbound(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    debug!(%remote, "inbound link accepted");
                    self.hold(LinkKey::Inbound(remote), stream, None);
                }
                Err(error) => {
                    warn!(%error, "failed to accept inbound link");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn dial(&self, target: &str) -> Result<TcpStream, PeerConnectError> {
        match tokio::time::timeout(self.dial_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(PeerConnectError::with_source(format!("dial {target} failed"), e)),
            Err(_) => Err(PeerConnectError::new(format!(
                "dial {target} timed out after {:?}",
                self.dial_timeout
            ))),
        }
    }
}

#[async_trait]
impl PeerConnector for TcpConnector {
    async fn connect_by_name(&self, name: &str) -> Result<(), PeerConnectError> {
        let target = dial_target(name)?;
        if self.links.lock().outbound.get(name).is_some_and(Link::is_open) {
            trace!(peer = %name, "already linked");
            return Ok(());
        }

        let stream = self.dial(target).await?;
        self.hold(LinkKey::Outbound(name.to_owned()), stream, None);
        Ok(())
    }

    async fn join_by_descriptor(
        &self,
        descriptor: &PeerDescriptor,
    ) -> Result<(), PeerConnectError> {
        let mut last_error = None;
        for addr in &descriptor.listen_addrs {
            match self.dial(&addr.to_string()).await {
                Ok(stream) => {
                    let key = LinkKey::Outbound(descriptor.name.clone());
                    self.hold(key, stream, Some(descriptor));
                    return Ok(());
                }
                Err(e) => {
                    trace!(
                        peer = %descriptor.name,
                        %addr,
                        error = %e,
                        "listen address unreachable"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PeerConnectError::new(format!("{} has no listen addresses", descriptor.name))
        }))
    }

    fn is_known(&self, descriptor: &PeerDescriptor) -> bool {
        let links = self.links.lock();
        links.known.get(&descriptor.name) == Some(descriptor)
            && links.outbound.get(&descriptor.name).is_some_and(Link::is_open)
    }
}
