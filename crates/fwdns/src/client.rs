use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context as _;
use fwdns_lib::{ByteBuf, DnsPacket, EncodeToBuf as _, FromBuf as _};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::MAX_STANDARD_DNS_MSG_SIZE;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The packet to resolve has QR=Response
    #[error("packet is not a query")]
    NotAQuery,
    /// The caller's cancellation fired; kept distinct from `Transport` so
    /// "gave up" can be told from "network failed"
    #[error("resolution was cancelled")]
    Cancelled,
    #[error("failed to send the query upstream: {0}")]
    Transport(#[source] std::io::Error),
    #[error("failed to encode the query: {0}")]
    Encode(anyhow::Error),
}

/// What a pending entry's completion slot eventually holds.
#[derive(Clone)]
enum Completion {
    Response(DnsPacket<'static>),
    /// The creating caller's upstream send never went out, so co-waiters
    /// must not keep waiting for a response to it
    SendFailed,
}

/// One entry per in-flight transaction ID. `users` counts the resolve()
/// callers attached to it; the slot is fulfilled at most once.
struct PendingRequest {
    users: usize,
    slot: watch::Sender<Option<Completion>>,
}

impl PendingRequest {
    /// First completion wins; later ones are dropped while pending.
    fn complete(&self, completion: Completion) {
        self.slot.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(completion);
                true
            } else {
                false
            }
        });
    }
}

type PendingMap = HashMap<u16, PendingRequest>;

/// Detaches from a pending entry when dropped, so a caller abandoned
/// mid-await (a timed-out future, for instance) still releases its
/// reference. The last caller out removes the entry, making the ID
/// reusable.
struct PendingGuard {
    pendings: Arc<Mutex<PendingMap>>,
    id: u16,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pendings = self.pendings.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = pendings.get_mut(&self.id) {
            pending.users -= 1;
            if pending.users == 0 {
                pendings.remove(&self.id);
            }
        }
    }
}

/// A request-multiplexing DNS client: concurrent outstanding queries to one
/// upstream resolver over a single UDP socket, correlated by transaction ID.
pub struct DnsClient {
    upstream: SocketAddr,
    socket: Arc<UdpSocket>,
    pendings: Arc<Mutex<PendingMap>>,
    reader: JoinHandle<()>,
}

impl DnsClient {
    pub async fn new(upstream: SocketAddr) -> anyhow::Result<Self> {
        let socket = Arc::new(
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
                .await
                .context("error while creating a UDP socket")?,
        );
        let pendings: Arc<Mutex<PendingMap>> = Default::default();

        let reader = tokio::spawn(read_responses(socket.clone(), pendings.clone()));

        Ok(DnsClient {
            upstream,
            socket,
            pendings,
            reader,
        })
    }

    /// Relays `query` to the upstream resolver and waits for the response
    /// with a matching transaction ID.
    ///
    /// Callers sharing a transaction ID coalesce onto one pending entry and
    /// one upstream datagram; all of them observe the same response.
    /// The caller's token is the only deadline: an unresponsive upstream
    /// keeps the entry alive for as long as anyone waits on it.
    pub async fn resolve(
        &self,
        query: &DnsPacket<'_>,
        cancellation: CancellationToken,
    ) -> Result<DnsPacket<'static>, ResolveError> {
        if cancellation.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        if query.header.flags.is_response {
            return Err(ResolveError::NotAQuery);
        }

        let id = query.header.id;
        // The guard detaches on every exit path, including this future
        // being dropped mid-await
        let (mut response_rx, send_needed, _guard) = self.attach(id);

        if send_needed {
            let mut buf = ByteBuf::new_empty(Some(MAX_STANDARD_DNS_MSG_SIZE));
            if let Err(e) = query.encode_to_buf(&mut buf) {
                self.fail_pending(id);
                return Err(ResolveError::Encode(e));
            }
            if let Err(e) = self.socket.send_to(buf.as_ref(), self.upstream).await {
                // Wake co-waiters attached to this entry: no datagram went
                // out, so no response will ever arrive for it
                self.fail_pending(id);
                return Err(ResolveError::Transport(e));
            }
        }

        tokio::select! {
            _ = cancellation.cancelled() => Err(ResolveError::Cancelled),
            result = response_rx.wait_for(|slot| slot.is_some()) => {
                let completion = result.map_err(|_| ResolveError::Cancelled)?.clone();
                match completion {
                    Some(Completion::Response(response)) => Ok(response),
                    _ => Err(ResolveError::Transport(std::io::Error::other(
                        "the upstream send failed",
                    ))),
                }
            }
        }
    }

    /// Attaches to the pending entry for `id`, creating it if this is the
    /// first caller. Returns whether the caller must perform the send, and
    /// the guard that detaches once the caller is done with the entry.
    fn attach(&self, id: u16) -> (watch::Receiver<Option<Completion>>, bool, PendingGuard) {
        let mut pendings = self.lock_pendings();
        let created = !pendings.contains_key(&id);
        let pending = pendings.entry(id).or_insert_with(|| {
            let (slot, _) = watch::channel(None);
            PendingRequest { users: 0, slot }
        });
        pending.users += 1;
        let guard = PendingGuard {
            pendings: self.pendings.clone(),
            id,
        };
        (pending.slot.subscribe(), created, guard)
    }

    fn fail_pending(&self, id: u16) {
        let pendings = self.lock_pendings();
        if let Some(pending) = pendings.get(&id) {
            pending.complete(Completion::SendFailed);
        }
    }

    fn lock_pendings(&self) -> MutexGuard<'_, PendingMap> {
        // The map is only ever locked for short, non-panicking sections
        self.pendings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DnsClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Owns the receive half of the client socket: every datagram that decodes
/// with QR=Response fulfills the matching pending slot. First arrival wins;
/// duplicates and unknown IDs are dropped.
async fn read_responses(socket: Arc<UdpSocket>, pendings: Arc<Mutex<PendingMap>>) {
    let mut recv = vec![0; MAX_STANDARD_DNS_MSG_SIZE];
    loop {
        let len = match socket.recv_from(&mut recv).await {
            Ok((len, _)) => len,
            Err(e) => {
                tracing::debug!("error while reading from the upstream socket: {e}");
                continue;
            }
        };

        let datagram = &recv[..len];
        let mut reader = ByteBuf::new(&datagram);
        let packet = match DnsPacket::from_buf(&mut reader) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("dropping a malformed upstream datagram: {e:#}");
                continue;
            }
        };

        if !packet.header.flags.is_response {
            continue;
        }

        let pendings = pendings.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = pendings.get(&packet.header.id) {
            pending.complete(Completion::Response(packet));
        }
    }
}
