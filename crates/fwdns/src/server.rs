use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context as _;
use fwdns_lib::{ByteBuf, DnsPacket, EncodeToBuf as _, FromBuf as _};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::MAX_STANDARD_DNS_MSG_SIZE;

/// How many decoded queries may sit between the socket and the orchestrator
const QUERY_CHANNEL_CAPACITY: usize = 64;

/// A decoded inbound query paired with the capability to answer it.
pub struct IncomingQuery {
    pub query: DnsPacket<'static>,
    pub reply: ReplyHandle,
}

/// Sends one response datagram back to the address the query came from.
pub struct ReplyHandle {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl ReplyHandle {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn reply(&self, response: &DnsPacket<'_>) -> anyhow::Result<()> {
        let mut buf = ByteBuf::new_empty(Some(MAX_STANDARD_DNS_MSG_SIZE));
        response
            .encode_to_buf(&mut buf)
            .context("error while encoding the response")?;
        self.socket
            .send_to(buf.as_ref(), self.peer)
            .await
            .with_context(|| format!("error while sending the response to {}", self.peer))?;
        Ok(())
    }
}

/// Stops the listening task and closes the socket.
pub struct ShutdownHandle {
    cancellation: CancellationToken,
    task: JoinHandle<()>,
}

impl ShutdownHandle {
    pub async fn shutdown(self) {
        self.cancellation.cancel();
        let _ = self.task.await;
    }
}

/// Listens for DNS queries on one UDP socket. Datagrams that don't decode,
/// or that carry QR=Response, are dropped without affecting anything else
/// in flight.
pub struct DnsServer {
    socket: Arc<UdpSocket>,
}

impl DnsServer {
    pub async fn bind(host: IpAddr, port: u16) -> anyhow::Result<Self> {
        let socket = Arc::new(
            UdpSocket::bind((host, port))
                .await
                .with_context(|| format!("error while binding a UDP socket to {}:{}", host, port))?,
        );
        Ok(DnsServer { socket })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr().context("local address is unavailable")
    }

    /// Starts accepting queries. Consume the receiver to handle them; drop
    /// it (or use the shutdown handle) to stop.
    pub fn listen(self) -> (mpsc::Receiver<IncomingQuery>, ShutdownHandle) {
        let (queries_tx, queries_rx) = mpsc::channel(QUERY_CHANNEL_CAPACITY);
        let cancellation = CancellationToken::new();
        let task = tokio::spawn(accept_queries(self.socket, queries_tx, cancellation.clone()));
        (queries_rx, ShutdownHandle { cancellation, task })
    }
}

async fn accept_queries(
    socket: Arc<UdpSocket>,
    queries_tx: mpsc::Sender<IncomingQuery>,
    cancellation: CancellationToken,
) {
    let mut recv = vec![0; MAX_STANDARD_DNS_MSG_SIZE];
    loop {
        let (len, from) = tokio::select! {
            _ = cancellation.cancelled() => break,
            result = socket.recv_from(&mut recv) => match result {
                Ok(received) => received,
                Err(e) => {
                    tracing::debug!("error while reading from the socket: {e}");
                    continue;
                }
            },
        };

        let datagram = &recv[..len];
        let mut reader = ByteBuf::new(&datagram);
        let query = match DnsPacket::from_buf(&mut reader) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(%from, "dropping a malformed datagram: {e:#}");
                continue;
            }
        };
        if query.header.flags.is_response {
            tracing::trace!(%from, "dropping a datagram with QR=Response");
            continue;
        }

        let incoming = IncomingQuery {
            query,
            reply: ReplyHandle {
                socket: socket.clone(),
                peer: from,
            },
        };
        if queries_tx.send(incoming).await.is_err() {
            // Receiver is gone: nobody is handling queries anymore
            break;
        }
    }
}
