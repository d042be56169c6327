use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context as _;
use fwdns_lib::DnsPacket;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::client::DnsClient;
use crate::server::{DnsServer, IncomingQuery, ReplyHandle, ShutdownHandle};

pub struct ForwarderSettings {
    pub local_host: IpAddr,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

/// Glue between the server and the client: every surfaced query is resolved
/// upstream and the outcome is written back through its reply capability.
pub struct Forwarder {
    local_addr: SocketAddr,
    server_shutdown: ShutdownHandle,
    relay: JoinHandle<()>,
}

impl Forwarder {
    pub async fn start(settings: ForwarderSettings) -> anyhow::Result<Self> {
        let upstream = tokio::net::lookup_host((settings.remote_host.as_str(), settings.remote_port))
            .await
            .with_context(|| format!("failed to look up '{}'", settings.remote_host))?
            .next()
            .with_context(|| format!("'{}' resolved to no addresses", settings.remote_host))?;

        let client = Arc::new(
            DnsClient::new(upstream)
                .await
                .context("failed to instantiate the upstream client")?,
        );
        let server = DnsServer::bind(settings.local_host, settings.local_port)
            .await
            .context("failed to instantiate the DNS server")?;
        let local_addr = server.local_addr()?;

        tracing::info!(local = %local_addr, %upstream, "forwarding DNS queries");

        let (queries, server_shutdown) = server.listen();
        let relay = tokio::spawn(relay_queries(queries, client));

        Ok(Forwarder {
            local_addr,
            server_shutdown,
            relay,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs until the listener stops on its own.
    pub async fn block_until_completion(self) -> anyhow::Result<()> {
        self.relay.await.context("relay task failed to execute")
    }

    pub async fn shutdown(self) {
        self.server_shutdown.shutdown().await;
        // The query channel is now closed, so the relay drains and exits
        let _ = self.relay.await;
    }
}

async fn relay_queries(mut queries: mpsc::Receiver<IncomingQuery>, client: Arc<DnsClient>) {
    let mut handlers: JoinSet<()> = JoinSet::new();
    loop {
        tokio::select! {
            incoming = queries.recv() => {
                let Some(IncomingQuery { query, reply }) = incoming else {
                    break;
                };
                // Each caller supplies its own deadline; the forwarder
                // imposes none
                handlers.spawn(forward_query(client.clone(), query, reply, CancellationToken::new()));
            }
            Some(result) = handlers.join_next() => {
                if let Err(e) = result {
                    tracing::debug!("query handler failed to execute: {e}");
                }
            }
        }
    }
    while let Some(result) = handlers.join_next().await {
        if let Err(e) = result {
            tracing::debug!("query handler failed to execute: {e}");
        }
    }
}

/// One inbound query: exactly one upstream resolve (coalesced by ID inside
/// the client) and exactly one reply datagram on success.
async fn forward_query(
    client: Arc<DnsClient>,
    query: DnsPacket<'static>,
    reply: ReplyHandle,
    cancellation: CancellationToken,
) {
    let id = query.header.id;
    tracing::debug!(
        id,
        qname = ?query.questions.first().map(|question| question.qname.as_ref()),
        peer = %reply.peer(),
        "relaying query upstream"
    );

    match client.resolve(&query, cancellation).await {
        Ok(response) => {
            tracing::debug!(
                id,
                rcode = ?response.header.flags.response_code,
                answers = response.answers.len(),
                "relaying response back"
            );
            if let Err(e) = reply.reply(&response).await {
                tracing::warn!(id, "failed to send the response back: {e:#}");
            }
        }
        Err(e) => tracing::warn!(id, "failed to resolve the query: {e}"),
    }
}
