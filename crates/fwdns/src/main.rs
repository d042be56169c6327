use std::net::Ipv4Addr;

use anyhow::Context as _;
use clap::Parser as _;
use fwdns::{parse_server_info, setup_logging, Args, Forwarder, ForwarderSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(args.log)?;

    let (remote_host, remote_port) = parse_server_info(&args.remote_server)?;

    let forwarder = Forwarder::start(ForwarderSettings {
        local_host: Ipv4Addr::UNSPECIFIED.into(),
        local_port: args.port,
        remote_host,
        remote_port,
    })
    .await
    .context("failed to start the DNS forwarder")?;

    forwarder.block_until_completion().await
}
