use clap::Parser;
use tracing::level_filters::LevelFilter;

pub const DEFAULT_DNS_PORT: u16 = 53;

#[derive(Parser)]
#[command(version, name = "fwdns")]
pub struct Args {
    /// Upstream resolver to relay queries to, as `host[:port]`
    #[arg(value_name = "REMOTE_SERVER")]
    pub remote_server: String,
    /// Local port to listen on
    #[arg(short('p'), long, value_name = "PORT", default_value_t = DEFAULT_DNS_PORT)]
    pub port: u16,
    /// Log level
    #[arg(long, value_name = "LEVEL", default_value_t = LevelFilter::INFO)]
    pub log: LevelFilter,
}

/// Splits `host[:port]`, defaulting the port to 53.
pub fn parse_server_info(raw: &str) -> anyhow::Result<(String, u16)> {
    match raw.rsplit_once(':') {
        Some((host, port)) => {
            anyhow::ensure!(!host.is_empty(), "server '{}' is missing a host", raw);
            let port = port
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("server '{}' has a malformed port", raw))?;
            Ok((host.to_owned(), port))
        }
        None => Ok((raw.to_owned(), DEFAULT_DNS_PORT)),
    }
}
