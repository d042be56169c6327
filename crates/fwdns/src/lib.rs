mod logging;
pub use logging::setup_logging;
mod cli;
pub use cli::{parse_server_info, Args};
mod client;
pub use client::{DnsClient, ResolveError};
mod server;
pub use server::{DnsServer, IncomingQuery, ReplyHandle, ShutdownHandle};
mod forwarder;
pub use forwarder::{Forwarder, ForwarderSettings};

/// RFC1035 caps a DNS message carried over UDP at 512 bytes
pub const MAX_STANDARD_DNS_MSG_SIZE: usize = 512;
