use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const LOGGING_ENV: &str = "FWDNS_LOG";

/// Terminal logging only; the default directive comes from `--log` and can
/// be overridden per target via `FWDNS_LOG`.
pub fn setup_logging(level: LevelFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            layer().with_filter(
                EnvFilter::builder()
                    .with_env_var(LOGGING_ENV)
                    .with_default_directive(level.into())
                    .from_env_lossy(),
            ),
        )
        .try_init()
        .context("failed to initialize tracing_subscriber")
}
