use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise `OHUB_LOG_LEVEL`, then `info`.
pub fn init() -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = std::env::var("OHUB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(&level)
                .with_context(|| format!("invalid log level/filter '{level}'"))?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("installing tracing subscriber: {err}"))
}
