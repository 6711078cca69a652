// Logging setup for the binary
// Events go to stderr so exported documents on stdout stay clean.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
/// `RUST_LOG` wins over `level` when it is set and valid
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging already initialised: {}", e))?;

    tracing::debug!(level, "logging initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_once() {
        // Only the first install in a process succeeds
        let first = init_tracing("debug");
        let second = init_tracing("debug");
        assert!(first.is_ok());
        assert!(second.is_err());
    }
}
