//! Optional `tracing` subscriber setup for applications embedding this store.
use crate::error::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber filtered by `level` (e.g. `"pfxbt=debug"`).
///
/// Intended for binaries and examples that embed this crate and want the
/// pager/tree/cache `trace!`/`debug!` spans on stderr; the library itself
/// never calls this.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| Error::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .try_init()
        .map_err(|_| Error::InvalidArgument("logging already initialized".into()))
}
