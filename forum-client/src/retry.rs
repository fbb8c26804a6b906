use std::future::Future;

use crate::{api::Error, ClientConfig};

/// How many times each kind of transient error may be swallowed before surfacing
#[derive(Clone, Copy, Debug)]
pub(crate) struct Budget {
    unavailable: usize,
    conflict: usize,
}

impl Budget {
    /// For single store round-trips
    pub(crate) fn unavailable(cfg: &ClientConfig) -> Budget {
        Budget {
            unavailable: cfg.unavailable_retries,
            conflict: 0,
        }
    }

    /// For whole read-decide-write sequences, whose steps handle unavailability themselves
    pub(crate) fn conflicts(cfg: &ClientConfig) -> Budget {
        Budget {
            unavailable: 0,
            conflict: cfg.conflict_retries,
        }
    }
}

/// Re-runs `op` from scratch while it fails with a transient error and budget remains
pub(crate) async fn retrying<T, F, Fut>(
    what: &str,
    mut budget: Budget,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    loop {
        match op().await {
            Err(Error::StoreUnavailable(msg)) if budget.unavailable > 0 => {
                budget.unavailable -= 1;
                tracing::warn!(%msg, "{what}: store unavailable, retrying");
            }
            Err(Error::ConflictingWrite) if budget.conflict > 0 => {
                budget.conflict -= 1;
                tracing::warn!("{what}: lost a race, retrying from a fresh read");
            }
            res => return res,
        }
    }
}
