//! Process-wide verbosity level.
//!
//! The level gates extra diagnostics that are too expensive or too noisy to emit
//! at every `log::debug!` call site (per-replica dataset dumps in the ensemble
//! driver, for instance). It does not replace the `log` filter.

use std::sync::atomic::{AtomicI32, Ordering};

/// Environment variable read the first time the level is queried.
pub const VERBOSITY_ENV: &str = "SWARMLIMITS_VERBOSITY";

const UNSET: i32 = i32::MIN;

static VERBOSITY: AtomicI32 = AtomicI32::new(UNSET);

fn from_env() -> i32 {
    std::env::var(VERBOSITY_ENV).ok().and_then(|v| v.trim().parse::<i32>().ok()).unwrap_or(0)
}

/// Current verbosity level.
///
/// Resolution order:
/// 1. **Programmatic**: the last value passed to [`set_verbosity`].
/// 2. **Env var**: `SWARMLIMITS_VERBOSITY` (integer), read once.
/// 3. **Default**: `0`.
pub fn verbosity() -> i32 {
    let v = VERBOSITY.load(Ordering::Relaxed);
    if v != UNSET {
        return v;
    }
    let env = from_env();
    // Another thread may have set a level meanwhile; keep theirs.
    match VERBOSITY.compare_exchange(UNSET, env, Ordering::Relaxed, Ordering::Relaxed) {
        Ok(_) => env,
        Err(current) => current,
    }
}

/// Override the verbosity level for the whole process.
pub fn set_verbosity(level: i32) {
    VERBOSITY.store(level.max(UNSET + 1), Ordering::Relaxed);
}
