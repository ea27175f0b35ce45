use std::sync::{Mutex, MutexGuard};

use metrics::counter;
use tracing::warn;

const METRIC_LOCK_POISON_RECOVERED: &str = "leadcast_lock_poison_recovered_total";

/// Lock `lock`, recovering the guard if a previous holder panicked.
///
/// Every cache mutation finishes before its guard drops, so a poisoned lock still holds
/// whole entries.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = target,
            result = "poisoned_recovered",
            "Recovered from poisoned cache lock"
        );
        counter!(METRIC_LOCK_POISON_RECOVERED, "target" => target).increment(1);
        poisoned.into_inner()
    })
}
