use std::sync::{LockResult, Mutex, MutexGuard};

use tracing::warn;

/// Takes the guard even when a panicking holder poisoned the lock.
fn recover<G>(result: LockResult<G>, owner: &'static str, op: &'static str, kind: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            target = "scholia::cache::lock",
            owner,
            op,
            lock_kind = kind,
            "recovered poisoned cache lock"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    owner: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), owner, op, "mutex.lock")
}
