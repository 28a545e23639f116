use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(
    poisoned: PoisonError<G>,
    source: &'static str,
    op: &'static str,
    lock_kind: &'static str,
) -> G {
    warn!(
        category = "cache",
        op,
        source_module = source,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered query cache lock after a panic"
    );
    poisoned.into_inner()
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "rwlock.read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "rwlock.write"))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "mutex.lock"))
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_locks_are_recovered() {
        let rw = RwLock::new(1);
        let mutex = Mutex::new(1);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _read = rw.write().unwrap();
            let _guard = mutex.lock().unwrap();
            panic!("poison both");
        }));

        assert!(rw.is_poisoned());
        *rw_write(&rw, "test", "write") += 1;
        assert_eq!(*rw_read(&rw, "test", "read"), 2);
        *mutex_lock(&mutex, "test", "lock") += 1;
        assert_eq!(*mutex_lock(&mutex, "test", "lock"), 2);
    }
}
