pub mod rayon;

use crate::error::Error;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Get a lock for mutex and recover from poisoning
pub fn safe_lock_mutex<T: ?Sized>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Get a read lock and recover from poisoning
pub fn safe_read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Get a write lock and recover from poisoning
pub fn safe_write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recovers_poisoned_mutex() {
        let mutex = Arc::new(Mutex::new(1));

        let poisoner = Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison");
        })
        .join();

        assert!(mutex.is_poisoned());
        *safe_lock_mutex(&mutex) += 1;
        assert_eq!(*safe_lock_mutex(&mutex), 2);
    }

    #[test]
    fn rw_locks() {
        let lock = RwLock::new(vec![1]);

        safe_write_lock(&lock).push(2);
        assert_eq!(*safe_read_lock(&lock), vec![1, 2]);
    }
}
