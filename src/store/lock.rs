//! Scoped exclusive access to a [`Preferences`] store

use std::ops::{Deref, DerefMut};
use tracing::{debug, error};

use super::{Preferences, StoreResult};

/// Holds the store lock until [`unlock`](Self::unlock) is called or the guard drops.
///
/// Prefer the explicit `unlock`: a failed unlock leaves the store locked for
/// every other client, and only the explicit call can report it.
pub struct PreferencesLock<'a, P: Preferences + ?Sized> {
    preferences: &'a mut P,
    held: bool,
}

impl<'a, P: Preferences + ?Sized> PreferencesLock<'a, P> {
    /// Lock the store
    pub fn acquire(preferences: &'a mut P, wait: bool) -> StoreResult<Self> {
        preferences.lock(wait)?;
        debug!("Acquired preferences lock");
        Ok(Self {
            preferences,
            held: true,
        })
    }

    /// Release the lock and report whether the store accepted the unlock
    pub fn unlock(mut self) -> StoreResult<()> {
        self.held = false;
        let result = self.preferences.unlock();
        if result.is_ok() {
            debug!("Released preferences lock");
        }
        result
    }
}

impl<P: Preferences + ?Sized> Deref for PreferencesLock<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.preferences
    }
}

impl<P: Preferences + ?Sized> DerefMut for PreferencesLock<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        self.preferences
    }
}

impl<P: Preferences + ?Sized> Drop for PreferencesLock<'_, P> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.preferences.unlock() {
                error!("Failed to release preferences lock: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockPreferences, StoreError, StoreStatus};

    #[test]
    fn test_unlock_reports_result() {
        let mut prefs = MockPreferences::new();
        prefs.expect_lock().times(1).returning(|_| Ok(()));
        prefs
            .expect_unlock()
            .times(1)
            .returning(|| Err(StoreError::new(StoreStatus::NeedLock)));

        let guard = PreferencesLock::acquire(&mut prefs, true).unwrap();
        let err = guard.unlock().unwrap_err();
        assert_eq!(err.status, StoreStatus::NeedLock);
    }

    #[test]
    fn test_drop_unlocks_once() {
        let mut prefs = MockPreferences::new();
        prefs.expect_lock().times(1).returning(|_| Ok(()));
        prefs.expect_unlock().times(1).returning(|| Ok(()));

        {
            let _guard = PreferencesLock::acquire(&mut prefs, false).unwrap();
        }
    }

    #[test]
    fn test_failed_lock_never_unlocks() {
        let mut prefs = MockPreferences::new();
        prefs
            .expect_lock()
            .times(1)
            .returning(|_| Err(StoreError::new(StoreStatus::Locked)));
        prefs.expect_unlock().never();

        let err = PreferencesLock::acquire(&mut prefs, false).err().unwrap();
        assert_eq!(err.status, StoreStatus::Locked);
    }
}
