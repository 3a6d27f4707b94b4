//! The shared table of keys currently believed to be held down.
//!
//! A [`PressedKeys`] handle is created once and cloned into every party that needs it:
//! the hook path inserts a record on key-down and removes it on key-up, while the
//! watchdog only takes snapshots of the keys and evicts the ones it can prove stale.
//!
//! Every operation locks the table for a single map access, so the hook path and the
//! watchdog can interleave freely. Nothing here assumes a snapshot is still accurate by
//! the time it is acted upon: evicting a key that is already gone is a no-op.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::event::KeyEvent;

/// A hardware scan code identifying a physical key position.
///
/// Extended keys (right Ctrl, right Alt, the arrow cluster, ...) carry an `0xE0` prefix
/// in the high byte, e.g. `0xE01D` for right Ctrl. This is the form
/// `MapVirtualKeyW(.., MAPVK_VSC_TO_VK_EX)` understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanCode(pub u32);

impl ScanCode {
    const EXTENDED_PREFIX: u32 = 0xE000;

    /// Builds a scan code from the raw value reported by the OS and its extended-key flag.
    pub const fn new(raw: u32, extended: bool) -> Self {
        if extended {
            Self(raw | Self::EXTENDED_PREFIX)
        } else {
            Self(raw)
        }
    }
}

impl From<u32> for ScanCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for ScanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Shared, cloneable map from [`ScanCode`] to a pending-press record.
///
/// The record type `R` is opaque to this crate. The watchdog never reads or changes a
/// record, it only removes whole entries.
pub struct PressedKeys<R> {
    inner: Arc<Mutex<HashMap<ScanCode, R>>>,
}

impl<R> PressedKeys<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Records that the key is down, replacing any previous record for it.
    pub fn press(&self, scan_code: ScanCode, record: R) -> Option<R> {
        self.lock().insert(scan_code, record)
    }

    /// Removes the record for a key that was released.
    pub fn release(&self, scan_code: ScanCode) -> Option<R> {
        self.lock().remove(&scan_code)
    }

    /// Takes a point-in-time copy of the keys currently believed to be down.
    ///
    /// The returned list is detached from the table and may be outdated as soon as it
    /// is returned.
    pub fn scan_codes(&self) -> Vec<ScanCode> {
        self.lock().keys().copied().collect()
    }

    /// Removes a stale record.
    ///
    /// Returns `false` if the key was already gone, which happens when the hook path
    /// released it after the snapshot was taken.
    pub fn evict(&self, scan_code: ScanCode) -> bool {
        self.lock().remove(&scan_code).is_some()
    }

    pub fn contains(&self, scan_code: ScanCode) -> bool {
        self.lock().contains_key(&scan_code)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Each mutation is a single map call, so a panic on another thread can never leave
    // the map half-updated and the poison flag carries no information.
    fn lock(&self) -> MutexGuard<'_, HashMap<ScanCode, R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: Clone> PressedKeys<R> {
    /// Returns a copy of the record stored for the key, if any.
    pub fn get(&self, scan_code: ScanCode) -> Option<R> {
        self.lock().get(&scan_code).cloned()
    }
}

impl<E: KeyEvent> PressedKeys<E> {
    /// Applies a keyboard event the way a hook path does: a key-down stores the event as
    /// the key's record and a key-up removes it.
    pub fn record(&self, event: E) {
        let scan_code = event.scan_code();
        if event.is_key_down() {
            self.press(scan_code, event);
        } else {
            self.release(scan_code);
        }
    }
}

impl<R> Clone for PressedKeys<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Default for PressedKeys<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for PressedKeys<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scan_codes = self.scan_codes();
        scan_codes.sort_unstable();
        f.debug_struct("PressedKeys")
            .field("scan_codes", &scan_codes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyState;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Event(u32, KeyState);

    impl KeyEvent for Event {
        fn scan_code(&self) -> ScanCode {
            ScanCode(self.0)
        }

        fn key_state(&self) -> KeyState {
            self.1
        }
    }

    #[test]
    fn press_and_release() {
        let keys = PressedKeys::new();
        assert!(keys.press(ScanCode(30), "a").is_none());
        assert_eq!(keys.press(ScanCode(30), "a again"), Some("a"));
        assert!(keys.contains(ScanCode(30)));
        assert_eq!(keys.release(ScanCode(30)), Some("a again"));
        assert!(keys.is_empty());
    }

    #[test]
    fn evict_missing_key_is_noop() {
        let keys = PressedKeys::new();
        keys.press(ScanCode(30), ());
        keys.press(ScanCode(31), ());

        assert!(keys.evict(ScanCode(30)));
        assert!(!keys.evict(ScanCode(30)));
        assert!(!keys.evict(ScanCode(99)));

        assert_eq!(keys.scan_codes(), vec![ScanCode(31)]);
    }

    #[test]
    fn snapshot_is_detached() {
        let keys = PressedKeys::new();
        keys.press(ScanCode(1), ());
        let snapshot = keys.scan_codes();
        keys.release(ScanCode(1));
        keys.press(ScanCode(2), ());

        assert_eq!(snapshot, vec![ScanCode(1)]);
        assert_eq!(keys.scan_codes(), vec![ScanCode(2)]);
    }

    #[test]
    fn clones_share_state() {
        let hook_side = PressedKeys::new();
        let watchdog_side = hook_side.clone();
        hook_side.press(ScanCode(42), 7u8);
        assert_eq!(watchdog_side.get(ScanCode(42)), Some(7));
        watchdog_side.evict(ScanCode(42));
        assert!(hook_side.is_empty());
    }

    #[test]
    fn record_follows_key_state() {
        let keys = PressedKeys::new();
        keys.record(Event(42, KeyState::Down));
        keys.record(Event(43, KeyState::Down));
        keys.record(Event(42, KeyState::Up));
        // a release with no matching press is ignored
        keys.record(Event(44, KeyState::Up));

        assert_eq!(keys.scan_codes(), vec![ScanCode(43)]);
        assert_eq!(keys.get(ScanCode(43)), Some(Event(43, KeyState::Down)));
    }

    #[test]
    fn lock_recovers_from_poison() {
        let keys = PressedKeys::new();
        keys.press(ScanCode(1), ());

        let poisoner = keys.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison the table");
        })
        .join();

        assert!(keys.inner.is_poisoned());
        assert!(keys.evict(ScanCode(1)));
        assert!(keys.is_empty());
    }

    #[test]
    fn extended_scan_codes() {
        let right_ctrl = ScanCode::new(0x1D, true);
        assert_eq!(right_ctrl, ScanCode(0xE01D));
        assert_eq!(ScanCode::new(0x1D, false), ScanCode(0x1D));
        assert_eq!(right_ctrl.to_string(), "0xe01d");
    }
}
