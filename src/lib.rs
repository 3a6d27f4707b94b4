//! Keeps a table of pressed keys honest on Windows.
//!
//! A low-level keyboard hook can miss the release of a key when a system shortcut
//! (`Win+L`, for one) swallows it, leaving the key recorded as held forever. This crate
//! pairs the table of pressed keys with a watchdog that periodically checks every
//! recorded key against the live hardware state and evicts the ones that are no longer
//! held.
//!
//! [`start`] wires up a keyboard hook and the watchdog in one call. If you already track
//! key presses yourself, share a [`PressedKeys`] table with
//! [`watchdog::start_watchdog`] instead.

pub mod error;
pub mod event;
#[cfg(windows)]
pub mod keyboard_hook;
pub mod oracle;
pub mod pressed_keys;
pub mod watchdog;

pub use error::{Error, Result};
pub use pressed_keys::{PressedKeys, ScanCode};

#[cfg(windows)]
pub use self::session::{Session, start};

#[cfg(windows)]
mod session {
    use std::thread;

    use crate::{
        error::Result,
        event::KeyboardEvent,
        keyboard_hook,
        oracle::HardwareOracle,
        pressed_keys::PressedKeys,
        watchdog::{self, Config, WatchdogHandle},
    };

    /// Starts a keyboard hook that records pressed keys and a watchdog that evicts the
    /// stale ones using the live Windows key state.
    pub fn start(config: Config) -> Result<Session> {
        let pressed = PressedKeys::new();
        let keyboard_hook = keyboard_hook::start_keyboard_hook(pressed.clone())?;
        let watchdog = watchdog::start_watchdog(pressed.clone(), HardwareOracle::new(), config)?;

        Ok(Session {
            pressed,
            keyboard_hook,
            watchdog,
        })
    }

    /// The running hook and watchdog, and the table they share.
    #[derive(Debug)]
    pub struct Session {
        pub pressed: PressedKeys<KeyboardEvent>,
        pub keyboard_hook: thread::JoinHandle<()>,
        pub watchdog: WatchdogHandle,
    }
}
