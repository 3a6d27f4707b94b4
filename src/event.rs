//! Keyboard events as seen by the hook path.
//!
//! Any event source can feed a [`PressedKeys`](crate::pressed_keys::PressedKeys) table by
//! implementing [`KeyEvent`] for its event type and calling
//! [`PressedKeys::record`](crate::pressed_keys::PressedKeys::record). On Windows,
//! [`KeyboardEvent`] wraps what a low-level keyboard hook receives.

use crate::pressed_keys::ScanCode;

/// A keyboard event that identifies a physical key and whether it went down or up.
pub trait KeyEvent {
    /// Returns the scan code of the physical key.
    fn scan_code(&self) -> ScanCode;

    /// Returns whether the key was pressed or released.
    fn key_state(&self) -> KeyState;

    /// Returns `true` if this is a key-down event. (Default implementation provided.)
    fn is_key_down(&self) -> bool {
        matches!(self.key_state(), KeyState::Down)
    }
}

/// Represents the state of a key: pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// The key is pressed.
    Down,
    /// The key is released.
    Up,
}

#[cfg(windows)]
pub use self::win32::{KeyboardEvent, WmKeyState};

#[cfg(windows)]
mod win32 {
    use windows::Win32::{
        Foundation::{LPARAM, WPARAM},
        UI::WindowsAndMessaging::{
            KBDLLHOOKSTRUCT, LLKHF_EXTENDED, WM_KEYDOWN, WM_KEYUP, WM_SYSKEYDOWN, WM_SYSKEYUP,
        },
    };

    use super::{KeyEvent, KeyState};
    use crate::pressed_keys::ScanCode;

    /// A single keyboard event received via a Windows low-level keyboard hook.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct KeyboardEvent {
        /// The raw Windows keyboard event structure.
        pub kbd: KBDLLHOOKSTRUCT,
        /// The window message the event was delivered with.
        pub wm_key_state: WmKeyState,
    }

    impl KeyboardEvent {
        /// Constructs a `KeyboardEvent` from `l_param` and `w_param` inside a Windows hook
        /// procedure.
        ///
        /// Returns `None` if `w_param` is not a keystroke message.
        ///
        /// # Safety
        /// `l_param` must be a valid pointer to a `KBDLLHOOKSTRUCT`.
        pub(crate) unsafe fn from_params(l_param: LPARAM, w_param: WPARAM) -> Option<Self> {
            let wm_key_state = WmKeyState::from_w_param(w_param)?;
            let kbd = unsafe { *(l_param.0 as *const KBDLLHOOKSTRUCT) };
            Some(Self { kbd, wm_key_state })
        }
    }

    impl KeyEvent for KeyboardEvent {
        fn scan_code(&self) -> ScanCode {
            ScanCode::new(self.kbd.scanCode, self.kbd.flags.0 & LLKHF_EXTENDED.0 != 0)
        }

        fn key_state(&self) -> KeyState {
            self.wm_key_state.into()
        }
    }

    /// Represents the type of Windows message related to a keyboard event.
    ///
    /// See also: [Keyboard Input](https://learn.microsoft.com/en-us/windows/win32/inputdev/about-keyboard-input#keystroke-messages)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum WmKeyState {
        /// [`WM_KEYDOWN`](https://learn.microsoft.com/en-us/windows/win32/inputdev/wm-keydown)
        KeyDown,
        /// [`WM_KEYUP`](https://learn.microsoft.com/en-us/windows/win32/inputdev/wm-keyup)
        KeyUp,
        /// [`WM_SYSKEYDOWN`](https://learn.microsoft.com/en-us/windows/win32/inputdev/wm-syskeydown)
        SysKeyDown,
        /// [`WM_SYSKEYUP`](https://learn.microsoft.com/en-us/windows/win32/inputdev/wm-syskeyup)
        SysKeyUp,
    }

    impl WmKeyState {
        fn from_w_param(w_param: WPARAM) -> Option<WmKeyState> {
            match u32::try_from(w_param.0).ok()? {
                WM_KEYDOWN => Some(WmKeyState::KeyDown),
                WM_KEYUP => Some(WmKeyState::KeyUp),
                WM_SYSKEYDOWN => Some(WmKeyState::SysKeyDown),
                WM_SYSKEYUP => Some(WmKeyState::SysKeyUp),
                _ => None,
            }
        }
    }

    impl From<WmKeyState> for KeyState {
        fn from(value: WmKeyState) -> Self {
            match value {
                WmKeyState::KeyDown | WmKeyState::SysKeyDown => KeyState::Down,
                WmKeyState::KeyUp | WmKeyState::SysKeyUp => KeyState::Up,
            }
        }
    }

}
