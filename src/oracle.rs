//! Live hardware key state, queried per scan code.
//!
//! [`HardwareOracle`] answers "is this physical key held right now?" by asking the OS
//! instead of trusting any application-side record:
//!
//! 1. the scan code is translated to a virtual key with `MAPVK_VSC_TO_VK_EX`, which keeps
//!    left and right variants of Shift, Ctrl and Alt apart;
//! 2. a scan code without a virtual key is reported as not down;
//! 3. otherwise the high bit of `GetAsyncKeyState` decides.
//!
//! The two OS primitives sit behind [`KeyboardApi`] so the decision logic can be driven by
//! a fake keyboard in tests.

use crate::pressed_keys::ScanCode;

/// Bit of the async key state that is set while the key is down.
pub const KEY_DOWN_BIT: u16 = 0x8000;

/// A Windows virtual-key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualKey(pub u16);

impl VirtualKey {
    /// Converts the raw result of a scan code translation. Zero means "no such key".
    pub fn from_raw(raw: u32) -> Option<Self> {
        match u16::try_from(raw) {
            Ok(0) | Err(_) => None,
            Ok(vk) => Some(Self(vk)),
        }
    }
}

/// Answers whether the physical key behind a scan code is currently held down.
pub trait KeyStateOracle {
    fn is_down(&self, scan_code: ScanCode) -> bool;
}

impl<F: Fn(ScanCode) -> bool> KeyStateOracle for F {
    fn is_down(&self, scan_code: ScanCode) -> bool {
        self(scan_code)
    }
}

/// The OS primitives the [`HardwareOracle`] is built on.
pub trait KeyboardApi {
    /// Translates a scan code to a virtual-key code, distinguishing left and right keys.
    /// Returns `0` when there is no translation.
    fn map_scan_code(&self, scan_code: ScanCode) -> u32;

    /// Returns the asynchronous key state of a virtual key. The most significant bit is
    /// set while the key is down.
    fn async_key_state(&self, virtual_key: VirtualKey) -> i16;
}

/// A [`KeyStateOracle`] that reads live key state from a [`KeyboardApi`].
#[derive(Debug, Clone, Default)]
pub struct HardwareOracle<K> {
    api: K,
}

impl<K: KeyboardApi> HardwareOracle<K> {
    pub fn with_api(api: K) -> Self {
        Self { api }
    }

    /// Returns the left/right-aware virtual key for a scan code, if it has one.
    pub fn virtual_key(&self, scan_code: ScanCode) -> Option<VirtualKey> {
        VirtualKey::from_raw(self.api.map_scan_code(scan_code))
    }
}

impl<K: KeyboardApi> KeyStateOracle for HardwareOracle<K> {
    fn is_down(&self, scan_code: ScanCode) -> bool {
        match self.virtual_key(scan_code) {
            Some(vk) => self.api.async_key_state(vk) as u16 & KEY_DOWN_BIT != 0,
            None => false,
        }
    }
}

#[cfg(windows)]
pub use self::win32::Win32Keyboard;

#[cfg(windows)]
mod win32 {
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        GetAsyncKeyState, MAPVK_VSC_TO_VK_EX, MapVirtualKeyW,
    };

    use super::{HardwareOracle, KeyboardApi, VirtualKey};
    use crate::pressed_keys::ScanCode;

    /// [`KeyboardApi`] backed by `MapVirtualKeyW` and `GetAsyncKeyState`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Win32Keyboard;

    impl KeyboardApi for Win32Keyboard {
        fn map_scan_code(&self, scan_code: ScanCode) -> u32 {
            unsafe { MapVirtualKeyW(scan_code.0, MAPVK_VSC_TO_VK_EX) }
        }

        fn async_key_state(&self, virtual_key: VirtualKey) -> i16 {
            unsafe { GetAsyncKeyState(virtual_key.0 as i32) }
        }
    }

    impl HardwareOracle<Win32Keyboard> {
        /// Creates an oracle that queries the live Windows keyboard state.
        pub fn new() -> Self {
            Self::with_api(Win32Keyboard)
        }
    }
}
