//! A low-level keyboard hook that keeps a [`PressedKeys`] table up to date.
//!
//! This is the hook path the watchdog backs up: it records every key-down and removes the
//! record on the matching key-up. Keys whose release never reaches the hook are left
//! behind until the watchdog evicts them.

use std::{cell::OnceCell, thread};

use windows::{
    Win32::{
        Foundation::{LPARAM, LRESULT, WPARAM},
        System::LibraryLoader::GetModuleHandleW,
        UI::WindowsAndMessaging::{
            CallNextHookEx, DispatchMessageW, GetMessageW, HC_ACTION, HHOOK, HOOKPROC, MSG,
            SetWindowsHookExW, TranslateMessage, WH_KEYBOARD_LL,
        },
    },
    core::Owned,
};

use crate::{
    error::{Error, Result},
    event::KeyboardEvent,
    pressed_keys::PressedKeys,
};

thread_local! {
    static PRESSED_KEYS: OnceCell<PressedKeys<KeyboardEvent>> = const { OnceCell::new() };
}

/// Installs a `WH_KEYBOARD_LL` hook on a new thread and pumps its messages.
///
/// Returns once the hook is registered. Every keystroke the hook receives is applied to
/// `pressed` with [`PressedKeys::record`].
pub fn start_keyboard_hook(pressed: PressedKeys<KeyboardEvent>) -> Result<thread::JoinHandle<()>> {
    let (result_tx, result_rx) = oneshot::channel::<Result<()>>();

    let join_handle = thread::spawn(move || {
        PRESSED_KEYS.with(|cell| {
            let _ = cell.set(pressed);
        });

        let hook_result = unsafe { register_keyboard_hook(Some(low_level_keyboard_proc)) };

        let _hook_handle = match hook_result {
            Err(e) => {
                #[cfg(feature = "log")]
                log::error!("failed to register keyboard hook: {}", e);
                let _ = result_tx.send(Err(Error::HookRegistrationFailed(e)));
                return;
            }
            Ok(handle) => {
                let _ = result_tx.send(Ok(()));
                handle
            }
        };

        #[cfg(feature = "log")]
        log::info!("registered keyboard hook");

        let mut msg = MSG::default();
        unsafe {
            while GetMessageW(&mut msg, None, 0, 0).into() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    });

    match result_rx.recv() {
        Ok(Ok(())) => Ok(join_handle),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::HookThreadCrashed),
    }
}

unsafe extern "system" fn low_level_keyboard_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        if let Some(event) = unsafe { KeyboardEvent::from_params(l_param, w_param) } {
            PRESSED_KEYS.with(|cell| {
                if let Some(pressed) = cell.get() {
                    #[cfg(feature = "log")]
                    log::trace!(
                        "{:?} {}",
                        event.wm_key_state,
                        crate::event::KeyEvent::scan_code(&event)
                    );
                    pressed.record(event);
                }
            });
        }
    }

    unsafe { CallNextHookEx(None, n_code, w_param, l_param) }
}

unsafe fn register_keyboard_hook(f: HOOKPROC) -> std::io::Result<Owned<HHOOK>> {
    let module = unsafe { GetModuleHandleW(None) }?;
    let keyboard_hook = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, f, Some(module.into()), 0) }?;

    Ok(unsafe { Owned::new(keyboard_hook) })
}
