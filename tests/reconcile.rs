use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use unstick_keys::{
    PressedKeys, ScanCode,
    oracle::{HardwareOracle, KeyboardApi, VirtualKey},
    watchdog::{self, Config},
};

const LEFT_SHIFT: ScanCode = ScanCode(42);
const RIGHT_SHIFT: ScanCode = ScanCode(54);
const Z: ScanCode = ScanCode(44);
const VK_LSHIFT: VirtualKey = VirtualKey(0xA0);
const VK_RSHIFT: VirtualKey = VirtualKey(0xA1);
const VK_Z: VirtualKey = VirtualKey(0x5A);

const TICK: Duration = Duration::from_millis(10);

/// A keyboard whose held keys can change while the watchdog is running.
#[derive(Clone, Default)]
struct Keyboard {
    held: Arc<Mutex<HashSet<VirtualKey>>>,
}

impl Keyboard {
    fn layout() -> HashMap<ScanCode, VirtualKey> {
        [(LEFT_SHIFT, VK_LSHIFT), (RIGHT_SHIFT, VK_RSHIFT), (Z, VK_Z)]
            .into_iter()
            .collect()
    }

    fn hold(&self, vk: VirtualKey) {
        self.held.lock().unwrap().insert(vk);
    }

    fn lift(&self, vk: VirtualKey) {
        self.held.lock().unwrap().remove(&vk);
    }
}

impl KeyboardApi for Keyboard {
    fn map_scan_code(&self, scan_code: ScanCode) -> u32 {
        Self::layout().get(&scan_code).map_or(0, |vk| vk.0 as u32)
    }

    fn async_key_state(&self, virtual_key: VirtualKey) -> i16 {
        if self.held.lock().unwrap().contains(&virtual_key) {
            i16::MIN
        } else {
            0
        }
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn stale_key_is_evicted_after_one_tick() {
    let pressed = PressedKeys::new();
    pressed.press(LEFT_SHIFT, "pressed");

    let evicted = watchdog::reconcile(&pressed, &|sc: ScanCode| sc != LEFT_SHIFT);

    assert_eq!(evicted, vec![LEFT_SHIFT]);
    assert!(!pressed.contains(LEFT_SHIFT));
}

#[test]
fn held_key_survives_ten_ticks() {
    let pressed = PressedKeys::new();
    pressed.press(ScanCode(43), "pressed");

    for _ in 0..10 {
        let evicted = watchdog::reconcile(&pressed, &|sc: ScanCode| sc == ScanCode(43));
        assert!(evicted.is_empty());
    }

    assert!(pressed.contains(ScanCode(43)));
}

#[test]
fn right_shift_held_does_not_keep_left_shift() {
    let keyboard = Keyboard::default();
    keyboard.hold(VK_RSHIFT);
    let oracle = HardwareOracle::with_api(keyboard);

    let pressed = PressedKeys::new();
    pressed.press(LEFT_SHIFT, "left");
    pressed.press(RIGHT_SHIFT, "right");

    assert_eq!(watchdog::reconcile(&pressed, &oracle), vec![LEFT_SHIFT]);
    assert_eq!(pressed.scan_codes(), vec![RIGHT_SHIFT]);
}

#[test]
fn left_shift_held_does_not_keep_right_shift() {
    let keyboard = Keyboard::default();
    keyboard.hold(VK_LSHIFT);
    let oracle = HardwareOracle::with_api(keyboard);

    let pressed = PressedKeys::new();
    pressed.press(LEFT_SHIFT, "left");
    pressed.press(RIGHT_SHIFT, "right");

    assert_eq!(watchdog::reconcile(&pressed, &oracle), vec![RIGHT_SHIFT]);
    assert_eq!(pressed.scan_codes(), vec![LEFT_SHIFT]);
}

#[test]
fn unmapped_scan_code_is_evicted() {
    let keyboard = Keyboard::default();
    keyboard.hold(VK_Z);
    let oracle = HardwareOracle::with_api(keyboard);

    let pressed = PressedKeys::new();
    pressed.press(ScanCode(0x7E), ());

    assert_eq!(watchdog::reconcile(&pressed, &oracle), vec![ScanCode(0x7E)]);
}

#[test]
fn evicting_absent_key_leaves_others_alone() {
    let pressed = PressedKeys::new();
    pressed.press(LEFT_SHIFT, 1);
    pressed.press(Z, 2);

    assert!(!pressed.evict(RIGHT_SHIFT));

    assert_eq!(pressed.len(), 2);
    assert_eq!(pressed.get(LEFT_SHIFT), Some(1));
    assert_eq!(pressed.get(Z), Some(2));
}

#[test]
fn watchdog_converges_within_an_interval() {
    let keyboard = Keyboard::default();
    keyboard.hold(VK_Z);

    let pressed = PressedKeys::new();
    pressed.press(Z, ());

    let handle = watchdog::start_watchdog(
        pressed.clone(),
        HardwareOracle::with_api(keyboard.clone()),
        // long enough that polling below never lags a whole cycle behind
        Config::default().set_interval(TICK * 5),
    )
    .unwrap();

    // held throughout: never evicted
    let cycles = handle.cycles();
    assert!(wait_until(Duration::from_secs(5), || handle.cycles() >= cycles + 10));
    assert!(pressed.contains(Z));

    // release missed by the hook: gone within the cycle already running plus the next one
    keyboard.lift(VK_Z);
    let lifted_at = handle.cycles();
    assert!(wait_until(Duration::from_secs(5), || !pressed.contains(Z)));
    assert!(handle.cycles() <= lifted_at + 2);

    handle.stop().unwrap();
}

#[test]
fn watchdog_ignores_keys_the_hook_releases_itself() {
    let evictions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evictions);

    let pressed = PressedKeys::new();
    let handle = watchdog::start_watchdog(
        pressed.clone(),
        |_: ScanCode| true,
        Config::default()
            .set_interval(TICK)
            .set_on_evicted(move |sc| sink.lock().unwrap().push(sc)),
    )
    .unwrap();

    for _ in 0..20 {
        pressed.press(Z, ());
        pressed.release(Z);
    }
    pressed.press(LEFT_SHIFT, ());

    let cycles = handle.cycles();
    assert!(wait_until(Duration::from_secs(5), || handle.cycles() >= cycles + 3));
    handle.stop().unwrap();

    assert!(evictions.lock().unwrap().is_empty());
    assert_eq!(pressed.scan_codes(), vec![LEFT_SHIFT]);
}

#[test]
fn stopped_watchdog_no_longer_evicts() {
    let pressed = PressedKeys::new();
    let handle = watchdog::start_watchdog(
        pressed.clone(),
        |_: ScanCode| false,
        Config::default().set_interval(TICK),
    )
    .unwrap();
    handle.stop().unwrap();

    pressed.press(Z, ());
    thread::sleep(TICK * 5);
    assert!(pressed.contains(Z));
}

#[test]
fn dropped_handle_keeps_watchdog_running() {
    let pressed = PressedKeys::new();
    drop(
        watchdog::start_watchdog(
            pressed.clone(),
            |_: ScanCode| false,
            Config::default().set_interval(TICK),
        )
        .unwrap(),
    );

    pressed.press(Z, ());
    assert!(wait_until(Duration::from_secs(5), || pressed.is_empty()));
}
