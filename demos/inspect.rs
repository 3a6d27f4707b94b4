//! Prints the keys the hook believes are held, and every record the watchdog evicts.
//!
//! Press `Win+L`, unlock, and watch the `Win` key disappear from the list.

#[cfg(windows)]
fn main() {
    use std::{thread, time::Duration};

    use unstick_keys::watchdog::Config;

    #[cfg(feature = "log")]
    colog::init();

    let session = unstick_keys::start(
        Config::default()
            .set_interval(Duration::from_millis(50))
            .set_on_evicted(|sc| println!("evicted stale key {sc}"))
            .set_on_fault(|message| eprintln!("watchdog cycle failed: {message}")),
    )
    .unwrap();

    loop {
        let mut held = session.pressed.scan_codes();
        held.sort_unstable();
        println!("held: {held:?}");
        thread::sleep(Duration::from_secs(1));
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("this demo needs a Windows keyboard hook");
}
