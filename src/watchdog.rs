//! Periodic reconciliation of the [`PressedKeys`] table against live hardware state.
//!
//! A low-level keyboard hook does not always see the release of a key. When a shortcut such
//! as `Win+L` is handled by the system, the key-down reaches the hook but the key-up never
//! does, and the hook path keeps believing the key is held. The watchdog closes that gap:
//! every [`Config::interval`] it takes a snapshot of the keys believed to be down, asks a
//! [`KeyStateOracle`] about each one and evicts the records the oracle disputes.
//!
//! The watchdog never inserts or modifies records, and it never holds the table's lock
//! while querying the oracle.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use oneshot::RecvTimeoutError;

use crate::{
    error::{Error, Result},
    oracle::KeyStateOracle,
    pressed_keys::{PressedKeys, ScanCode},
};

/// Poll interval used by [`Config::default`].
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Thread name used by [`Config::default`].
pub const DEFAULT_THREAD_NAME: &str = "keyboard-stuck-key-fix";

/// Runs a single reconciliation cycle.
///
/// Every key in a snapshot of `pressed` that `oracle` reports as not down is evicted.
/// Returns the scan codes this call actually removed; keys that the hook path released
/// between the snapshot and the eviction are skipped silently.
pub fn reconcile<R, O>(pressed: &PressedKeys<R>, oracle: &O) -> Vec<ScanCode>
where
    O: KeyStateOracle + ?Sized,
{
    pressed
        .scan_codes()
        .into_iter()
        .filter(|&scan_code| !oracle.is_down(scan_code))
        .filter(|&scan_code| pressed.evict(scan_code))
        .collect()
}

/// Starts the watchdog thread.
///
/// # Arguments
/// - `pressed`: The table shared with the hook path.
/// - `oracle`: The source of truth for which keys are held.
/// - `config`: Poll interval, thread name and callbacks.
///
/// # Returns
/// A [`WatchdogHandle`] to stop the watchdog. Dropping the handle detaches the watchdog,
/// which then keeps running until the process exits. It never keeps the process alive.
pub fn start_watchdog<R, O>(
    pressed: PressedKeys<R>,
    oracle: O,
    config: Config,
) -> Result<WatchdogHandle>
where
    R: Send + 'static,
    O: KeyStateOracle + Send + 'static,
{
    config.validate()?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let cycles = Arc::new(AtomicU64::new(0));

    let watchdog = Watchdog {
        pressed,
        oracle,
        cycles: Arc::clone(&cycles),
        config,
    };

    let join_handle = thread::Builder::new()
        .name(watchdog.config.thread_name.clone())
        .spawn(move || watchdog.run(stop_rx))
        .map_err(Error::WatchdogSpawnFailed)?;

    Ok(WatchdogHandle {
        stop_tx,
        cycles,
        join_handle,
    })
}

/// A callback invoked with the scan code of every evicted record.
pub type OnEvictedFn = dyn Fn(ScanCode) + Send + Sync + 'static;

/// A callback invoked with a description of a cycle that panicked.
pub type OnFaultFn = dyn Fn(&str) + Send + Sync + 'static;

/// Configuration for the watchdog.
///
/// By default the watchdog polls every 100 ms and its callbacks do nothing.
pub struct Config {
    /// Time between two reconciliation cycles. Bounds how long a stale record survives.
    pub interval: Duration,
    /// Name of the watchdog thread.
    pub thread_name: String,
    /// Called once for every record the watchdog evicts.
    pub on_evicted: Box<OnEvictedFn>,
    /// Called when a cycle panics. The watchdog keeps running afterwards.
    pub on_fault: Box<OnFaultFn>,
}

impl Config {
    /// Sets the poll interval (builder pattern).
    pub fn set_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the name of the watchdog thread (builder pattern).
    pub fn set_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the callback invoked for each evicted record (builder pattern).
    ///
    /// The callback runs on the watchdog thread, after the record has been removed.
    pub fn set_on_evicted<F: Fn(ScanCode) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_evicted = Box::new(f);
        self
    }

    /// Sets the callback invoked when a cycle fails (builder pattern).
    pub fn set_on_fault<F: Fn(&str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_fault = Box::new(f);
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInterval`] for a zero interval, which would spin the thread.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::InvalidInterval);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            on_evicted: Box::new(|_| {}),
            on_fault: Box::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("interval", &self.interval)
            .field("thread_name", &self.thread_name)
            .finish_non_exhaustive()
    }
}

/// Handle to a running watchdog.
pub struct WatchdogHandle {
    stop_tx: oneshot::Sender<()>,
    cycles: Arc<AtomicU64>,
    join_handle: thread::JoinHandle<()>,
}

impl WatchdogHandle {
    /// Number of cycles completed so far, faulted cycles included.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Wakes the watchdog out of its sleep, stops it and waits for the thread to exit.
    pub fn stop(self) -> thread::Result<()> {
        // the thread may already be gone, in which case there is nothing to wake
        let _ = self.stop_tx.send(());
        self.join_handle.join()
    }
}

impl std::fmt::Debug for WatchdogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchdogHandle")
            .field("cycles", &self.cycles())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

struct Watchdog<R, O> {
    pressed: PressedKeys<R>,
    oracle: O,
    cycles: Arc<AtomicU64>,
    config: Config,
}

impl<R, O: KeyStateOracle> Watchdog<R, O> {
    fn run(self, stop_rx: oneshot::Receiver<()>) {
        #[cfg(feature = "log")]
        log::debug!("started watchdog, polling every {:?}", self.config.interval);

        loop {
            self.run_cycle();

            match stop_rx.recv_timeout(self.config.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) => break,
                Err(RecvTimeoutError::Disconnected) => self.run_detached(),
            }
        }

        #[cfg(feature = "log")]
        log::debug!("stopped watchdog");
    }

    /// Runs for the rest of the process lifetime once nobody can stop the watchdog.
    fn run_detached(&self) -> ! {
        #[cfg(feature = "log")]
        log::debug!("watchdog handle dropped, running detached");

        loop {
            thread::sleep(self.config.interval);
            self.run_cycle();
        }
    }

    fn run_cycle(&self) {
        let reconciled =
            panic::catch_unwind(AssertUnwindSafe(|| reconcile(&self.pressed, &self.oracle)));

        match reconciled {
            Ok(evicted) => {
                #[cfg(feature = "log")]
                log::trace!("reconciled pressed keys, evicted {}", evicted.len());

                // every eviction is reported, even after a callback for an earlier one failed
                for scan_code in evicted {
                    #[cfg(feature = "log")]
                    log::info!("evicted stale key {}", scan_code);

                    let on_evicted = AssertUnwindSafe(|| (self.config.on_evicted)(scan_code));
                    if let Err(payload) = panic::catch_unwind(on_evicted) {
                        self.report_fault(&*payload);
                    }
                }
            }
            Err(payload) => self.report_fault(&*payload),
        }

        self.cycles.fetch_add(1, Ordering::AcqRel);
    }

    fn report_fault(&self, payload: &(dyn Any + Send)) {
        let message = panic_message(payload);

        #[cfg(feature = "log")]
        log::error!("watchdog cycle failed: {}", message);

        let on_fault = AssertUnwindSafe(|| (self.config.on_fault)(&message));
        let _ = panic::catch_unwind(on_fault);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
