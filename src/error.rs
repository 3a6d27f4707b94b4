use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("the watchdog interval must be greater than zero")]
    InvalidInterval,
    #[error("failed to spawn the watchdog thread")]
    WatchdogSpawnFailed(#[source] std::io::Error),
    #[error("failed to register the keyboard hook")]
    HookRegistrationFailed(#[source] std::io::Error),
    #[error("the hook thread terminated unexpectedly")]
    HookThreadCrashed,
}

pub type Result<T> = std::result::Result<T, Error>;
