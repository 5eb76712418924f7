//! Deadline-bounded polling.

use std::time::{Duration, Instant};

use anyhow::Result;

/// Call `probe` every `interval` until it yields a value or `timeout`
/// elapses. The probe always runs at least once, and once more at the
/// deadline so a slow final interval is not lost. Probe errors abort the
/// wait immediately.
pub fn poll_until<T>(
    interval: Duration,
    timeout: Duration,
    mut probe: impl FnMut() -> Result<Option<T>>,
) -> Result<Option<T>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe()? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(interval.min(deadline - now));
    }
}
