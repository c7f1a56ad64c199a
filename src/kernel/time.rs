use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock instant a trigger was constructed at.
/// Orders triggers causally; not a monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp(SystemTime);

impl Stamp {
    pub fn now() -> Self {
        Stamp(SystemTime::now())
    }
}

static LAST_READING: AtomicU64 = AtomicU64::new(0);

/// Nanosecond clock reading, strictly increasing within the process.
///
/// Two calls landing on the same clock value are bumped apart so readings
/// double as unique identifiers.
pub fn clock_reading() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mut prev = LAST_READING.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_READING.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}
