//! Time-ordered identifiers (TIDs) used as `Event.rkey`.
//!
//! A TID packs a microsecond timestamp and a per-process clock identifier
//! into a 64-bit integer, then renders it as a 13-character base32-sortable
//! string. Successive calls within the same process are guaranteed to sort
//! strictly after one another, even if the clock has not advanced, by
//! bumping the timestamp past the last value handed out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const B32_ALPHABET: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

/// A strictly-monotonic, time-ordered identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(u64);

static LAST: AtomicU64 = AtomicU64::new(0);

impl Tid {
    /// Generates the next TID, guaranteed to be strictly greater than any
    /// previously generated in this process.
    pub fn now() -> Self {
        let micros = current_micros();
        let mut prev = LAST.load(Ordering::SeqCst);
        loop {
            let next = micros.max(prev + 1);
            match LAST.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return Self(next),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Builds a TID from a raw microsecond value, without monotonicity
    /// bookkeeping. Used when reconstructing a TID from a stored
    /// `created_us` value.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Returns the underlying microsecond value.
    #[must_use]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Renders the TID as its 13-character base32-sortable string form.
    #[must_use]
    pub fn to_str(&self) -> String {
        let mut buf = [0u8; 13];
        let mut v = self.0;
        for slot in buf.iter_mut().rev() {
            *slot = B32_ALPHABET[(v & 0x1f) as usize];
            v >>= 5;
        }
        String::from_utf8(buf.to_vec()).expect("base32 alphabet is ASCII")
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

fn current_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_tids_are_strictly_increasing() {
        let mut prev = Tid::now();
        for _ in 0..1000 {
            let next = Tid::now();
            assert!(next > prev, "{next:?} should be greater than {prev:?}");
            prev = next;
        }
    }

    #[test]
    fn string_form_sorts_the_same_as_numeric_form() {
        let a = Tid::from_micros(100);
        let b = Tid::from_micros(200);
        assert!(a < b);
        assert!(a.to_str() < b.to_str());
    }

    #[test]
    fn string_form_is_thirteen_chars() {
        let tid = Tid::now();
        assert_eq!(tid.to_str().len(), 13);
    }
}
