//! Single-flight guard for operations that must not overlap
//!
//! A [`SingleFlight`] wraps an atomic busy flag; [`SingleFlight::try_begin`]
//! either claims the flag and returns an RAII guard, or fails with
//! [`ConfabError::Busy`]. The guard releases the flag on drop, so every exit
//! path of the guarded operation (success, error, panic unwind) clears it.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ConfabError, Result};

/// Mutual-exclusion token for one logical operation owner
///
/// If a guarded network call never resolves, the owner stays busy for as
/// long as the call is pending; there is no cancellation here, only the
/// HTTP client's request timeout bounding it in practice.
#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or fail with `Busy(operation)` if already claimed
    pub(crate) fn try_begin(&self, operation: &'static str) -> Result<FlightGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConfabError::Busy(operation).into());
        }
        Ok(FlightGuard { flag: &self.busy })
    }

    /// Whether an operation currently holds the flag
    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// RAII release of a claimed [`SingleFlight`]
pub(crate) struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfabError;

    #[test]
    fn test_try_begin_claims_flag() {
        let flight = SingleFlight::new();
        assert!(!flight.is_busy());

        let guard = flight.try_begin("send").unwrap();
        assert!(flight.is_busy());
        drop(guard);
        assert!(!flight.is_busy());
    }

    #[test]
    fn test_second_begin_fails_with_busy() {
        let flight = SingleFlight::new();
        let _guard = flight.try_begin("send").unwrap();

        let err = flight.try_begin("send").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfabError>(),
            Some(ConfabError::Busy("send"))
        ));
    }

    #[test]
    fn test_flag_released_after_drop_allows_reuse() {
        let flight = SingleFlight::new();
        drop(flight.try_begin("list").unwrap());
        assert!(flight.try_begin("list").is_ok());
    }

    #[test]
    fn test_guard_releases_on_unwind() {
        let flight = SingleFlight::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flight.try_begin("send").unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!flight.is_busy());
    }
}
