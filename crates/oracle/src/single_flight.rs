//! Per-category single-flight guard.
//!
//! At most one report per category is in flight. [`SingleFlight::try_acquire`]
//! is a compare-and-swap on an atomic flag; the returned [`FlightGuard`]
//! clears the flag when dropped, so every exit path of the report task
//! (success, error, panic, cancellation) releases it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the flight; `None` if another report holds it.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                busy: self.busy.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the flight until dropped.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().expect("first acquire");
        assert!(flight.is_running());
        assert!(flight.try_acquire().is_none());

        drop(guard);
        assert!(!flight.is_running());
        assert!(flight.try_acquire().is_some());
    }

    #[tokio::test]
    async fn guard_released_when_task_panics() {
        let flight = SingleFlight::new();
        let guard = flight.try_acquire().unwrap();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("report failed");
        });
        assert!(handle.await.is_err());
        assert!(!flight.is_running());
    }

    #[test]
    fn clones_share_the_flag() {
        let a = SingleFlight::new();
        let b = a.clone();
        let _guard = a.try_acquire().unwrap();
        assert!(b.try_acquire().is_none());
    }
}
