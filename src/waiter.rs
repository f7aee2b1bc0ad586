//! The wait engine: deadline-bounded polling with recoverable-failure
//! absorption.
//!
//! Every waiting surface of the crate funnels into [`Waiter::until`]. One
//! outer tick is: evaluate, and on an unsatisfied or recoverably-failed
//! evaluation run the recovery hook, re-evaluate once, then sleep. The
//! deadline is checked after each tick so even a zero ttl performs one full
//! evaluation.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use holdfast_core_types::WaitConfig;

use crate::errors::{Error, LastSeen, Result};

/// Which error a waiter raises when its deadline expires.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Expiry means the condition was expected to become true eventually.
    Timeout,
    /// Expiry means the condition was expected to already hold.
    Assertion,
}

impl FailureKind {
    fn build(self, operation: &str, last: LastSeen) -> Error {
        match self {
            FailureKind::Timeout => Error::Timeout {
                operation: operation.to_string(),
                last,
            },
            FailureKind::Assertion => Error::Assertion {
                operation: operation.to_string(),
                last,
            },
        }
    }
}

/// Delay policy between ticks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backoff {
    /// The same pause every tick. Keeps attempt counts predictable under a
    /// given ttl.
    Fixed(Duration),
    /// Doubling pause, capped.
    Expo { initial: Duration, cap: Duration },
}

impl Backoff {
    /// Pause to take after the given 1-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(pause) => *pause,
            Backoff::Expo { initial, cap } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(*cap)
            }
        }
    }
}

/// Outcome of one evaluation.
pub enum Poll<T> {
    Ready(T),
    /// Not satisfied yet; optionally what was observed, for diagnostics.
    Pending(Option<String>),
}

/// Accepts plain `bool` predicates and fallible `Result<bool>` predicates
/// alike.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<bool>;
}

impl IntoOutcome for bool {
    fn into_outcome(self) -> Result<bool> {
        Ok(self)
    }
}

impl IntoOutcome for Result<bool> {
    fn into_outcome(self) -> Result<bool> {
        self
    }
}

fn default_classifier(error: &Error) -> bool {
    error.is_recoverable()
}

/// Absorb a recoverable recovery failure into the diagnostic note; let
/// fatal ones propagate. A failed recovery is retried on the next tick,
/// bounded by the same deadline as everything else.
fn absorb(note: &mut Option<String>, recoverable: fn(&Error) -> bool, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => Ok(()),
        Err(error) if recoverable(&error) => {
            *note = Some(error.to_string());
            Ok(())
        }
        Err(fatal) => Err(fatal),
    }
}

/// Reusable polling strategy. Holds policy only; every wait runs on the
/// caller's thread and sleeps between ticks.
#[derive(Clone, Copy, Debug)]
pub struct Waiter {
    config: WaitConfig,
    failure: FailureKind,
    backoff: Backoff,
    recoverable: fn(&Error) -> bool,
}

impl Waiter {
    /// Timeout-kind waiter with a fixed pause equal to the poll interval.
    pub fn new(config: WaitConfig) -> Self {
        Self {
            config,
            failure: FailureKind::Timeout,
            backoff: Backoff::Fixed(config.poll_interval),
            recoverable: default_classifier,
        }
    }

    /// Assertion-kind waiter. Identical polling, different terminal error.
    pub fn assertion(config: WaitConfig) -> Self {
        Self::new(config).with_failure(FailureKind::Assertion)
    }

    pub fn with_failure(mut self, failure: FailureKind) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_classifier(mut self, recoverable: fn(&Error) -> bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    pub fn config(&self) -> WaitConfig {
        self.config
    }

    /// Retry a self-contained fallible operation through recoverable
    /// failures until it succeeds or the deadline expires.
    pub fn retry<T>(&self, operation: &str, mut attempt: impl FnMut() -> Result<T>) -> Result<T> {
        self.until(operation, || Ok(()), || attempt().map(Poll::Ready))
    }

    /// Like [`Waiter::retry`], with a recovery hook run between attempts.
    pub fn retry_recovering<T>(
        &self,
        operation: &str,
        recover: impl FnMut() -> Result<()>,
        mut attempt: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        self.until(operation, recover, || attempt().map(Poll::Ready))
    }

    /// The outer loop. Evaluates `check` each tick; `recover` runs after an
    /// unsatisfied or recoverably-failed evaluation, before the next one.
    /// A recoverable failure earns one immediate re-evaluation within the
    /// same tick, so a single staleness event costs no sleep.
    pub fn until<T>(
        &self,
        operation: &str,
        mut recover: impl FnMut() -> Result<()>,
        mut check: impl FnMut() -> Result<Poll<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let deadline = started + self.config.ttl;
        let mut attempts: u32 = 0;
        let mut note: Option<String> = None;

        loop {
            attempts += 1;
            match check() {
                Ok(Poll::Ready(value)) => return Ok(value),
                Ok(Poll::Pending(seen)) => {
                    if seen.is_some() {
                        note = seen;
                    }
                    absorb(&mut note, self.recoverable, recover())?;
                }
                Err(error) if (self.recoverable)(&error) => {
                    trace!(operation, attempt = attempts, error = %error, "absorbing recoverable failure");
                    note = Some(error.to_string());
                    absorb(&mut note, self.recoverable, recover())?;
                    match check() {
                        Ok(Poll::Ready(value)) => return Ok(value),
                        Ok(Poll::Pending(seen)) => {
                            if seen.is_some() {
                                note = seen;
                            }
                        }
                        Err(error) if (self.recoverable)(&error) => note = Some(error.to_string()),
                        Err(fatal) => return Err(fatal),
                    }
                }
                Err(fatal) => return Err(fatal),
            }

            if Instant::now() >= deadline {
                warn!(operation, attempts, kind = ?self.failure, "deadline expired");
                let last = LastSeen {
                    attempts,
                    waited_ms: started.elapsed().as_millis() as u64,
                    note,
                };
                return Err(self.failure.build(operation, last));
            }
            thread::sleep(self.backoff.delay(attempts));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_driver::DriverError;
    use std::cell::Cell;

    fn fast(ttl_ms: u64, poll_ms: u64) -> Waiter {
        Waiter::new(WaitConfig::new(
            Duration::from_millis(ttl_ms),
            Duration::from_millis(poll_ms),
        ))
    }

    #[test]
    fn retry_returns_success_on_the_first_attempt() {
        let calls = Cell::new(0u32);
        let value = fast(1000, 5)
            .retry("op", || {
                calls.set(calls.get() + 1);
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retry_absorbs_recoverable_failures_until_success() {
        let calls = Cell::new(0u32);
        let value = fast(1000, 5)
            .retry("op", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(Error::from(DriverError::stale("ref went away")))
                } else {
                    Ok("done")
                }
            })
            .unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn fatal_errors_bypass_the_deadline() {
        let calls = Cell::new(0u32);
        let outcome: Result<()> = fast(1000, 5).retry("op", || {
            calls.set(calls.get() + 1);
            Err(Error::invalid_argument("unusable"))
        });
        assert!(matches!(outcome, Err(Error::InvalidArgument(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn deadline_expiry_yields_the_timeout_kind_with_diagnostics() {
        let outcome: Result<()> = fast(60, 10).retry("click on nth 0", || {
            Err(Error::from(DriverError::stale("ref went away")))
        });
        match outcome {
            Err(Error::Timeout { operation, last }) => {
                assert_eq!(operation, "click on nth 0");
                assert!(last.attempts >= 2);
                assert!(last.waited_ms >= 60);
                assert!(last.note.unwrap().contains("stale"));
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn assertion_waiter_raises_the_assertion_kind() {
        let waiter = Waiter::assertion(WaitConfig::new(
            Duration::from_millis(40),
            Duration::from_millis(10),
        ));
        let outcome: Result<()> =
            waiter.until("count is 3", || Ok(()), || Ok(Poll::Pending(Some("2 elements".into()))));
        match outcome {
            Err(Error::Assertion { last, .. }) => {
                assert_eq!(last.note.as_deref(), Some("2 elements"));
            }
            other => panic!("expected an assertion failure, got {:?}", other),
        }
    }

    #[test]
    fn until_polls_through_pending_to_ready() {
        let calls = Cell::new(0u32);
        let value = fast(1000, 5)
            .until(
                "op",
                || Ok(()),
                || {
                    calls.set(calls.get() + 1);
                    if calls.get() < 3 {
                        Ok(Poll::Pending(None))
                    } else {
                        Ok(Poll::Ready(calls.get()))
                    }
                },
            )
            .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn a_recoverable_failure_earns_an_immediate_reattempt() {
        let recoveries = Cell::new(0u32);
        let calls = Cell::new(0u32);
        let started = Instant::now();
        // Long poll interval: success must come without sleeping.
        let waiter = fast(5000, 2000);
        waiter
            .retry_recovering(
                "op",
                || {
                    recoveries.set(recoveries.get() + 1);
                    Ok(())
                },
                || {
                    calls.set(calls.get() + 1);
                    if calls.get() == 1 {
                        Err(Error::from(DriverError::stale("ref went away")))
                    } else {
                        Ok(())
                    }
                },
            )
            .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(recoveries.get(), 1);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn recoverable_recovery_failures_are_absorbed() {
        let recoveries = Cell::new(0u32);
        let calls = Cell::new(0u32);
        fast(1000, 5)
            .until(
                "op",
                || {
                    recoveries.set(recoveries.get() + 1);
                    if recoveries.get() == 1 {
                        Err(Error::from(DriverError::io("transport hiccup")))
                    } else {
                        Ok(())
                    }
                },
                || {
                    calls.set(calls.get() + 1);
                    if calls.get() < 3 {
                        Ok(Poll::Pending(None))
                    } else {
                        Ok(Poll::Ready(()))
                    }
                },
            )
            .unwrap();
        assert!(recoveries.get() >= 2);
    }

    #[test]
    fn fatal_recovery_failures_propagate() {
        let outcome: Result<()> = fast(1000, 5).until(
            "op",
            || Err(Error::IndexOutOfRange { index: 4, len: 2 }),
            || Ok(Poll::Pending(None)),
        );
        assert!(matches!(outcome, Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn zero_ttl_still_evaluates_once() {
        let calls = Cell::new(0u32);
        let outcome: Result<()> = fast(0, 50).until(
            "op",
            || Ok(()),
            || {
                calls.set(calls.get() + 1);
                Ok(Poll::Pending(None))
            },
        );
        assert_eq!(calls.get(), 1);
        match outcome {
            Err(Error::Timeout { last, .. }) => assert_eq!(last.attempts, 1),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn expo_backoff_doubles_until_the_cap() {
        let backoff = Backoff::Expo {
            initial: Duration::from_millis(50),
            cap: Duration::from_millis(300),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(50));
        assert_eq!(backoff.delay(2), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(300));
        assert_eq!(backoff.delay(12), Duration::from_millis(300));
    }

    #[test]
    fn custom_classifiers_extend_the_recoverable_set() {
        let calls = Cell::new(0u32);
        let waiter = fast(1000, 5)
            .with_classifier(|error| matches!(error, Error::InvalidArgument(_)));
        let value = waiter
            .retry("op", || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(Error::invalid_argument("flaky by decree"))
                } else {
                    Ok(9)
                }
            })
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(calls.get(), 2);
    }
}
