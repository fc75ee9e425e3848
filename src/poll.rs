//! Readiness checks and the timeout-bounded wait loop

use crate::error::{AxiSpiError, Result};
use crate::regs::{self, Register, Registers};
use log::trace;
use std::thread;
use std::time::Duration;

/// Sleep between polls while more than `FINE_POLL_WINDOW` iterations remain
pub const COARSE_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Sleep between polls during the final iterations
pub const FINE_POLL_INTERVAL: Duration = Duration::from_micros(100);
pub const FINE_POLL_WINDOW: u16 = 10;

/// The conditions a controller operation can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The command queue has at least one free slot
    CommandSlot,
    /// A response byte is waiting in `data`
    Response,
    /// Every chip-select line is released, so continuous mode can stop
    ContinuousCancel,
}

impl Condition {
    /// Evaluate against live register state.
    ///
    /// `Err(Busy)` means "not yet"; `Err(InvalidConfig)` means it never will be.
    pub fn check<R: Registers + ?Sized>(self, regs: &R, ss_width: u8) -> Result<()> {
        match self {
            Condition::CommandSlot => {
                if regs::command_slots(regs.read(Register::Status)) > 0 {
                    Ok(())
                } else {
                    Err(AxiSpiError::Busy)
                }
            }
            Condition::Response => {
                let status = regs.read(Register::Status);
                if status & regs::STATUS_RSP_INT_ENABLE == 0 {
                    Err(AxiSpiError::InvalidConfig("response interrupt disabled"))
                } else if status & regs::STATUS_RSP_INT_FLAG != 0 {
                    Ok(())
                } else {
                    Err(AxiSpiError::Busy)
                }
            }
            Condition::ContinuousCancel => {
                let mask = regs::ss_mask(ss_width);
                if regs.read(Register::SsSignal) & mask == mask {
                    Ok(())
                } else {
                    Err(AxiSpiError::Busy)
                }
            }
        }
    }
}

pub trait Delay {
    fn sleep(&mut self, duration: Duration);
}

/// Cooperative sleep on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Poll `ready` until it succeeds or `timeout_ms` iterations have elapsed.
///
/// The budget counts loop iterations, one per poll, so the real wait is about
/// `timeout_ms` sleeps plus the cost of the checks rather than a wall-clock
/// deadline. A zero budget returns `Ok` without calling `ready`. Any error
/// other than `Busy` ends the wait immediately.
pub fn wait_for<D, F>(timeout_ms: u16, delay: &mut D, mut ready: F) -> Result<()>
where
    D: Delay + ?Sized,
    F: FnMut() -> Result<()>,
{
    if timeout_ms == 0 {
        return Ok(());
    }

    let mut remaining = timeout_ms;
    while remaining > 0 {
        remaining -= 1;
        match ready() {
            Ok(()) => {
                trace!("Ready after {} poll(s)", timeout_ms - remaining);
                return Ok(());
            }
            Err(AxiSpiError::Busy) => {}
            Err(e) => return Err(e),
        }

        let interval = if remaining < FINE_POLL_WINDOW {
            FINE_POLL_INTERVAL
        } else {
            COARSE_POLL_INTERVAL
        };
        delay.sleep(interval);
    }

    trace!("Gave up after {} poll(s)", timeout_ms);
    Err(AxiSpiError::Timeout { timeout_ms })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sim::SimRegisters;

    /// Records requested sleeps instead of sleeping
    #[derive(Debug, Default)]
    pub(crate) struct RecordingDelay {
        pub sleeps: Vec<Duration>,
    }

    impl RecordingDelay {
        pub fn count(&self, d: Duration) -> usize {
            self.sleeps.iter().filter(|s| **s == d).count()
        }
    }

    impl Delay for RecordingDelay {
        fn sleep(&mut self, duration: Duration) {
            self.sleeps.push(duration);
        }
    }

    #[test]
    fn test_zero_timeout_skips_predicate() {
        let mut delay = RecordingDelay::default();
        let mut calls = 0;
        let result = wait_for(0, &mut delay, || {
            calls += 1;
            Err(AxiSpiError::Busy)
        });
        assert!(result.is_ok());
        assert_eq!(calls, 0);
        assert!(delay.sleeps.is_empty());
    }

    #[test]
    fn test_timeout_consumes_every_iteration() {
        for t in [1u16, 5, 9, 10, 11, 25, 300] {
            let mut delay = RecordingDelay::default();
            let mut calls = 0u32;
            let result = wait_for(t, &mut delay, || {
                calls += 1;
                Err(AxiSpiError::Busy)
            });
            assert_eq!(result, Err(AxiSpiError::Timeout { timeout_ms: t }));
            assert_eq!(calls, t as u32);
            assert_eq!(delay.sleeps.len(), t as usize);

            let fine = t.min(FINE_POLL_WINDOW) as usize;
            assert_eq!(delay.count(FINE_POLL_INTERVAL), fine);
            assert_eq!(delay.count(COARSE_POLL_INTERVAL), t as usize - fine);
        }
    }

    #[test]
    fn test_coarse_then_fine_ordering() {
        let mut delay = RecordingDelay::default();
        let _ = wait_for(15, &mut delay, || Err(AxiSpiError::Busy));
        assert!(delay.sleeps[..5].iter().all(|d| *d == COARSE_POLL_INTERVAL));
        assert!(delay.sleeps[5..].iter().all(|d| *d == FINE_POLL_INTERVAL));
    }

    #[test]
    fn test_ready_on_third_poll() {
        let mut delay = RecordingDelay::default();
        let mut calls = 0;
        let result = wait_for(100, &mut delay, || {
            calls += 1;
            if calls == 3 {
                Ok(())
            } else {
                Err(AxiSpiError::Busy)
            }
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
        assert_eq!(delay.sleeps.len(), 2);
    }

    #[test]
    fn test_invalid_config_stops_immediately() {
        let mut delay = RecordingDelay::default();
        let mut calls = 0;
        let result = wait_for(1000, &mut delay, || {
            calls += 1;
            Err(AxiSpiError::InvalidConfig("response interrupt disabled"))
        });
        assert!(matches!(result, Err(AxiSpiError::InvalidConfig(_))));
        assert_eq!(calls, 1);
        assert!(delay.sleeps.is_empty());
    }

    #[test]
    fn test_command_slot_condition() {
        let sim = SimRegisters::new(1);
        sim.set_command_slots(0);
        assert_eq!(Condition::CommandSlot.check(&sim, 1), Err(AxiSpiError::Busy));
        sim.set_command_slots(4);
        assert_eq!(Condition::CommandSlot.check(&sim, 1), Ok(()));
    }

    #[test]
    fn test_response_condition() {
        let mut sim = SimRegisters::new(1);
        sim.write(Register::Status, 0);
        assert!(matches!(
            Condition::Response.check(&sim, 1),
            Err(AxiSpiError::InvalidConfig(_))
        ));

        sim.write(Register::Status, regs::STATUS_CMD_INT_ENABLE | regs::STATUS_RSP_INT_ENABLE);
        assert_eq!(Condition::Response.check(&sim, 1), Err(AxiSpiError::Busy));

        sim.push_response(0x5a);
        assert_eq!(Condition::Response.check(&sim, 1), Ok(()));
    }

    #[test]
    fn test_continuous_cancel_condition_is_width_masked() {
        let mut sim = SimRegisters::new(4);
        sim.write(Register::SsSignal, 0b0111);
        assert_eq!(Condition::ContinuousCancel.check(&sim, 4), Err(AxiSpiError::Busy));
        // Lines above the configured width are ignored
        sim.write(Register::SsSignal, 0xf0 | 0b1111);
        assert_eq!(Condition::ContinuousCancel.check(&sim, 4), Ok(()));
        assert_eq!(Condition::ContinuousCancel.check(&sim, 3), Ok(()));
    }
}
