//! Timers that produce freshly constructed [`Event`]s.
//!
//! Every schedule is owned through a [`TickHandle`]; dropping the handle
//! cancels the schedule, which ties a timer's lifetime to the connection
//! that armed it. A timer firing against a closed connection is a defect
//! this module exists to prevent.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::event::Event;

/// Factory for periodic and one-shot event schedules.
pub struct EventClock;

impl EventClock {
    /// Invoke `on_tick` with a fresh [`Event`] every `period`.
    ///
    /// The immediate first tick of the underlying interval is skipped, so
    /// the first invocation happens one full `period` after the call. Ticks
    /// never overlap. `on_tick` returns whether the schedule should
    /// continue; returning `false` stops it, which is how a write to a
    /// closed channel maps to disconnect cleanup.
    pub fn schedule<F>(period: Duration, mut on_tick: F) -> TickHandle
    where
        F: FnMut(Event) -> bool + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip immediate first tick
            timer.tick().await;

            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = timer.tick() => {
                        if !on_tick(Event::hello()) {
                            break;
                        }
                    }
                }
            }
        });

        TickHandle { cancel: cancel_tx }
    }

    /// Invoke `on_fire` with a fresh [`Event`] exactly once after `delay`,
    /// then self-cancel.
    pub fn once<F>(delay: Duration, on_fire: F) -> TickHandle
    where
        F: FnOnce(Event) + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel_rx.changed() => {}
                _ = tokio::time::sleep(delay) => {
                    on_fire(Event::hello());
                }
            }
        });

        TickHandle { cancel: cancel_tx }
    }
}

/// Cancellation handle for a schedule created by [`EventClock`].
///
/// `cancel` is idempotent, and dropping the handle cancels as well. A tick
/// already in flight finishes but is never rescheduled.
#[derive(Debug)]
pub struct TickHandle {
    cancel: watch::Sender<bool>,
}

impl TickHandle {
    /// Stop the schedule. Safe to call more than once.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Whether the driving task has observed cancellation and exited.
    pub fn is_finished(&self) -> bool {
        self.cancel.is_closed()
    }
}
