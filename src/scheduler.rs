//! Arrival planning and per-second pacing.
//!
//! The whole [`ArrivalPlan`] is drawn before the first send. During the run
//! each second gets a [`SecondWindow`] anchored to the run start, so second
//! `s` always ends at `start + (s + 1)` seconds regardless of how long earlier
//! sends took. Sends inside a window are spread at `1/N` intervals; sends that
//! would spill past the window's end are dropped.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::sampling::{PoissonSampler, RandomSource};
use crate::types::ArrivalPlan;
use crate::{Result, TrafficError};

const SECOND: Duration = Duration::from_secs(1);

/// Produces arrival plans and pacing windows for one run.
#[derive(Debug, Clone, Copy)]
pub struct ArrivalScheduler {
    duration_secs: u32,
    sampler: PoissonSampler,
}

impl ArrivalScheduler {
    pub fn new(duration_secs: u32, mean_rate: f64) -> Result<Self> {
        if duration_secs == 0 {
            return Err(TrafficError::configuration("Duration must be at least one second"));
        }
        Ok(Self { duration_secs, sampler: PoissonSampler::new(mean_rate)? })
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn sampler(&self) -> &PoissonSampler {
        &self.sampler
    }

    /// Draw one count per second of the run.
    pub fn plan<R: RandomSource + ?Sized>(&self, source: &mut R) -> Result<ArrivalPlan> {
        let counts = (0..self.duration_secs)
            .map(|_| self.sampler.sample(source))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            seconds = counts.len(),
            total = counts.iter().map(|&c| u64::from(c)).sum::<u64>(),
            "arrival plan drawn"
        );
        Ok(ArrivalPlan::new(counts))
    }

    /// Pacing window for `second` of a run that started at `run_start`.
    pub fn window(&self, run_start: Instant, second: usize, count: u32) -> SecondWindow {
        SecondWindow::new(run_start, second, count)
    }
}

/// What the caller should do next inside a [`SecondWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Send message number `index` (zero based) now.
    Send(u32),
    /// Every planned message of this second was handed out.
    Complete,
    /// The second's budget ran out with `remaining` messages unsent.
    Truncated { remaining: u32 },
    /// The run was cancelled.
    Cancelled,
}

/// Pacing state for a single second.
#[derive(Debug, Clone)]
pub struct SecondWindow {
    second: usize,
    opens_at: Instant,
    deadline: Instant,
    count: u32,
    interval: Duration,
    next: u32,
}

impl SecondWindow {
    pub fn new(run_start: Instant, second: usize, count: u32) -> Self {
        let opens_at = run_start + SECOND * second as u32;
        let interval = if count > 0 { SECOND / count } else { SECOND };
        Self { second, opens_at, deadline: opens_at + SECOND, count, interval, next: 0 }
    }

    pub fn second(&self) -> usize {
        self.second
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Wait for the next send slot.
    ///
    /// Slot `i` is due at `opens_at + i * interval`. A slot that is already
    /// due is handed out immediately; once the deadline has passed the rest of
    /// the batch is reported as truncated.
    pub async fn next_slot(&mut self, cancel: &CancellationToken) -> Slot {
        if cancel.is_cancelled() {
            return Slot::Cancelled;
        }
        if self.next >= self.count {
            return Slot::Complete;
        }
        if Instant::now() >= self.deadline {
            return self.truncate();
        }

        let due = self.opens_at + self.interval * self.next;
        if due > Instant::now() {
            tokio::select! {
                _ = cancel.cancelled() => return Slot::Cancelled,
                _ = sleep_until(due) => {}
            }
        }

        if Instant::now() >= self.deadline {
            return self.truncate();
        }

        let index = self.next;
        self.next += 1;
        trace!(second = self.second, index, "send slot");
        Slot::Send(index)
    }

    /// Block until the end of this second. Returns `false` if cancelled first.
    pub async fn finish(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep_until(self.deadline) => true,
        }
    }

    fn truncate(&mut self) -> Slot {
        let remaining = self.count - self.next;
        self.next = self.count;
        Slot::Truncated { remaining }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::UniformSource;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_plan_has_one_valid_entry_per_second(
            duration in 1u32..120,
            lambda in 0.0f64..80.0,
            seed in any::<u64>()
        ) {
            let scheduler = ArrivalScheduler::new(duration, lambda).unwrap();
            let plan = scheduler.plan(&mut UniformSource::seeded(seed)).unwrap();
            let (low, high) = scheduler.sampler().bounds();

            prop_assert_eq!(plan.len(), duration as usize);
            prop_assert!(plan.counts().iter().all(|&c| c >= low && c <= high));
        }
    }

    #[test]
    fn three_second_udp_plan_stays_within_three_to_seven() {
        let scheduler = ArrivalScheduler::new(3, 5.0).unwrap();
        for seed in 0..200 {
            let plan = scheduler.plan(&mut UniformSource::seeded(seed)).unwrap();
            assert_eq!(plan.len(), 3);
            assert!(plan.counts().iter().all(|c| (3..=7).contains(c)), "{plan:?}");
        }
    }

    #[test]
    fn zero_duration_is_rejected() {
        assert!(matches!(ArrivalScheduler::new(0, 5.0), Err(TrafficError::Configuration { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_spread_evenly_across_the_second() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let mut window = SecondWindow::new(start, 0, 4);
        let mut offsets = Vec::new();

        while let Slot::Send(_) = window.next_slot(&cancel).await {
            offsets.push(Instant::now() - start);
        }

        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(750)
            ]
        );
        assert!(window.finish(&cancel).await);
        assert_eq!(Instant::now() - start, SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn windows_are_anchored_to_run_start() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        // Second 0 overruns its budget with slow sends...
        let mut first = SecondWindow::new(start, 0, 2);
        assert_eq!(first.next_slot(&cancel).await, Slot::Send(0));
        tokio::time::sleep(Duration::from_millis(1_300)).await;
        assert_eq!(first.next_slot(&cancel).await, Slot::Truncated { remaining: 1 });
        assert!(first.finish(&cancel).await);

        // ...but second 1 still ends exactly two seconds after the start.
        let mut second = SecondWindow::new(start, 1, 1);
        assert_eq!(second.next_slot(&cancel).await, Slot::Send(0));
        assert_eq!(second.next_slot(&cancel).await, Slot::Complete);
        assert!(second.finish(&cancel).await);
        assert_eq!(Instant::now() - start, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sends_truncate_the_tail_of_a_burst() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let mut window = SecondWindow::new(start, 0, 4);
        let mut sent = 0;

        let truncated = loop {
            match window.next_slot(&cancel).await {
                Slot::Send(_) => {
                    sent += 1;
                    tokio::time::sleep(Duration::from_millis(400)).await;
                }
                other => break other,
            }
        };

        assert_eq!(sent, 3);
        assert_eq!(truncated, Slot::Truncated { remaining: 1 });
        assert_eq!(window.next_slot(&cancel).await, Slot::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_seconds_still_wait_for_the_boundary() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let mut window = SecondWindow::new(start, 0, 0);

        assert_eq!(window.next_slot(&cancel).await, Slot::Complete);
        assert!(window.finish(&cancel).await);
        assert_eq!(Instant::now() - start, SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_waiting() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let mut window = SecondWindow::new(start, 0, 2);
        assert_eq!(window.next_slot(&cancel).await, Slot::Send(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        assert_eq!(window.next_slot(&cancel).await, Slot::Cancelled);
        assert!(!window.finish(&cancel).await);
        assert!(Instant::now() - start < Duration::from_millis(500));
    }
}
