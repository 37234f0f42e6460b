//! Receive loop: capture source in, delay samples out.
//!
//! [`Receiver::spawn`] moves a [`CaptureSource`] and a [`ReceiverClassifier`]
//! into a background task. Each captured unit is classified on arrival; valid
//! samples are logged, folded into running [`DelayStats`] and broadcast to any
//! subscribers. Units with unreadable timestamps are logged and counted, never
//! fatal. Capture errors back off exponentially and end the loop after
//! [`MAX_CONSECUTIVE_ERRORS`] in a row.

pub mod classifier;

pub use classifier::{Classification, ReceiverClassifier};

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::capture::CaptureSource;
use crate::stream::CoalesceExt;
use crate::types::{DelaySample, DelayStats};
use crate::{Result, TrafficError};

/// Consecutive capture errors tolerated before the receiver gives up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

const SAMPLE_CAPACITY: usize = 1024;

pub struct Receiver;

impl Receiver {
    /// Start listening. The returned handle cancels the loop when dropped.
    pub fn spawn<S>(source: S, classifier: ReceiverClassifier) -> ReceiverHandle
    where
        S: CaptureSource,
    {
        Self::spawn_with_cancel(source, classifier, CancellationToken::new())
    }

    /// Start listening until `cancel` fires or the source ends.
    pub fn spawn_with_cancel<S>(
        source: S,
        classifier: ReceiverClassifier,
        cancel: CancellationToken,
    ) -> ReceiverHandle
    where
        S: CaptureSource,
    {
        let (sample_tx, _) = broadcast::channel(SAMPLE_CAPACITY);
        let (stats_tx, stats_rx) = watch::channel(DelayStats::default());

        let task = tokio::spawn(Self::receive_task(
            source,
            classifier,
            sample_tx.clone(),
            stats_tx,
            cancel.clone(),
        ));

        ReceiverHandle { samples: sample_tx, stats: stats_rx, cancel, task: Some(task) }
    }

    async fn receive_task<S>(
        mut source: S,
        classifier: ReceiverClassifier,
        sample_tx: broadcast::Sender<DelaySample>,
        stats_tx: watch::Sender<DelayStats>,
        cancel: CancellationToken,
    ) -> Result<DelayStats>
    where
        S: CaptureSource,
    {
        info!(source = %source.describe(), protocol = %classifier.protocol(), "receiver started");
        let mut stats = DelayStats::default();
        let mut unit_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("receiver cancelled");
                    break;
                }
                result = source.next_unit() => result,
            };

            match result {
                Ok(Some(unit)) => {
                    unit_count += 1;
                    error_count = 0;

                    match classifier.classify(&unit) {
                        Classification::Delay(sample) => {
                            info!("{sample}");
                            stats.record(&sample);
                            // No subscribers is fine.
                            let _ = sample_tx.send(sample);
                            stats_tx.send_replace(stats);
                        }
                        Classification::Invalid(e) => {
                            warn!(error = %e, "discarding unit");
                            stats.record_invalid();
                            stats_tx.send_replace(stats);
                        }
                        Classification::Unstamped { reason } => debug!(reason, "no timestamp"),
                        Classification::Ignored => trace!(unit = unit_count, "ignored"),
                    }
                }
                Ok(None) => {
                    info!(units = unit_count, "capture source ended");
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Capture error ({}/{}): {}", error_count, MAX_CONSECUTIVE_ERRORS, e);

                    if error_count >= MAX_CONSECUTIVE_ERRORS {
                        error!("Too many capture errors, shutting down");
                        return Err(e);
                    }

                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!(units = unit_count, %stats, "receiver stopped");
        Ok(stats)
    }
}

/// Owner's view of a running receiver.
pub struct ReceiverHandle {
    samples: broadcast::Sender<DelaySample>,
    stats: watch::Receiver<DelayStats>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<DelayStats>>>,
}

impl ReceiverHandle {
    /// Every sample produced after this call. A subscriber that falls more
    /// than the channel capacity behind skips the overflow.
    pub fn samples(&self) -> impl Stream<Item = DelaySample> + Send + 'static {
        BroadcastStream::new(self.samples.subscribe()).filter_map(|item| async move {
            match item {
                Ok(sample) => Some(sample),
                Err(lagged) => {
                    warn!("sample subscriber lagging: {lagged}");
                    None
                }
            }
        })
    }

    /// Running statistics, at most once per `period`.
    pub fn stats_updates(&self, period: Duration) -> impl Stream<Item = DelayStats> + Send + 'static {
        WatchStream::from_changes(self.stats.clone()).coalesce(period)
    }

    /// Statistics so far.
    pub fn stats(&self) -> DelayStats {
        *self.stats.borrow()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the loop to end and return its final statistics.
    pub async fn join(mut self) -> Result<DelayStats> {
        let Some(task) = self.task.take() else {
            return Ok(self.stats());
        };
        task.await
            .map_err(|e| TrafficError::capture(format!("receiver task failed: {e}")))?
    }

    /// Cancel the loop and wait for it to stop.
    pub async fn shutdown(self) -> Result<DelayStats> {
        self.cancel();
        self.join().await
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
