//! One complete send session.
//!
//! The [`Emitter`] draws the whole arrival plan, then walks it second by
//! second: each planned message is built with a fresh timestamp and handed to
//! the [`Transmitter`] inside its pacing slot. A failed or timed-out send ends
//! the run immediately; nothing is retried.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::ProtocolCodec;
use crate::sampling::{RandomSource, UniformSource};
use crate::scheduler::{ArrivalScheduler, Slot};
use crate::timestamp::{format_epoch, now};
use crate::transport::{Transmitter, discover_source, open_transmitter};
use crate::types::{ArrivalPlan, ProtocolKind, ProtocolSchema, TrafficSpec, lookup_ipv4};
use crate::{Result, TrafficError};

/// Outcome of one second of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SecondReport {
    pub second: usize,
    pub planned: u32,
    pub sent: u32,
    /// Planned messages dropped because the second ran out
    pub truncated: u32,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub protocol: ProtocolKind,
    pub seconds: Vec<SecondReport>,
    pub elapsed: Duration,
    /// Whether the run stopped before its last second
    pub cancelled: bool,
}

impl RunReport {
    pub fn planned(&self) -> u64 {
        self.seconds.iter().map(|s| u64::from(s.planned)).sum()
    }

    pub fn sent(&self) -> u64 {
        self.seconds.iter().map(|s| u64::from(s.sent)).sum()
    }

    pub fn truncated(&self) -> u64 {
        self.seconds.iter().map(|s| u64::from(s.truncated)).sum()
    }

    /// Messages sent per completed second.
    pub fn sent_per_second(&self) -> Vec<u32> {
        self.seconds.iter().map(|s| s.sent).collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: sent {}/{} messages over {} s ({} truncated) in {:.2?}{}",
            self.protocol,
            self.sent(),
            self.planned(),
            self.seconds.len(),
            self.truncated(),
            self.elapsed,
            if self.cancelled { ", cancelled" } else { "" }
        )
    }
}

/// Drives a [`TrafficSpec`] through a [`Transmitter`].
pub struct Emitter {
    spec: TrafficSpec,
    scheduler: ArrivalScheduler,
    codec: ProtocolCodec,
    transmitter: Box<dyn Transmitter>,
    random: Box<dyn RandomSource + Send>,
    cancel: CancellationToken,
}

impl Emitter {
    /// Validate `spec` and open the network transmitter it needs.
    ///
    /// All configuration and schema problems surface here, before any I/O.
    pub async fn connect(spec: TrafficSpec) -> Result<Self> {
        spec.validate_for_network()?;
        let destination = match spec.protocol {
            ProtocolKind::Mqtt => None,
            _ => Some(lookup_ipv4(&spec.target).await?),
        };
        let (scheduler, codec) = prepare(&spec, destination)?;
        let transmitter = open_transmitter(&spec).await?;
        Ok(Self::assemble(spec, scheduler, codec, transmitter))
    }

    /// Validate `spec` and send through `transmitter` instead of the network.
    pub fn with_transmitter<T>(spec: TrafficSpec, transmitter: T) -> Result<Self>
    where
        T: Transmitter + 'static,
    {
        let (scheduler, codec) = prepare(&spec, None)?;
        Ok(Self::assemble(spec, scheduler, codec, Box::new(transmitter)))
    }

    fn assemble(
        spec: TrafficSpec,
        scheduler: ArrivalScheduler,
        codec: ProtocolCodec,
        transmitter: Box<dyn Transmitter>,
    ) -> Self {
        Self {
            spec,
            scheduler,
            codec,
            transmitter,
            random: Box::new(UniformSource::from_os_rng()),
            cancel: CancellationToken::new(),
        }
    }

    /// Draw the arrival plan from `source` instead of the OS-seeded generator.
    pub fn with_random_source<R>(mut self, source: R) -> Self
    where
        R: RandomSource + Send + 'static,
    {
        self.random = Box::new(source);
        self
    }

    /// Stop the run early when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn spec(&self) -> &TrafficSpec {
        &self.spec
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session to completion (or cancellation).
    pub async fn run(mut self) -> Result<RunReport> {
        let plan = self.scheduler.plan(self.random.as_mut())?;
        info!(
            protocol = %self.spec.protocol,
            target = %self.spec.target,
            port = self.spec.port,
            seconds = plan.len(),
            planned = plan.total(),
            "starting run"
        );

        let result = self.send_plan(&plan).await;
        let closed = self.transmitter.close().await;

        let report = match (result, closed) {
            (Ok(report), Ok(())) => report,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), closed) => {
                if let Err(close_error) = closed {
                    error!(error = %close_error, "closing transmitter after failed run");
                }
                return Err(e);
            }
        };

        info!("{report}");
        Ok(report)
    }

    async fn send_plan(&mut self, plan: &ArrivalPlan) -> Result<RunReport> {
        let start = Instant::now();
        let mut seconds = Vec::with_capacity(plan.len());
        let mut cancelled = false;

        'run: for (second, count) in plan.iter() {
            let mut window = self.scheduler.window(start, second, count);
            let mut report = SecondReport { second, planned: count, sent: 0, truncated: 0 };

            loop {
                match window.next_slot(&self.cancel).await {
                    Slot::Send(_) => {
                        self.send_one().await?;
                        report.sent += 1;
                    }
                    Slot::Complete => break,
                    Slot::Truncated { remaining } => {
                        warn!(second, planned = count, remaining, "second overran, dropping rest");
                        report.truncated = remaining;
                        break;
                    }
                    Slot::Cancelled => {
                        seconds.push(report);
                        cancelled = true;
                        break 'run;
                    }
                }
            }

            info!(second, planned = count, sent = report.sent, "second complete");
            seconds.push(report);

            if !window.finish(&self.cancel).await {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            info!(completed = seconds.len(), "run cancelled");
        }
        Ok(RunReport { protocol: self.spec.protocol, seconds, elapsed: start.elapsed(), cancelled })
    }

    async fn send_one(&mut self) -> Result<()> {
        let at = now();
        let message = self.codec.build(at)?;
        debug!("Sending {}", format_epoch(at));

        let duration = self.spec.send_timeout();
        match tokio::time::timeout(duration, self.transmitter.transmit(message)).await {
            Ok(result) => result,
            Err(_) => Err(TrafficError::Timeout { duration }),
        }
    }
}

/// Everything that can be checked without touching the network.
///
/// `destination` is the already-resolved target; without it a host name is
/// resolved in place.
fn prepare(
    spec: &TrafficSpec,
    destination: Option<Ipv4Addr>,
) -> Result<(ArrivalScheduler, ProtocolCodec)> {
    spec.validate()?;
    let scheduler = ArrivalScheduler::new(spec.duration_secs, spec.mean_rate)?;

    let schema = match (&spec.protocol, &spec.extras.schema_path) {
        (ProtocolKind::Custom, Some(path)) => {
            let schema = ProtocolSchema::from_file(path)?;
            debug!(schema = %schema.name, fields = schema.field_count(), "schema loaded");
            Some(Arc::new(schema))
        }
        _ => None,
    };

    if spec.protocol == ProtocolKind::Mqtt {
        let codec = ProtocolCodec::new(spec, Ipv4Addr::UNSPECIFIED, schema)?;
        return Ok((scheduler, codec));
    }

    let destination = match destination {
        Some(ip) => ip,
        None => spec.target_ipv4()?,
    };
    let source = match spec.source {
        Some(source) => source,
        None => discover_source(destination)?,
    };

    let codec = ProtocolCodec::with_destination(spec, source, destination, schema)?;
    Ok((scheduler, codec))
}
