//! Poisson-paced synthetic traffic generation and delay measurement.
//!
//! burstgen emits timestamped TCP, UDP, HTTP, MQTT or schema-defined messages
//! at a target mean rate whose per-second count follows a Poisson process, and
//! receives them on the far side to report end-to-end delay.
//!
//! # Features
//!
//! - **Poisson arrivals**: one count per second drawn up front, clamped to
//!   `λ ± √λ`, with transformed rejection for large means
//! - **Drift-free pacing**: each second is anchored to the run start; bursts
//!   that overflow their second are truncated rather than carried over
//! - **Five protocols**: crafted IPv4 packets over a raw socket, MQTT
//!   publishes, and user-defined records described by a JSON schema
//! - **Receiver**: raw-socket, libpcap (feature `pcap`) or MQTT capture with
//!   running delay statistics
//!
//! # Example (generate and measure in-process)
//!
//! ```rust,no_run
//! use burstgen::{Burstgen, ProtocolKind, TrafficSpec};
//!
//! #[tokio::main]
//! async fn main() -> burstgen::Result<()> {
//!     let spec = TrafficSpec::new(3, 5.0, ProtocolKind::Udp, "127.0.0.1");
//!     let (report, stats) = Burstgen::loopback(spec).await?;
//!
//!     println!("{report}");
//!     println!("{stats}");
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod record;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod timestamp;
pub mod types;

// Generation
pub mod codec;
pub mod emitter;
pub mod sampling;
pub mod scheduler;
pub mod transport;

// Reception
pub mod capture;
pub mod receiver;
pub mod stream;

pub mod config;

// Core exports
pub use error::*;
pub use types::*;

pub use capture::{CaptureBackend, CaptureSource, CapturedUnit};
pub use codec::{OutboundMessage, ProtocolCodec};
pub use config::{GeneratorProfile, ReceiverProfile, RunProfile};
pub use emitter::{Emitter, RunReport, SecondReport};
pub use receiver::{Classification, Receiver, ReceiverClassifier, ReceiverHandle};
pub use record::SchemaRecord;
pub use sampling::{PoissonSampler, RandomSource, UniformSource};
pub use scheduler::ArrivalScheduler;
pub use transport::Transmitter;

use tokio_util::sync::CancellationToken;

/// Buffer between the loopback transmitter and receiver.
const LOOPBACK_CAPACITY: usize = 4096;

/// Entry points for the common ways of running a generator or receiver.
pub struct Burstgen;

impl Burstgen {
    /// Validate `spec` and open a network emitter for it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `spec` is missing an option its protocol needs, including the
    ///   interface for crafted packets
    /// - the target host name does not resolve to an IPv4 address
    /// - the Custom schema cannot be loaded
    /// - the raw socket or broker connection cannot be opened
    pub async fn emitter(spec: TrafficSpec) -> Result<Emitter> {
        Emitter::connect(spec).await
    }

    /// Validate `config`, open its capture source and start listening.
    pub async fn receiver(config: ReceiverConfig, backend: CaptureBackend) -> Result<ReceiverHandle> {
        let classifier = ReceiverClassifier::load(&config)?;
        let source = capture::open_capture(&config, backend).await?;
        Ok(Receiver::spawn(source, classifier))
    }

    /// Run `spec` against an in-process receiver and return both sides'
    /// results. Nothing touches the network.
    pub async fn loopback(spec: TrafficSpec) -> Result<(RunReport, DelayStats)> {
        Self::loopback_with_cancel(spec, CancellationToken::new()).await
    }

    /// [`Burstgen::loopback`], stopping early when `cancel` fires.
    pub async fn loopback_with_cancel(
        spec: TrafficSpec,
        cancel: CancellationToken,
    ) -> Result<(RunReport, DelayStats)> {
        Self::run_loopback(spec, cancel, None).await
    }

    /// [`Burstgen::loopback_with_cancel`] with the arrival plan drawn from a
    /// generator seeded with `seed`, so the per-second counts are repeatable.
    pub async fn loopback_with_seed(
        spec: TrafficSpec,
        seed: u64,
        cancel: CancellationToken,
    ) -> Result<(RunReport, DelayStats)> {
        Self::run_loopback(spec, cancel, Some(UniformSource::seeded(seed))).await
    }

    async fn run_loopback(
        spec: TrafficSpec,
        cancel: CancellationToken,
        random: Option<UniformSource>,
    ) -> Result<(RunReport, DelayStats)> {
        let config = config::receiver_for(&spec);
        let classifier = ReceiverClassifier::load(&config)?;
        let (transmitter, capture) = transport::loopback(LOOPBACK_CAPACITY);

        let mut emitter = Emitter::with_transmitter(spec, transmitter)?.with_cancellation(cancel);
        if let Some(random) = random {
            emitter = emitter.with_random_source(random);
        }
        let receiver = Receiver::spawn(capture, classifier);

        let report = emitter.run().await?;
        // The capture side ends once the closed channel drains.
        let stats = receiver.join().await?;
        Ok((report, stats))
    }
}
