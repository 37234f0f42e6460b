//! libpcap capture (feature `pcap`).
//!
//! libpcap is blocking, so capture runs on a dedicated thread that forwards
//! frames over a bounded channel. The thread stops when the source is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pcap::{Active, Capture, Device};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{CaptureSource, CapturedUnit, LinkType};
use crate::timestamp::{epoch_seconds, now};
use crate::{Result, TrafficError};

const READ_TIMEOUT_MS: i32 = 250;
const CHANNEL_CAPACITY: usize = 1024;

pub struct PcapCapture {
    units: mpsc::Receiver<Result<CapturedUnit>>,
    stop: Arc<AtomicBool>,
    device: String,
    filter: String,
}

impl PcapCapture {
    /// Start capturing on `interface` (or the default device) with a BPF filter.
    pub fn open(interface: Option<&str>, filter: &str) -> Result<Self> {
        let device = match interface {
            Some(name) => Device::from(name),
            None => Device::lookup()
                .map_err(|e| TrafficError::capture_with_source("looking up capture device", Box::new(e)))?
                .ok_or_else(|| TrafficError::capture("no capture device available"))?,
        };
        let device_name = device.name.clone();

        let mut capture = Capture::from_device(device)
            .and_then(|c| {
                c.promisc(true).immediate_mode(true).snaplen(65_535).timeout(READ_TIMEOUT_MS).open()
            })
            .map_err(|e| {
                TrafficError::capture_with_source(format!("opening {device_name}"), Box::new(e))
            })?;
        capture.filter(filter, true).map_err(|e| {
            TrafficError::capture_with_source(format!("compiling filter '{filter}'"), Box::new(e))
        })?;

        let dlt = capture.get_datalink().0;
        let link = LinkType::from_dlt(dlt).ok_or_else(|| {
            TrafficError::capture(format!("unsupported link type {dlt} on {device_name}"))
        })?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_device = device_name.clone();
        std::thread::Builder::new()
            .name(format!("pcap-{device_name}"))
            .spawn(move || capture_loop(capture, link, tx, thread_stop, thread_device))
            .map_err(|e| TrafficError::capture_with_source("spawning capture thread", Box::new(e)))?;

        info!(device = %device_name, filter, ?link, "libpcap capture started");
        Ok(Self { units: rx, stop, device: device_name, filter: filter.to_string() })
    }
}

fn capture_loop(
    mut capture: Capture<Active>,
    link: LinkType,
    tx: mpsc::Sender<Result<CapturedUnit>>,
    stop: Arc<AtomicBool>,
    device: String,
) {
    while !stop.load(Ordering::Relaxed) {
        let unit = match capture.next_packet() {
            Ok(packet) => Ok(CapturedUnit::Frame {
                link,
                data: packet.data.to_vec(),
                received_at: epoch_seconds(now()),
            }),
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => {
                warn!(device = %device, error = %e, "capture stopped");
                let _ = tx.blocking_send(Err(TrafficError::capture_with_source(
                    format!("capturing on {device}"),
                    Box::new(e),
                )));
                break;
            }
        };

        if tx.blocking_send(unit).is_err() {
            break;
        }
    }
    debug!(device = %device, "capture thread ended");
}

impl Drop for PcapCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[async_trait::async_trait]
impl CaptureSource for PcapCapture {
    async fn next_unit(&mut self) -> Result<Option<CapturedUnit>> {
        self.units.recv().await.transpose()
    }

    fn describe(&self) -> String {
        format!("libpcap on {} ({})", self.device, self.filter)
    }
}
