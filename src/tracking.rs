//! Streaming pipeline: a poll thread drives BX requests and fans each
//! sample out to a consumer queue and a log queue; a log thread batches
//! the log queue to a tab-separated position file.

use crate::device::Device;
use crate::transport::Transport;
use crate::types::{FrameSample, MAX_SENSORS};
use crate::TrackerError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Capacity of the consumer-facing sample queue.
pub const CONSUMER_QUEUE_LEN: usize = 4096;

/// Capacity of the queue feeding the log writer.
pub const LOG_QUEUE_LEN: usize = 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const LOG_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative stop flag shared by the pipeline threads.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// State the poll thread publishes for the consumer-side accessors.
struct SessionShared {
    broken: AtomicBool,
    valid_slots: AtomicU32,
    dropped: AtomicU64,
}

/// A running tracking stream.
///
/// [`TrackingSession::start`] puts the device into streaming mode and
/// moves it onto a poll thread; the session hands back decoded samples
/// through [`TrackingSession::recv`] and writes every sample to the
/// position log. [`TrackingSession::stop`] joins the threads and
/// returns the device; dropping the session joins the threads without
/// leaving streaming mode.
pub struct TrackingSession<T: Transport> {
    receiver: Receiver<FrameSample>,
    token: CancelToken,
    poll_thread: Option<JoinHandle<Device<T>>>,
    log_thread: Option<JoinHandle<()>>,
    shared: Arc<SessionShared>,
    sensors: usize,
}

impl<T: Transport + 'static> TrackingSession<T> {
    /// Start streaming on an activated device.
    ///
    /// Fails without touching the device when no sensors are enabled.
    pub fn start(mut device: Device<T>, log_path: impl Into<PathBuf>) -> crate::Result<Self> {
        let sensors = device.enabled_count().min(MAX_SENSORS);
        if sensors == 0 {
            return Err(TrackerError::Lifecycle(
                "no enabled sensors to track".into(),
            ));
        }
        device.start_tracking()?;

        let (consumer_tx, consumer_rx) = bounded(CONSUMER_QUEUE_LEN);
        let (log_tx, log_rx) = bounded(LOG_QUEUE_LEN);
        let token = CancelToken::new();
        let shared = Arc::new(SessionShared {
            broken: AtomicBool::new(false),
            valid_slots: AtomicU32::new(0),
            dropped: AtomicU64::new(0),
        });

        let log_token = token.clone();
        let path = log_path.into();
        let log_thread = thread::Builder::new()
            .name("emtrack-log".into())
            .spawn(move || log_writer_loop(log_rx, &path, log_token))?;

        let poll_token = token.clone();
        let poll_shared = Arc::clone(&shared);
        let poll_thread = thread::Builder::new()
            .name("emtrack-poll".into())
            .spawn(move || poll_loop(device, consumer_tx, log_tx, poll_token, poll_shared))?;

        Ok(TrackingSession {
            receiver: consumer_rx,
            token,
            poll_thread: Some(poll_thread),
            log_thread: Some(log_thread),
            shared,
            sensors,
        })
    }
}

impl<T: Transport> TrackingSession<T> {
    /// Block until the next sample arrives.
    pub fn recv(&self) -> crate::Result<FrameSample> {
        self.receiver
            .recv()
            .map_err(|_| TrackerError::StreamStopped)
    }

    /// Block for the next sample, up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> crate::Result<FrameSample> {
        self.receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TrackerError::Timeout,
            RecvTimeoutError::Disconnected => TrackerError::StreamStopped,
        })
    }

    /// Take a sample if one is already queued.
    pub fn try_recv(&self) -> Option<FrameSample> {
        self.receiver.try_recv().ok()
    }

    /// Whether the poll thread is still running.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
            && self
                .poll_thread
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Sensor slots carried by this session's samples.
    pub fn sensor_count(&self) -> usize {
        self.sensors
    }

    /// Per-slot validity from the most recent poll.
    pub fn sensor_validity(&self) -> [bool; MAX_SENSORS] {
        let bits = self.shared.valid_slots.load(Ordering::Relaxed);
        std::array::from_fn(|slot| bits & (1 << slot) != 0)
    }

    /// Sticky flag: set once any sensor reported itself broken, and
    /// never cleared for the life of the session.
    pub fn sensor_broken(&self) -> bool {
        self.shared.broken.load(Ordering::Relaxed)
    }

    /// Samples rejected on a full pipeline queue since the session started.
    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop streaming: join both threads, take the device back, and
    /// send TSTOP. Safe against a poll thread that already died.
    pub fn stop(mut self) -> crate::Result<Device<T>> {
        let mut device = self.shutdown().ok_or(TrackerError::StreamStopped)?;
        device.stop_tracking()?;
        Ok(device)
    }

    /// Cancel and join both threads. Idempotent; returns the device the
    /// first time the poll thread is collected.
    fn shutdown(&mut self) -> Option<Device<T>> {
        self.token.cancel();
        let device = self
            .poll_thread
            .take()
            .and_then(|handle| handle.join().ok());
        if let Some(handle) = self.log_thread.take() {
            if handle.join().is_err() {
                log::warn!("position log thread panicked");
            }
        }
        device
    }
}

impl<T: Transport> Drop for TrackingSession<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Poll transforms until cancelled, publishing each sample to both
/// queues. Poll failures are treated as transient; the device decides
/// nothing here, the consumer sees gaps instead of errors.
fn poll_loop<T: Transport>(
    mut device: Device<T>,
    consumer: Sender<FrameSample>,
    logger: Sender<FrameSample>,
    token: CancelToken,
    shared: Arc<SessionShared>,
) -> Device<T> {
    while !token.is_cancelled() {
        match device.transforms(false) {
            Ok(_) => {
                let sample = device.sample();
                let mut bits = 0u32;
                for (slot, valid) in sample.valid.iter().enumerate() {
                    if *valid {
                        bits |= 1 << slot;
                    }
                }
                shared.valid_slots.store(bits, Ordering::Relaxed);
                if device.any_sensor_broken() {
                    shared.broken.store(true, Ordering::Relaxed);
                }
                push_sample(&consumer, sample, "consumer", &shared.dropped);
                push_sample(&logger, sample, "log", &shared.dropped);
            }
            Err(err) => log::warn!("tracking poll failed: {}", err),
        }
        thread::sleep(POLL_INTERVAL);
    }
    device
}

/// Offer a sample without blocking. When the queue is full the newest
/// sample is the one rejected; queued samples are never displaced.
/// Every rejection is counted and trace-logged.
fn push_sample(queue: &Sender<FrameSample>, sample: FrameSample, what: &str, rejected: &AtomicU64) {
    match queue.try_send(sample) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            rejected.fetch_add(1, Ordering::Relaxed);
            log::trace!("{} queue full, dropping frame", what);
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Drain the log queue in batches until cancelled, then flush whatever
/// is left. One final drain runs after the cancel flag is seen so no
/// queued sample is lost.
fn log_writer_loop(samples: Receiver<FrameSample>, path: &Path, token: CancelToken) {
    let mut started = false;
    let mut pending: Vec<FrameSample> = Vec::new();
    loop {
        let stop = token.is_cancelled();
        pending.extend(samples.try_iter());
        if !pending.is_empty() {
            if let Err(err) = append_batch(path, &mut started, &pending) {
                log::warn!("position log write failed: {}", err);
            }
            pending.clear();
        }
        if stop {
            return;
        }
        match samples.recv_timeout(LOG_INTERVAL) {
            Ok(sample) => pending.push(sample),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn append_batch(path: &Path, started: &mut bool, batch: &[FrameSample]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if !*started {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        writeln!(file, "Starting Time:{}", millis)?;
        *started = true;
    }
    for sample in batch {
        write!(file, "{}", sample.frame)?;
        for position in &sample.positions {
            write!(
                file,
                "\t{:.3}\t{:.3}\t{:.3}",
                position[0], position[1], position[2]
            )?;
        }
        writeln!(file)?;
    }
    Ok(())
}
