use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::can::error::CanError;
use crate::can::frame::{hex_string, Frame, FrameKind, TimestampedFrame};
use crate::config::ClientConfig;
use crate::zcan::device::{ChannelController, DeviceSession};
use crate::zcan::dll::ZCanLib;
use crate::zcan::filter::apply_filter;
use crate::zcan::receive::{self, CancelToken};
use crate::zcan::transmit;
use crate::zcan::types::CAN_MAX_DLEN;
use crate::zcan::ZCanDriver;

/// Trace entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TraceDirection {
    Tx,
    Rx,
    Error,
}

impl std::fmt::Display for TraceDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceDirection::Tx => write!(f, "TX"),
            TraceDirection::Rx => write!(f, "RX"),
            TraceDirection::Error => write!(f, "ERR"),
        }
    }
}

/// Trace entry for bus traffic and runtime errors
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceEntry {
    pub direction: TraceDirection,
    pub arbitration_id: Option<u32>,
    pub data_hex: String,
    pub timestamp: String,
    pub description: String,
}

/// Callback type for tracing CAN traffic
pub type TraceCallback = Box<dyn Fn(TraceEntry) + Send + Sync>;

/// Received message as handed to the application
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Message {
    pub arbitration_id: u32,
    pub extended: bool,
    pub fd: bool,
    pub data: Vec<u8>,
    /// Adapter timestamp of the frame
    pub timestamp: u64,
}

impl From<&TimestampedFrame> for Message {
    fn from(rx: &TimestampedFrame) -> Self {
        Self {
            arbitration_id: rx.frame.id,
            extended: rx.frame.extended,
            fd: rx.frame.kind == FrameKind::Fd,
            data: rx.frame.payload().to_vec(),
            timestamp: rx.timestamp,
        }
    }
}

/// Dual-channel CAN client: transmits on one channel, receives on the other.
///
/// Fields drop in declaration order, so both channels are reset before the device closes.
pub struct CanClient<D: ZCanDriver> {
    tx: Option<ChannelController<D>>,
    rx: Option<ChannelController<D>>,
    session: DeviceSession<D>,
    config: ClientConfig,
    pending: VecDeque<TimestampedFrame>,
    cancel: CancelToken,
    trace: Option<TraceCallback>,
    stopped: bool,
}

impl CanClient<ZCanLib> {
    /// Load the vendor library from the configured path and bring the adapter up
    pub fn open_library(config: ClientConfig) -> Result<Self, CanError> {
        let path = config.library_path();
        let lib = ZCanLib::load(&path.to_string_lossy())?;
        Self::open(Arc::new(lib), config)
    }
}

impl<D: ZCanDriver> CanClient<D> {
    /// Open the device, configure bit timing and FD mode, then bring up the tx channel
    /// and the filtered rx channel. Anything acquired before a failure is released.
    pub fn open(driver: Arc<D>, config: ClientConfig) -> Result<Self, CanError> {
        config.validate()?;

        let mut session = DeviceSession::open(driver, config.device_type, config.device_index)?;
        session.set_bit_timing(config.nominal_bitrate, config.data_bitrate)?;
        session.set_fd_mode(config.fd_standard)?;

        let mut tx = ChannelController::init(
            &session,
            config.tx_channel,
            config.channel_kind,
            &config.init,
        )?;
        tx.start()?;

        let mut rx = ChannelController::init(
            &session,
            config.rx_channel,
            config.channel_kind,
            &config.init,
        )?;
        if let Some(filter) = &config.rx_filter {
            apply_filter(&rx, filter)?;
        }
        rx.start()?;

        log::info!(
            "CAN client ready: tx CAN{} rx CAN{}",
            config.tx_channel,
            config.rx_channel
        );
        Ok(Self {
            tx: Some(tx),
            rx: Some(rx),
            session,
            config,
            pending: VecDeque::new(),
            cancel: CancelToken::new(),
            trace: None,
            stopped: false,
        })
    }

    pub fn set_trace_callback(&mut self, callback: TraceCallback) {
        self.trace = Some(callback);
    }

    /// Token that aborts a blocked [`CanClient::recv`] from another thread. The receive
    /// that reports the cancellation re-arms it.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn trace(&self, direction: TraceDirection, id: Option<u32>, data: &[u8], description: &str) {
        if let Some(ref cb) = self.trace {
            cb(TraceEntry {
                direction,
                arbitration_id: id,
                data_hex: hex_string(data),
                timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
                description: description.to_string(),
            });
        }
    }

    fn report(&self, id: Option<u32>, err: &CanError) {
        log::error!("{}", err);
        self.trace(TraceDirection::Error, id, &[], &err.to_string());
    }

    /// Send one data frame. Up to 8 bytes go out as a classic frame, longer payloads as
    /// an FD frame padded to the next FD length. Returns the number of frames accepted,
    /// or None if the frame could not be built or submitted.
    pub fn send(&mut self, arbitration_id: u32, data: &[u8]) -> Option<usize> {
        let frame = if data.len() <= CAN_MAX_DLEN {
            Frame::classic(arbitration_id, data)
        } else {
            Frame::fd(arbitration_id, data, self.config.bitrate_switch)
        };
        let result = frame.and_then(|f| self.send_frames(&[f]));
        match result {
            Ok(accepted) => Some(accepted),
            Err(e) => {
                self.report(Some(arbitration_id), &e);
                None
            }
        }
    }

    /// Submit a batch on the tx channel. A short count is not an error; resubmitting
    /// `&frames[accepted..]` is up to the caller.
    pub fn send_frames(&mut self, frames: &[Frame]) -> Result<usize, CanError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| CanError::Transmit("client is stopped".to_string()))?;
        let accepted = transmit::send(tx, frames)?;
        for frame in &frames[..accepted] {
            self.trace(
                TraceDirection::Tx,
                Some(frame.id),
                frame.payload(),
                &format!("CAN{} {:?}", tx.index(), frame.kind),
            );
        }
        Ok(accepted)
    }

    /// Next received message, waiting up to `timeout` (`None` waits until a frame
    /// arrives or the cancel token fires). Errors and timeouts both yield None.
    pub fn recv(&mut self, timeout: Option<Duration>) -> Option<Message> {
        if self.pending.is_empty() {
            let batch = {
                let rx = match self.rx.as_ref() {
                    Some(rx) => rx,
                    None => {
                        self.report(None, &CanError::Receive("client is stopped".to_string()));
                        return None;
                    }
                };
                let policy = self.config.receive_policy(timeout);
                receive::receive(rx, self.config.rx_kind, &policy, &self.cancel)
            };
            match batch {
                Ok(frames) => self.pending.extend(frames),
                Err(e) => {
                    self.report(None, &e);
                    return None;
                }
            }
        }

        let next = self.pending.pop_front()?;
        let message = Message::from(&next);
        self.trace(
            TraceDirection::Rx,
            Some(message.arbitration_id),
            &message.data,
            &format!("t={}", message.timestamp),
        );
        Some(message)
    }

    /// Reset both channels, then close the device. Every step runs even if an earlier
    /// one fails; the failures are reported together. Later calls do nothing.
    pub fn stop(&mut self) -> Result<(), CanError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.cancel.cancel();

        let mut failures = Vec::new();
        for mut channel in [self.tx.take(), self.rx.take()].into_iter().flatten() {
            if let Err(e) = channel.reset() {
                log::error!("{}", e);
                failures.push(e.to_string());
            }
        }
        if let Err(e) = self.session.close() {
            log::error!("{}", e);
            failures.push(e.to_string());
        }
        self.pending.clear();

        if failures.is_empty() {
            log::info!("CAN client stopped");
            Ok(())
        } else {
            Err(CanError::Shutdown(failures.join("; ")))
        }
    }
}

impl<D: ZCanDriver> Drop for CanClient<D> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("{}", e);
        }
    }
}
