use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::can::error::{BitPhase, CanError};
use crate::can::frame::FrameKind;
use crate::zcan::types::*;
use crate::zcan::ZCanDriver;

/// Represents an opened adapter (ZCAN_OpenDevice handle).
///
/// Bit timing and the FD standard must be configured for every channel before any
/// [`ChannelController`] is initialized on it.
pub struct DeviceSession<D: ZCanDriver> {
    driver: Arc<D>,
    handle: DeviceHandle,
    device_type: u32,
    index: u32,
    bit_timing_set: bool,
    fd_mode_set: bool,
    /// Shared with every channel; cleared when the device is closed
    open: Arc<AtomicBool>,
}

impl<D: ZCanDriver> DeviceSession<D> {
    pub fn open(driver: Arc<D>, device_type: u32, index: u32) -> Result<Self, CanError> {
        let handle = driver.open_device(device_type, index);
        if !handle.is_valid() {
            return Err(CanError::DeviceUnavailable { device_type, index });
        }
        log::info!("Opened CAN device type {} index {}", device_type, index);
        Ok(Self {
            driver,
            handle,
            device_type,
            index,
            bit_timing_set: false,
            fd_mode_set: false,
            open: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Configure arbitration and data phase bit rates on every channel of the device
    pub fn set_bit_timing(&mut self, nominal_bitrate: u32, data_bitrate: u32) -> Result<(), CanError> {
        for channel in 0..CHANNEL_COUNT {
            if self.driver.set_abit_baud(self.handle, channel, nominal_bitrate) != STATUS_OK {
                return Err(CanError::BaudRateConfig {
                    channel,
                    phase: BitPhase::Arbitration,
                });
            }
            if self.driver.set_dbit_baud(self.handle, channel, data_bitrate) != STATUS_OK {
                return Err(CanError::BaudRateConfig {
                    channel,
                    phase: BitPhase::Data,
                });
            }
            log::info!(
                "Set CAN{} abit {} / dbit {} OK",
                channel,
                nominal_bitrate,
                data_bitrate
            );
        }
        self.bit_timing_set = true;
        Ok(())
    }

    /// Select ISO or non-ISO CAN-FD on every channel of the device
    pub fn set_fd_mode(&mut self, standard: FdStandard) -> Result<(), CanError> {
        for channel in 0..CHANNEL_COUNT {
            if self
                .driver
                .set_canfd_standard(self.handle, channel, standard.code())
                != STATUS_OK
            {
                return Err(CanError::FdModeConfig { channel });
            }
            log::info!("Set CAN{} {:?} FD mode OK", channel, standard);
        }
        self.fd_mode_set = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.bit_timing_set && self.fd_mode_set && self.is_open()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Close the device. Only the first call reaches the driver.
    pub fn close(&mut self) -> Result<(), CanError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let live_channels = Arc::strong_count(&self.open) - 1;
        if live_channels > 0 {
            log::warn!(
                "Closing CAN device with {} channel(s) not yet reset",
                live_channels
            );
        }
        if self.driver.close_device(self.handle) != STATUS_OK {
            return Err(CanError::Shutdown(format!(
                "close device type {} index {} failed",
                self.device_type, self.index
            )));
        }
        log::info!("Closed CAN device type {} index {}", self.device_type, self.index);
        Ok(())
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }
}

impl<D: ZCanDriver> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("{}", e);
        }
    }
}

/// Init block fields for ZCAN_InitCAN. Classic channels use the acceptance code/mask,
/// filter, timing0/1 and mode; FD channels use the acceptance code/mask, the two timing
/// words, the prescaler, filter and mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelInitOptions {
    pub acc_code: u32,
    pub acc_mask: u32,
    pub filter: u8,
    pub mode: u8,
    pub timing0: u8,
    pub timing1: u8,
    pub abit_timing: u32,
    pub dbit_timing: u32,
    pub brp: u32,
}

impl ChannelInitOptions {
    pub fn to_init_config(&self, kind: FrameKind) -> ZCanChannelInitConfig {
        match kind {
            FrameKind::Classic => ZCanChannelInitConfig::classic(ZCanChannelCanInitConfig {
                acc_code: self.acc_code,
                acc_mask: self.acc_mask,
                reserved: 0,
                filter: self.filter,
                timing0: self.timing0,
                timing1: self.timing1,
                mode: self.mode,
            }),
            FrameKind::Fd => ZCanChannelInitConfig::fd(ZCanChannelCanFdInitConfig {
                acc_code: self.acc_code,
                acc_mask: self.acc_mask,
                abit_timing: self.abit_timing,
                dbit_timing: self.dbit_timing,
                brp: self.brp,
                filter: self.filter,
                mode: self.mode,
                pad: 0,
                reserved: 0,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Initialized,
    Started,
    Reset,
}

/// Represents an initialized channel (ZCAN_InitCAN handle).
///
/// Lifecycle is Initialized -> Started -> Reset. The controller does not restrict a
/// channel to transmit or receive.
pub struct ChannelController<D: ZCanDriver> {
    driver: Arc<D>,
    handle: ChannelHandle,
    index: u32,
    kind: FrameKind,
    state: ChannelState,
    device_open: Arc<AtomicBool>,
}

impl<D: ZCanDriver> ChannelController<D> {
    pub fn init(
        session: &DeviceSession<D>,
        index: u32,
        kind: FrameKind,
        options: &ChannelInitOptions,
    ) -> Result<Self, CanError> {
        if !session.is_ready() {
            return Err(CanError::ChannelInit {
                channel: index,
                reason: "device bit timing and FD mode not configured".to_string(),
            });
        }
        if index >= CHANNEL_COUNT {
            return Err(CanError::ChannelInit {
                channel: index,
                reason: format!("channel index out of range 0..{}", CHANNEL_COUNT),
            });
        }

        let config = options.to_init_config(kind);
        let handle = session.driver.init_can(session.handle, index, &config);
        if !handle.is_valid() {
            return Err(CanError::ChannelInit {
                channel: index,
                reason: "driver returned an invalid channel handle".to_string(),
            });
        }
        log::info!("Init CAN{} as {:?} OK", index, kind);
        Ok(Self {
            driver: session.driver.clone(),
            handle,
            index,
            kind,
            state: ChannelState::Initialized,
            device_open: session.open.clone(),
        })
    }

    pub fn start(&mut self) -> Result<(), CanError> {
        if self.state != ChannelState::Initialized {
            return Err(CanError::ChannelStart {
                channel: self.index,
                reason: format!("channel is {:?}", self.state),
            });
        }
        self.ensure_device_open().map_err(|reason| CanError::ChannelStart {
            channel: self.index,
            reason,
        })?;
        if self.driver.start_can(self.handle) != STATUS_OK {
            return Err(CanError::ChannelStart {
                channel: self.index,
                reason: "driver reported failure".to_string(),
            });
        }
        self.state = ChannelState::Started;
        log::info!("Start CAN{} ({:?}) OK", self.index, self.kind);
        Ok(())
    }

    /// Reset the channel. The controller ends up Reset even if the driver call fails.
    pub fn reset(&mut self) -> Result<(), CanError> {
        if self.state == ChannelState::Reset {
            return Ok(());
        }
        self.state = ChannelState::Reset;
        if !self.device_open.load(Ordering::Acquire) {
            return Err(CanError::Shutdown(format!(
                "CAN{} reset after device close",
                self.index
            )));
        }
        if self.driver.reset_can(self.handle) != STATUS_OK {
            return Err(CanError::Shutdown(format!("reset CAN{} failed", self.index)));
        }
        log::info!("Reset CAN{} OK", self.index);
        Ok(())
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle
    }

    pub(crate) fn driver(&self) -> &D {
        &self.driver
    }

    fn ensure_device_open(&self) -> Result<(), String> {
        if self.device_open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err("device is closed".to_string())
        }
    }

    /// Check the handle is usable for I/O: Started, and its device still open
    pub(crate) fn ensure_started(&self) -> Result<(), String> {
        if self.state != ChannelState::Started {
            return Err(format!("CAN{} is {:?}, not Started", self.index, self.state));
        }
        self.ensure_device_open()
    }

    /// Check the handle accepts configuration: Initialized or Started, and device open
    pub(crate) fn ensure_configurable(&self) -> Result<(), String> {
        if self.state == ChannelState::Reset {
            return Err(format!("CAN{} is Reset", self.index));
        }
        self.ensure_device_open()
    }
}

impl<D: ZCanDriver> Drop for ChannelController<D> {
    fn drop(&mut self) {
        if self.state == ChannelState::Reset {
            return;
        }
        if let Err(e) = self.reset() {
            log::error!("{}", e);
        }
    }
}
