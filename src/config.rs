use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::can::error::CanError;
use crate::can::frame::FrameKind;
use crate::zcan::device::ChannelInitOptions;
use crate::zcan::dll;
use crate::zcan::filter::FilterConfig;
use crate::zcan::receive::ReceivePolicy;
use crate::zcan::types::{FdStandard, CHANNEL_COUNT, DEVICE_USBCANFD_200U};

/// Settings for bringing up the adapter and its two channels.
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Path to libcontrolcanfd.so; defaults to the copy next to the executable
    pub library_path: Option<PathBuf>,
    pub device_type: u32,
    pub device_index: u32,
    pub nominal_bitrate: u32,
    pub data_bitrate: u32,
    pub fd_standard: FdStandard,
    pub tx_channel: u32,
    pub rx_channel: u32,
    /// Type both channels are initialized as
    pub channel_kind: FrameKind,
    /// Frame type polled and read on the receive channel
    pub rx_kind: FrameKind,
    pub init: ChannelInitOptions,
    pub rx_filter: Option<FilterConfig>,
    pub poll_min_ms: u64,
    pub poll_max_ms: u64,
    /// Set BRS on FD frames built by `CanClient::send`
    pub bitrate_switch: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            device_type: DEVICE_USBCANFD_200U,
            device_index: 0,
            nominal_bitrate: 500_000,
            data_bitrate: 1_000_000,
            fd_standard: FdStandard::Iso,
            tx_channel: 0,
            rx_channel: 1,
            channel_kind: FrameKind::Fd,
            rx_kind: FrameKind::Classic,
            init: ChannelInitOptions::default(),
            rx_filter: Some(FilterConfig::single(0x31C)),
            poll_min_ms: 1,
            poll_max_ms: 10,
            bitrate_switch: false,
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self, CanError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CanError::Config(format!("Failed to read '{}': {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| CanError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(text: &str) -> Result<Self, CanError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| CanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CanError> {
        for (name, channel) in [("tx_channel", self.tx_channel), ("rx_channel", self.rx_channel)] {
            if channel >= CHANNEL_COUNT {
                return Err(CanError::Config(format!(
                    "{} {} is out of range 0..{}",
                    name, channel, CHANNEL_COUNT
                )));
            }
        }
        if self.tx_channel == self.rx_channel {
            return Err(CanError::Config(
                "tx_channel and rx_channel must differ".to_string(),
            ));
        }
        if self.poll_min_ms == 0 || self.poll_min_ms > self.poll_max_ms {
            return Err(CanError::Config(format!(
                "poll interval {}..{} ms is invalid",
                self.poll_min_ms, self.poll_max_ms
            )));
        }
        if let Some(filter) = &self.rx_filter {
            filter
                .validate()
                .map_err(|e| CanError::Config(e.to_string()))?;
        }
        Ok(())
    }

    pub fn library_path(&self) -> PathBuf {
        self.library_path
            .clone()
            .unwrap_or_else(dll::default_library_path)
    }

    pub fn receive_policy(&self, timeout: Option<Duration>) -> ReceivePolicy {
        ReceivePolicy {
            timeout,
            min_interval: Duration::from_millis(self.poll_min_ms),
            max_interval: Duration::from_millis(self.poll_max_ms),
        }
    }
}
