use serde::{Deserialize, Serialize};

use crate::can::error::CanError;
use crate::zcan::device::ChannelController;
use crate::zcan::types::*;
use crate::zcan::ZCanDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Range,
    /// Two-entry id list made of `start` and `end`
    List,
}

impl FilterMode {
    pub fn code(self) -> u32 {
        match self {
            Self::Range => FILTER_MODE_RANGE,
            Self::List => FILTER_MODE_LIST,
        }
    }
}

/// Acceptance filter programmed through the ZCAN filter registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub mode: FilterMode,
    pub start: u32,
    pub end: u32,
}

impl FilterConfig {
    pub fn range(start: u32, end: u32) -> Self {
        Self {
            mode: FilterMode::Range,
            start,
            end,
        }
    }

    /// Pass exactly one arbitration id
    pub fn single(id: u32) -> Self {
        Self::range(id, id)
    }

    pub fn matches(&self, id: u32) -> bool {
        match self.mode {
            FilterMode::Range => self.start <= id && id <= self.end,
            FilterMode::List => id == self.start || id == self.end,
        }
    }

    pub fn validate(&self) -> Result<(), CanError> {
        if self.start > CAN_EFF_MASK || self.end > CAN_EFF_MASK {
            return Err(CanError::FilterConfig(format!(
                "ids 0x{:X}..0x{:X} exceed 29 bits",
                self.start, self.end
            )));
        }
        if self.mode == FilterMode::Range && self.start > self.end {
            return Err(CanError::FilterConfig(format!(
                "range start 0x{:X} is above end 0x{:X}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Program the acceptance filter on a channel: clear, mode, start id, end id, commit.
///
/// Takes effect for frames received after the commit. Apply before starting the channel
/// so no unfiltered frames are queued.
pub fn apply_filter<D: ZCanDriver>(
    channel: &ChannelController<D>,
    config: &FilterConfig,
) -> Result<(), CanError> {
    config.validate()?;
    channel
        .ensure_configurable()
        .map_err(CanError::FilterConfig)?;

    let driver = channel.driver();
    let handle = channel.handle();
    let check = |step: &str, status: u32| {
        if status == STATUS_OK {
            Ok(())
        } else {
            Err(CanError::FilterConfig(format!(
                "CAN{} filter {} failed",
                channel.index(),
                step
            )))
        }
    };
    check("clear", driver.clear_filter(handle))?;
    check("set mode", driver.set_filter_mode(handle, config.mode.code()))?;
    check("set start id", driver.set_filter_start_id(handle, config.start))?;
    check("set end id", driver.set_filter_end_id(handle, config.end))?;
    check("ack", driver.ack_filter(handle))?;

    log::info!(
        "CAN{} filter {:?} 0x{:X}..=0x{:X} applied",
        channel.index(),
        config.mode,
        config.start,
        config.end
    );
    Ok(())
}
