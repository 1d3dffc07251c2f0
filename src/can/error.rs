use std::fmt;

/// Error type for every stage of the CAN client: configuration, runtime I/O and shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanError {
    Library(String),
    Config(String),
    DeviceUnavailable { device_type: u32, index: u32 },
    BaudRateConfig { channel: u32, phase: BitPhase },
    FdModeConfig { channel: u32 },
    ChannelInit { channel: u32, reason: String },
    ChannelStart { channel: u32, reason: String },
    InvalidFrame(String),
    FilterConfig(String),
    Transmit(String),
    Receive(String),
    Shutdown(String),
}

/// Which bit-timing phase a baud rate call configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitPhase {
    Arbitration,
    Data,
}

impl fmt::Display for BitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arbitration => write!(f, "arbitration"),
            Self::Data => write!(f, "data"),
        }
    }
}

impl CanError {
    /// True for errors raised while bringing the device up
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Library(_)
                | Self::Config(_)
                | Self::DeviceUnavailable { .. }
                | Self::BaudRateConfig { .. }
                | Self::FdModeConfig { .. }
                | Self::ChannelInit { .. }
                | Self::ChannelStart { .. }
                | Self::FilterConfig(_)
        )
    }
}

impl fmt::Display for CanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library(msg) => write!(f, "Driver library error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::DeviceUnavailable { device_type, index } => write!(
                f,
                "Device unavailable (type {}, index {})",
                device_type, index
            ),
            Self::BaudRateConfig { channel, phase } => {
                write!(f, "Set CAN{} {} bit rate failed", channel, phase)
            }
            Self::FdModeConfig { channel } => {
                write!(f, "Set CAN{} FD standard failed", channel)
            }
            Self::ChannelInit { channel, reason } => {
                write!(f, "Init CAN{} failed: {}", channel, reason)
            }
            Self::ChannelStart { channel, reason } => {
                write!(f, "Start CAN{} failed: {}", channel, reason)
            }
            Self::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            Self::FilterConfig(msg) => write!(f, "Filter configuration failed: {}", msg),
            Self::Transmit(msg) => write!(f, "Transmit failed: {}", msg),
            Self::Receive(msg) => write!(f, "Receive failed: {}", msg),
            Self::Shutdown(msg) => write!(f, "Shutdown error: {}", msg),
        }
    }
}

impl std::error::Error for CanError {}
