use std::fmt;

use serde::{Deserialize, Serialize};

// Status codes returned by every ZCAN_* configuration call
pub const STATUS_ERR: u32 = 0;
pub const STATUS_OK: u32 = 1;

// Device types
pub const DEVICE_USBCANFD_200U: u32 = 41;

// Frame type selectors for ZCAN_GetReceiveNum / ZCAN_InitCAN
pub const TYPE_CAN: u8 = 0;
pub const TYPE_CANFD: u8 = 1;

/// Number of CAN channels on the adapter
pub const CHANNEL_COUNT: u32 = 2;

/// Wait argument for ZCAN_Receive that blocks until the requested count arrives
pub const WAIT_FOREVER: i32 = -1;

// Flags packed into the upper bits of the 32-bit can_id word
pub const CAN_EFF_FLAG: u32 = 1 << 31;
pub const CAN_RTR_FLAG: u32 = 1 << 30;
pub const CAN_ERR_FLAG: u32 = 1 << 29;
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;

// Flags packed into the FD flags byte
pub const CANFD_BRS: u8 = 0x01;
pub const CANFD_ESI: u8 = 0x02;

pub const CAN_MAX_DLEN: usize = 8;
pub const CANFD_MAX_DLEN: usize = 64;

// Filter modes for ZCAN_SetFilterMode
pub const FILTER_MODE_RANGE: u32 = 0;
pub const FILTER_MODE_LIST: u32 = 1;

/// Handle returned by ZCAN_OpenDevice. Zero is the invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

impl DeviceHandle {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Handle returned by ZCAN_InitCAN. Zero is the invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub usize);

impl ChannelHandle {
    pub const INVALID: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// CAN-FD protocol variant selected with ZCAN_SetCANFDStandard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdStandard {
    #[default]
    Iso,
    NonIso,
}

impl FdStandard {
    pub fn code(self) -> u32 {
        match self {
            Self::Iso => 0,
            Self::NonIso => 1,
        }
    }
}

/// Per-frame transmit type carried in the transmit wrappers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum TransmitType {
    #[default]
    Normal = 0,
    SingleShot = 1,
    SelfReceive = 2,
    SingleShotSelfReceive = 3,
}

/// Classic CAN frame as laid out by the driver (16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZCanFrame {
    /// id (bits 0-28) | err (29) | rtr (30) | eff (31)
    pub can_id: u32,
    pub can_dlc: u8,
    pub pad: u8,
    pub res0: u8,
    pub res1: u8,
    pub data: [u8; CAN_MAX_DLEN],
}

impl ZCanFrame {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.can_id.to_le_bytes());
        out[4] = self.can_dlc;
        out[5] = self.pad;
        out[6] = self.res0;
        out[7] = self.res1;
        out[8..16].copy_from_slice(&self.data);
        out
    }

    /// Parse a byte image. Returns None if the slice is shorter than a frame.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() < Self::SIZE {
            return None;
        }
        let mut data = [0u8; CAN_MAX_DLEN];
        data.copy_from_slice(&raw[8..16]);
        Some(Self {
            can_id: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            can_dlc: raw[4],
            pad: raw[5],
            res0: raw[6],
            res1: raw[7],
            data,
        })
    }
}

/// CAN-FD frame as laid out by the driver (72 bytes)
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ZCanFdFrame {
    /// id (bits 0-28) | err (29) | rtr (30) | eff (31)
    pub can_id: u32,
    pub len: u8,
    /// brs (bit 0) | esi (bit 1), upper six bits reserved
    pub flags: u8,
    pub res0: u8,
    pub res1: u8,
    pub data: [u8; CANFD_MAX_DLEN],
}

impl Default for ZCanFdFrame {
    fn default() -> Self {
        Self {
            can_id: 0,
            len: 0,
            flags: 0,
            res0: 0,
            res1: 0,
            data: [0u8; CANFD_MAX_DLEN],
        }
    }
}

impl ZCanFdFrame {
    pub const SIZE: usize = 72;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.can_id.to_le_bytes());
        out[4] = self.len;
        out[5] = self.flags;
        out[6] = self.res0;
        out[7] = self.res1;
        out[8..72].copy_from_slice(&self.data);
        out
    }

    /// Parse a byte image. Returns None if the slice is shorter than a frame.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() < Self::SIZE {
            return None;
        }
        let mut data = [0u8; CANFD_MAX_DLEN];
        data.copy_from_slice(&raw[8..72]);
        Some(Self {
            can_id: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            len: raw[4],
            flags: raw[5],
            res0: raw[6],
            res1: raw[7],
            data,
        })
    }
}

impl fmt::Debug for ZCanFdFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = (self.len as usize).min(CANFD_MAX_DLEN);
        f.debug_struct("ZCanFdFrame")
            .field("can_id", &format_args!("0x{:08X}", self.can_id))
            .field("len", &self.len)
            .field("flags", &self.flags)
            .field(
                "data",
                &format_args!(
                    "[{}]",
                    self.data[..shown]
                        .iter()
                        .map(|b| format!("{:02X}", b))
                        .collect::<Vec<_>>()
                        .join(" ")
                ),
            )
            .finish()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZCanTransmitData {
    pub frame: ZCanFrame,
    pub transmit_type: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZCanReceiveData {
    pub frame: ZCanFrame,
    pub timestamp: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZCanTransmitFdData {
    pub frame: ZCanFdFrame,
    pub transmit_type: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZCanReceiveFdData {
    pub frame: ZCanFdFrame,
    pub timestamp: u64,
}

/// Classic channel init block
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZCanChannelCanInitConfig {
    pub acc_code: u32,
    pub acc_mask: u32,
    pub reserved: u32,
    pub filter: u8,
    pub timing0: u8,
    pub timing1: u8,
    pub mode: u8,
}

/// CAN-FD channel init block
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZCanChannelCanFdInitConfig {
    pub acc_code: u32,
    pub acc_mask: u32,
    pub abit_timing: u32,
    pub dbit_timing: u32,
    pub brp: u32,
    pub filter: u8,
    pub mode: u8,
    pub pad: u16,
    pub reserved: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union ZCanChannelInitUnion {
    pub can: ZCanChannelCanInitConfig,
    pub canfd: ZCanChannelCanFdInitConfig,
}

/// ZCAN_CHANNEL_INIT_CONFIG: a can_type tag followed by the matching init block
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ZCanChannelInitConfig {
    pub can_type: u32,
    pub config: ZCanChannelInitUnion,
}

impl ZCanChannelInitConfig {
    pub fn classic(can: ZCanChannelCanInitConfig) -> Self {
        // Zero the whole union first so the bytes past the classic block are defined
        let mut config = ZCanChannelInitUnion {
            canfd: ZCanChannelCanFdInitConfig::default(),
        };
        config.can = can;
        Self {
            can_type: TYPE_CAN as u32,
            config,
        }
    }

    pub fn fd(canfd: ZCanChannelCanFdInitConfig) -> Self {
        Self {
            can_type: TYPE_CANFD as u32,
            config: ZCanChannelInitUnion { canfd },
        }
    }

    pub fn as_classic(&self) -> Option<ZCanChannelCanInitConfig> {
        if self.can_type != TYPE_CAN as u32 {
            return None;
        }
        // SAFETY: can_type tags the active member; the classic block is plain integers
        Some(unsafe { self.config.can })
    }

    pub fn as_fd(&self) -> Option<ZCanChannelCanFdInitConfig> {
        if self.can_type != TYPE_CANFD as u32 {
            return None;
        }
        // SAFETY: can_type tags the active member; the FD block is plain integers
        Some(unsafe { self.config.canfd })
    }
}

impl fmt::Debug for ZCanChannelInitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ZCanChannelInitConfig");
        s.field("can_type", &self.can_type);
        if let Some(can) = self.as_classic() {
            s.field("can", &can);
        } else if let Some(canfd) = self.as_fd() {
            s.field("canfd", &canfd);
        }
        s.finish()
    }
}
