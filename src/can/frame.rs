use std::fmt;

use serde::{Deserialize, Serialize};

use crate::can::error::CanError;
use crate::zcan::types::{CANFD_MAX_DLEN, CAN_EFF_MASK, CAN_MAX_DLEN, CAN_SFF_MASK};

/// Payload lengths a CAN-FD frame may carry
pub const FD_LENGTHS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    #[default]
    Classic,
    Fd,
}

impl FrameKind {
    pub fn max_len(self) -> usize {
        match self {
            Self::Classic => CAN_MAX_DLEN,
            Self::Fd => CANFD_MAX_DLEN,
        }
    }
}

pub fn fd_len_valid(len: usize) -> bool {
    FD_LENGTHS.contains(&len)
}

/// Smallest FD payload length that fits `len` bytes
pub fn fd_round_up(len: usize) -> Option<usize> {
    FD_LENGTHS.iter().copied().find(|&l| l >= len)
}

/// Portable CAN / CAN-FD frame.
///
/// `data` is sized for the largest FD payload; bytes past `len` are always zero
/// and classic frames only ever use the first 8.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub id: u32,
    pub extended: bool,
    pub remote: bool,
    pub error: bool,
    pub kind: FrameKind,
    /// FD bit-rate switch, classic frames must leave it clear
    pub brs: bool,
    /// FD error state indicator, classic frames must leave it clear
    pub esi: bool,
    pub len: usize,
    pub data: [u8; CANFD_MAX_DLEN],
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            id: 0,
            extended: false,
            remote: false,
            error: false,
            kind: FrameKind::Classic,
            brs: false,
            esi: false,
            len: 0,
            data: [0u8; CANFD_MAX_DLEN],
        }
    }
}

impl Frame {
    /// Classic data frame. The id width picks standard or extended format.
    pub fn classic(id: u32, payload: &[u8]) -> Result<Self, CanError> {
        let mut frame = Self {
            id,
            extended: id > CAN_SFF_MASK,
            kind: FrameKind::Classic,
            ..Default::default()
        };
        frame.set_payload(payload)?;
        frame.validate()?;
        Ok(frame)
    }

    /// FD data frame. The payload is zero-padded up to the next valid FD length.
    pub fn fd(id: u32, payload: &[u8], brs: bool) -> Result<Self, CanError> {
        let mut frame = Self {
            id,
            extended: id > CAN_SFF_MASK,
            kind: FrameKind::Fd,
            brs,
            ..Default::default()
        };
        frame.set_payload(payload)?;
        frame.len = fd_round_up(payload.len()).ok_or_else(|| {
            CanError::InvalidFrame(format!("FD payload of {} bytes", payload.len()))
        })?;
        frame.validate()?;
        Ok(frame)
    }

    /// Classic remote request for `len` bytes
    pub fn remote(id: u32, len: usize) -> Result<Self, CanError> {
        let frame = Self {
            id,
            extended: id > CAN_SFF_MASK,
            remote: true,
            len,
            ..Default::default()
        };
        frame.validate()?;
        Ok(frame)
    }

    fn set_payload(&mut self, payload: &[u8]) -> Result<(), CanError> {
        if payload.len() > self.kind.max_len() {
            return Err(CanError::InvalidFrame(format!(
                "{} bytes exceed {:?} maximum of {}",
                payload.len(),
                self.kind,
                self.kind.max_len()
            )));
        }
        self.data = [0u8; CANFD_MAX_DLEN];
        self.data[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        Ok(())
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(CANFD_MAX_DLEN)]
    }

    /// Check the length, id width, flag and padding invariants
    pub fn validate(&self) -> Result<(), CanError> {
        match self.kind {
            FrameKind::Classic => {
                if self.len > CAN_MAX_DLEN {
                    return Err(CanError::InvalidFrame(format!(
                        "classic length {} exceeds {}",
                        self.len, CAN_MAX_DLEN
                    )));
                }
                if self.brs || self.esi {
                    return Err(CanError::InvalidFrame(
                        "BRS/ESI set on a classic frame".to_string(),
                    ));
                }
            }
            FrameKind::Fd => {
                if self.remote {
                    return Err(CanError::InvalidFrame(
                        "remote request on an FD frame".to_string(),
                    ));
                }
                if !fd_len_valid(self.len) {
                    return Err(CanError::InvalidFrame(format!(
                        "FD length {} is not a valid FD length",
                        self.len
                    )));
                }
            }
        }

        let max_id = if self.extended {
            CAN_EFF_MASK
        } else {
            CAN_SFF_MASK
        };
        if self.id > max_id {
            return Err(CanError::InvalidFrame(format!(
                "id 0x{:X} exceeds {} bit width",
                self.id,
                if self.extended { 29 } else { 11 }
            )));
        }

        if self.data[self.len..].iter().any(|&b| b != 0) {
            return Err(CanError::InvalidFrame(
                "non-zero data past frame length".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &format_args!("0x{:X}", self.id))
            .field("extended", &self.extended)
            .field("remote", &self.remote)
            .field("error", &self.error)
            .field("kind", &self.kind)
            .field("brs", &self.brs)
            .field("esi", &self.esi)
            .field("len", &self.len)
            .field("data", &format_args!("[{}]", hex_string(self.payload())))
            .finish()
    }
}

/// Received frame with the adapter's timestamp (device units, not wall clock)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedFrame {
    pub frame: Frame,
    pub timestamp: u64,
}

pub(crate) fn hex_string(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_constructor() {
        let frame = Frame::classic(0x31C, &[0x02, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(frame.kind, FrameKind::Classic);
        assert!(!frame.extended);
        assert_eq!(frame.len, 5);
        assert_eq!(frame.payload(), &[0x02, 0, 0, 0, 0]);
        assert!(frame.data[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_classic_picks_extended_for_wide_id() {
        let frame = Frame::classic(0x18DA_F110, &[1]).unwrap();
        assert!(frame.extended);
    }

    #[test]
    fn test_classic_rejects_nine_bytes() {
        let err = Frame::classic(0x100, &[0u8; 9]).unwrap_err();
        assert!(matches!(err, CanError::InvalidFrame(_)));
    }

    #[test]
    fn test_id_width_checks() {
        assert!(Frame::classic(0x2000_0000, &[]).is_err());

        let mut frame = Frame::classic(0x7FF, &[]).unwrap();
        frame.id = 0x800;
        assert!(frame.validate().is_err());
        frame.extended = true;
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_fd_constructor_pads_to_fd_length() {
        let frame = Frame::fd(0x123, &[0xAA; 10], true).unwrap();
        assert_eq!(frame.kind, FrameKind::Fd);
        assert_eq!(frame.len, 12);
        assert!(frame.brs);
        assert_eq!(&frame.payload()[10..], &[0, 0]);
    }

    #[test]
    fn test_fd_rejects_oversize_payload() {
        assert!(Frame::fd(0x123, &[0u8; 65], false).is_err());
    }

    #[test]
    fn test_fd_length_set() {
        for len in 0..=64 {
            let expected = len <= 8 || [12, 16, 20, 24, 32, 48, 64].contains(&len);
            assert_eq!(fd_len_valid(len), expected, "len {}", len);
        }
        assert_eq!(fd_round_up(9), Some(12));
        assert_eq!(fd_round_up(33), Some(48));
        assert_eq!(fd_round_up(64), Some(64));
        assert_eq!(fd_round_up(65), None);
    }

    #[test]
    fn test_fd_invalid_length_rejected() {
        let mut frame = Frame::fd(0x10, &[], false).unwrap();
        frame.len = 10;
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_classic_rejects_fd_flags() {
        let mut frame = Frame::classic(0x10, &[1]).unwrap();
        frame.brs = true;
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_fd_rejects_remote() {
        let mut frame = Frame::fd(0x10, &[1, 2], false).unwrap();
        frame.remote = true;
        assert!(matches!(frame.validate(), Err(CanError::InvalidFrame(_))));
    }

    #[test]
    fn test_dirty_padding_rejected() {
        let mut frame = Frame::classic(0x10, &[1, 2]).unwrap();
        frame.data[7] = 0xFF;
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_remote_frame() {
        let frame = Frame::remote(0x321, 4).unwrap();
        assert!(frame.remote);
        assert_eq!(frame.len, 4);
        assert!(frame.payload().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_debug_hex_payload() {
        let frame = Frame::classic(0x31C, &[0x02, 0xAB]).unwrap();
        let dbg = format!("{:?}", frame);
        assert!(dbg.contains("0x31C"));
        assert!(dbg.contains("[02 AB]"));
    }
}
