//! Conversion between the portable [`Frame`] and the driver's bit-packed frame structures.
//!
//! The 32-bit id word carries the identifier in bits 0-28 and the error, remote and
//! extended flags in bits 29, 30 and 31. FD frames add a flags byte with BRS in bit 0
//! and ESI in bit 1. Reserved bits and bytes are written as zero and ignored on decode.

use crate::can::error::CanError;
use crate::can::frame::{fd_len_valid, Frame, FrameKind};
use crate::zcan::types::*;

/// One driver-side frame of either layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFrame {
    Classic(ZCanFrame),
    Fd(ZCanFdFrame),
}

impl WireFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Classic(_) => FrameKind::Classic,
            Self::Fd(_) => FrameKind::Fd,
        }
    }
}

pub fn pack_id(id: u32, error: bool, remote: bool, extended: bool) -> u32 {
    let mut word = id & CAN_EFF_MASK;
    if error {
        word |= CAN_ERR_FLAG;
    }
    if remote {
        word |= CAN_RTR_FLAG;
    }
    if extended {
        word |= CAN_EFF_FLAG;
    }
    word
}

/// Split an id word into (id, error, remote, extended)
pub fn unpack_id(word: u32) -> (u32, bool, bool, bool) {
    (
        word & CAN_EFF_MASK,
        word & CAN_ERR_FLAG != 0,
        word & CAN_RTR_FLAG != 0,
        word & CAN_EFF_FLAG != 0,
    )
}

pub fn pack_fd_flags(brs: bool, esi: bool) -> u8 {
    let mut flags = 0;
    if brs {
        flags |= CANFD_BRS;
    }
    if esi {
        flags |= CANFD_ESI;
    }
    flags
}

pub fn encode(frame: &Frame) -> Result<WireFrame, CanError> {
    frame.validate()?;
    let can_id = pack_id(frame.id, frame.error, frame.remote, frame.extended);
    Ok(match frame.kind {
        FrameKind::Classic => {
            let mut wire = ZCanFrame {
                can_id,
                can_dlc: frame.len as u8,
                ..Default::default()
            };
            wire.data.copy_from_slice(&frame.data[..CAN_MAX_DLEN]);
            WireFrame::Classic(wire)
        }
        FrameKind::Fd => WireFrame::Fd(ZCanFdFrame {
            can_id,
            len: frame.len as u8,
            flags: pack_fd_flags(frame.brs, frame.esi),
            data: frame.data,
            ..Default::default()
        }),
    })
}

pub fn encode_classic(frame: &Frame) -> Result<ZCanFrame, CanError> {
    match encode(frame)? {
        WireFrame::Classic(wire) => Ok(wire),
        WireFrame::Fd(_) => Err(CanError::InvalidFrame(
            "expected a classic frame, got FD".to_string(),
        )),
    }
}

pub fn encode_fd(frame: &Frame) -> Result<ZCanFdFrame, CanError> {
    match encode(frame)? {
        WireFrame::Fd(wire) => Ok(wire),
        WireFrame::Classic(_) => Err(CanError::InvalidFrame(
            "expected an FD frame, got classic".to_string(),
        )),
    }
}

pub fn decode(wire: &WireFrame) -> Result<Frame, CanError> {
    match wire {
        WireFrame::Classic(w) => decode_classic(w),
        WireFrame::Fd(w) => decode_fd(w),
    }
}

pub fn decode_classic(wire: &ZCanFrame) -> Result<Frame, CanError> {
    let len = wire.can_dlc as usize;
    if len > CAN_MAX_DLEN {
        return Err(CanError::InvalidFrame(format!("received dlc {}", len)));
    }
    let (id, error, remote, extended) = unpack_id(wire.can_id);
    let mut frame = Frame {
        id,
        extended,
        remote,
        error,
        kind: FrameKind::Classic,
        len,
        ..Default::default()
    };
    frame.data[..len].copy_from_slice(&wire.data[..len]);
    Ok(frame)
}

pub fn decode_fd(wire: &ZCanFdFrame) -> Result<Frame, CanError> {
    let len = wire.len as usize;
    if !fd_len_valid(len) {
        return Err(CanError::InvalidFrame(format!("received FD len {}", len)));
    }
    let (id, error, remote, extended) = unpack_id(wire.can_id);
    let mut frame = Frame {
        id,
        extended,
        remote,
        error,
        kind: FrameKind::Fd,
        brs: wire.flags & CANFD_BRS != 0,
        esi: wire.flags & CANFD_ESI != 0,
        len,
        ..Default::default()
    };
    frame.data[..len].copy_from_slice(&wire.data[..len]);
    Ok(frame)
}

/// Encode straight to the little-endian byte image the driver works with
pub fn encode_bytes(frame: &Frame) -> Result<Vec<u8>, CanError> {
    Ok(match encode(frame)? {
        WireFrame::Classic(w) => w.to_bytes().to_vec(),
        WireFrame::Fd(w) => w.to_bytes().to_vec(),
    })
}

pub fn decode_bytes(raw: &[u8], kind: FrameKind) -> Result<Frame, CanError> {
    let short = || {
        CanError::InvalidFrame(format!(
            "{} bytes is too short for a {:?} frame",
            raw.len(),
            kind
        ))
    };
    match kind {
        FrameKind::Classic => decode_classic(&ZCanFrame::from_bytes(raw).ok_or_else(short)?),
        FrameKind::Fd => decode_fd(&ZCanFdFrame::from_bytes(raw).ok_or_else(short)?),
    }
}
