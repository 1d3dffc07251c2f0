use crate::can::error::CanError;
use crate::can::frame::{Frame, FrameKind};
use crate::zcan::codec;
use crate::zcan::device::ChannelController;
use crate::zcan::types::*;
use crate::zcan::ZCanDriver;

/// Submit a batch of frames in one driver call and return how many the driver accepted.
///
/// Every frame is encoded before anything is submitted, so an invalid frame rejects the
/// whole batch. The accepted count may be lower than `frames.len()`; that is not an
/// error, and resubmitting `&frames[accepted..]` is up to the caller.
pub fn send<D: ZCanDriver>(
    channel: &ChannelController<D>,
    frames: &[Frame],
) -> Result<usize, CanError> {
    send_with_type(channel, frames, TransmitType::Normal)
}

pub fn send_with_type<D: ZCanDriver>(
    channel: &ChannelController<D>,
    frames: &[Frame],
    transmit_type: TransmitType,
) -> Result<usize, CanError> {
    channel.ensure_started().map_err(CanError::Transmit)?;
    let Some(first) = frames.first() else {
        return Ok(0);
    };
    let kind = first.kind;
    if let Some(odd) = frames.iter().find(|f| f.kind != kind) {
        return Err(CanError::InvalidFrame(format!(
            "mixed batch: {:?} frame 0x{:X} in a {:?} batch",
            odd.kind, odd.id, kind
        )));
    }

    let accepted = match kind {
        FrameKind::Classic => {
            let batch = frames
                .iter()
                .map(|f| {
                    Ok(ZCanTransmitData {
                        frame: codec::encode_classic(f)?,
                        transmit_type: transmit_type as u32,
                    })
                })
                .collect::<Result<Vec<_>, CanError>>()?;
            channel.driver().transmit(channel.handle(), &batch)
        }
        FrameKind::Fd => {
            let batch = frames
                .iter()
                .map(|f| {
                    Ok(ZCanTransmitFdData {
                        frame: codec::encode_fd(f)?,
                        transmit_type: transmit_type as u32,
                    })
                })
                .collect::<Result<Vec<_>, CanError>>()?;
            channel.driver().transmit_fd(channel.handle(), &batch)
        }
    };
    let accepted = accepted as usize;

    if accepted > frames.len() {
        return Err(CanError::Transmit(format!(
            "driver reported {} accepted of {} submitted",
            accepted,
            frames.len()
        )));
    }
    if accepted < frames.len() {
        log::debug!(
            "CAN{} accepted {}/{} frames",
            channel.index(),
            accepted,
            frames.len()
        );
    }
    Ok(accepted)
}
