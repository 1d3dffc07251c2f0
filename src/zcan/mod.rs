pub mod codec;
pub mod device;
pub mod dll;
pub mod filter;
#[cfg(test)]
pub mod mock;
pub mod receive;
pub mod transmit;
pub mod types;

use std::ffi::c_void;

use types::*;

/// Trait abstracting the ZCAN call contract, implemented by the loaded library and the test mock.
///
/// Status-returning calls yield [`STATUS_OK`] on success. Handle-returning calls yield
/// the zero sentinel on failure.
pub trait ZCanDriver {
    fn open_device(&self, device_type: u32, index: u32) -> DeviceHandle;
    fn close_device(&self, device: DeviceHandle) -> u32;
    fn set_abit_baud(&self, device: DeviceHandle, channel: u32, baud: u32) -> u32;
    fn set_dbit_baud(&self, device: DeviceHandle, channel: u32, baud: u32) -> u32;
    fn set_canfd_standard(&self, device: DeviceHandle, channel: u32, standard: u32) -> u32;
    fn init_can(
        &self,
        device: DeviceHandle,
        channel: u32,
        config: &ZCanChannelInitConfig,
    ) -> ChannelHandle;
    fn start_can(&self, channel: ChannelHandle) -> u32;
    fn reset_can(&self, channel: ChannelHandle) -> u32;
    /// Returns the number of frames the driver accepted
    fn transmit(&self, channel: ChannelHandle, frames: &[ZCanTransmitData]) -> u32;
    fn transmit_fd(&self, channel: ChannelHandle, frames: &[ZCanTransmitFdData]) -> u32;
    fn get_receive_num(&self, channel: ChannelHandle, frame_type: u8) -> u32;
    /// Fills at most `buf.len()` entries and returns how many were written
    fn receive(&self, channel: ChannelHandle, buf: &mut [ZCanReceiveData], wait_ms: i32) -> u32;
    fn receive_fd(
        &self,
        channel: ChannelHandle,
        buf: &mut [ZCanReceiveFdData],
        wait_ms: i32,
    ) -> u32;
    fn clear_filter(&self, channel: ChannelHandle) -> u32;
    fn set_filter_mode(&self, channel: ChannelHandle, mode: u32) -> u32;
    fn set_filter_start_id(&self, channel: ChannelHandle, id: u32) -> u32;
    fn set_filter_end_id(&self, channel: ChannelHandle, id: u32) -> u32;
    fn ack_filter(&self, channel: ChannelHandle) -> u32;
}

fn raw(handle: usize) -> *mut c_void {
    handle as *mut c_void
}

/// Implement ZCanDriver for the dynamically loaded library
impl ZCanDriver for dll::ZCanLib {
    fn open_device(&self, device_type: u32, index: u32) -> DeviceHandle {
        let handle = unsafe { (self.open_device)(device_type, index, 0) };
        DeviceHandle(handle as usize)
    }

    fn close_device(&self, device: DeviceHandle) -> u32 {
        unsafe { (self.close_device)(raw(device.0)) }
    }

    fn set_abit_baud(&self, device: DeviceHandle, channel: u32, baud: u32) -> u32 {
        unsafe { (self.set_abit_baud)(raw(device.0), channel, baud) }
    }

    fn set_dbit_baud(&self, device: DeviceHandle, channel: u32, baud: u32) -> u32 {
        unsafe { (self.set_dbit_baud)(raw(device.0), channel, baud) }
    }

    fn set_canfd_standard(&self, device: DeviceHandle, channel: u32, standard: u32) -> u32 {
        unsafe { (self.set_canfd_standard)(raw(device.0), channel, standard) }
    }

    fn init_can(
        &self,
        device: DeviceHandle,
        channel: u32,
        config: &ZCanChannelInitConfig,
    ) -> ChannelHandle {
        let handle = unsafe { (self.init_can)(raw(device.0), channel, config) };
        ChannelHandle(handle as usize)
    }

    fn start_can(&self, channel: ChannelHandle) -> u32 {
        unsafe { (self.start_can)(raw(channel.0)) }
    }

    fn reset_can(&self, channel: ChannelHandle) -> u32 {
        unsafe { (self.reset_can)(raw(channel.0)) }
    }

    fn transmit(&self, channel: ChannelHandle, frames: &[ZCanTransmitData]) -> u32 {
        unsafe { (self.transmit)(raw(channel.0), frames.as_ptr(), frames.len() as u32) }
    }

    fn transmit_fd(&self, channel: ChannelHandle, frames: &[ZCanTransmitFdData]) -> u32 {
        unsafe { (self.transmit_fd)(raw(channel.0), frames.as_ptr(), frames.len() as u32) }
    }

    fn get_receive_num(&self, channel: ChannelHandle, frame_type: u8) -> u32 {
        unsafe { (self.get_receive_num)(raw(channel.0), frame_type) }
    }

    fn receive(&self, channel: ChannelHandle, buf: &mut [ZCanReceiveData], wait_ms: i32) -> u32 {
        unsafe { (self.receive)(raw(channel.0), buf.as_mut_ptr(), buf.len() as u32, wait_ms) }
    }

    fn receive_fd(
        &self,
        channel: ChannelHandle,
        buf: &mut [ZCanReceiveFdData],
        wait_ms: i32,
    ) -> u32 {
        unsafe { (self.receive_fd)(raw(channel.0), buf.as_mut_ptr(), buf.len() as u32, wait_ms) }
    }

    fn clear_filter(&self, channel: ChannelHandle) -> u32 {
        unsafe { (self.clear_filter)(raw(channel.0)) }
    }

    fn set_filter_mode(&self, channel: ChannelHandle, mode: u32) -> u32 {
        unsafe { (self.set_filter_mode)(raw(channel.0), mode) }
    }

    fn set_filter_start_id(&self, channel: ChannelHandle, id: u32) -> u32 {
        unsafe { (self.set_filter_start_id)(raw(channel.0), id) }
    }

    fn set_filter_end_id(&self, channel: ChannelHandle, id: u32) -> u32 {
        unsafe { (self.set_filter_end_id)(raw(channel.0), id) }
    }

    fn ack_filter(&self, channel: ChannelHandle) -> u32 {
        unsafe { (self.ack_filter)(raw(channel.0)) }
    }
}
