use std::ffi::c_void;
use std::path::PathBuf;

use crate::can::error::CanError;
use crate::zcan::types::*;

/// Type aliases for libcontrolcanfd function pointers
type OpenDeviceFn = unsafe extern "C" fn(u32, u32, u32) -> *mut c_void;
type CloseDeviceFn = unsafe extern "C" fn(*mut c_void) -> u32;
type SetBaudFn = unsafe extern "C" fn(*mut c_void, u32, u32) -> u32;
type SetCanFdStandardFn = unsafe extern "C" fn(*mut c_void, u32, u32) -> u32;
type InitCanFn = unsafe extern "C" fn(*mut c_void, u32, *const ZCanChannelInitConfig) -> *mut c_void;
type ChannelFn = unsafe extern "C" fn(*mut c_void) -> u32;
type TransmitFn = unsafe extern "C" fn(*mut c_void, *const ZCanTransmitData, u32) -> u32;
type TransmitFdFn = unsafe extern "C" fn(*mut c_void, *const ZCanTransmitFdData, u32) -> u32;
type GetReceiveNumFn = unsafe extern "C" fn(*mut c_void, u8) -> u32;
type ReceiveFn = unsafe extern "C" fn(*mut c_void, *mut ZCanReceiveData, u32, i32) -> u32;
type ReceiveFdFn = unsafe extern "C" fn(*mut c_void, *mut ZCanReceiveFdData, u32, i32) -> u32;
type ChannelValueFn = unsafe extern "C" fn(*mut c_void, u32) -> u32;

/// Holds a dynamically loaded ZCAN library and its function pointers
pub struct ZCanLib {
    _lib: libloading::Library,
    pub open_device: OpenDeviceFn,
    pub close_device: CloseDeviceFn,
    pub set_abit_baud: SetBaudFn,
    pub set_dbit_baud: SetBaudFn,
    pub set_canfd_standard: SetCanFdStandardFn,
    pub init_can: InitCanFn,
    pub start_can: ChannelFn,
    pub reset_can: ChannelFn,
    pub transmit: TransmitFn,
    pub transmit_fd: TransmitFdFn,
    pub get_receive_num: GetReceiveNumFn,
    pub receive: ReceiveFn,
    pub receive_fd: ReceiveFdFn,
    pub clear_filter: ChannelFn,
    pub set_filter_mode: ChannelValueFn,
    pub set_filter_start_id: ChannelValueFn,
    pub set_filter_end_id: ChannelValueFn,
    pub ack_filter: ChannelFn,
}

/// Resolve one exported symbol and copy its function pointer out
unsafe fn symbol<T: Copy>(lib: &libloading::Library, name: &[u8]) -> Result<T, CanError> {
    let sym = lib.get::<T>(name).map_err(|e| {
        CanError::Library(format!(
            "{} not found: {}",
            String::from_utf8_lossy(&name[..name.len().saturating_sub(1)]),
            e
        ))
    })?;
    Ok(*sym)
}

impl ZCanLib {
    /// Load the ZCAN shared library from the given path
    pub fn load(lib_path: &str) -> Result<Self, CanError> {
        unsafe {
            let lib = libloading::Library::new(lib_path).map_err(|e| {
                CanError::Library(format!("Failed to load ZCAN library '{}': {}", lib_path, e))
            })?;

            let open_device = symbol::<OpenDeviceFn>(&lib, b"ZCAN_OpenDevice\0")?;
            let close_device = symbol::<CloseDeviceFn>(&lib, b"ZCAN_CloseDevice\0")?;
            let set_abit_baud = symbol::<SetBaudFn>(&lib, b"ZCAN_SetAbitBaud\0")?;
            let set_dbit_baud = symbol::<SetBaudFn>(&lib, b"ZCAN_SetDbitBaud\0")?;
            let set_canfd_standard =
                symbol::<SetCanFdStandardFn>(&lib, b"ZCAN_SetCANFDStandard\0")?;
            let init_can = symbol::<InitCanFn>(&lib, b"ZCAN_InitCAN\0")?;
            let start_can = symbol::<ChannelFn>(&lib, b"ZCAN_StartCAN\0")?;
            let reset_can = symbol::<ChannelFn>(&lib, b"ZCAN_ResetCAN\0")?;
            let transmit = symbol::<TransmitFn>(&lib, b"ZCAN_Transmit\0")?;
            let transmit_fd = symbol::<TransmitFdFn>(&lib, b"ZCAN_TransmitFD\0")?;
            let get_receive_num = symbol::<GetReceiveNumFn>(&lib, b"ZCAN_GetReceiveNum\0")?;
            let receive = symbol::<ReceiveFn>(&lib, b"ZCAN_Receive\0")?;
            let receive_fd = symbol::<ReceiveFdFn>(&lib, b"ZCAN_ReceiveFD\0")?;
            let clear_filter = symbol::<ChannelFn>(&lib, b"ZCAN_ClearFilter\0")?;
            let set_filter_mode = symbol::<ChannelValueFn>(&lib, b"ZCAN_SetFilterMode\0")?;
            let set_filter_start_id =
                symbol::<ChannelValueFn>(&lib, b"ZCAN_SetFilterStartID\0")?;
            let set_filter_end_id = symbol::<ChannelValueFn>(&lib, b"ZCAN_SetFilterEndID\0")?;
            let ack_filter = symbol::<ChannelFn>(&lib, b"ZCAN_AckFilter\0")?;

            Ok(Self {
                _lib: lib,
                open_device,
                close_device,
                set_abit_baud,
                set_dbit_baud,
                set_canfd_standard,
                init_can,
                start_can,
                reset_can,
                transmit,
                transmit_fd,
                get_receive_num,
                receive,
                receive_fd,
                clear_filter,
                set_filter_mode,
                set_filter_start_id,
                set_filter_end_id,
                ack_filter,
            })
        }
    }
}

/// Default library location: next to the executable, falling back to the loader search path
pub fn default_library_path() -> PathBuf {
    const LIB_NAME: &str = "libcontrolcanfd.so";
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(LIB_NAME)))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from(LIB_NAME))
}
