use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::zcan::types::*;
use crate::zcan::ZCanDriver;

pub const MOCK_DEVICE_HANDLE: DeviceHandle = DeviceHandle(0xD000);
const CHANNEL_HANDLE_BASE: usize = 0x100;

/// One recorded driver call, with channel handles mapped back to channel indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenDevice { device_type: u32, index: u32 },
    CloseDevice,
    SetAbitBaud { channel: u32, baud: u32 },
    SetDbitBaud { channel: u32, baud: u32 },
    SetCanFdStandard { channel: u32, standard: u32 },
    InitCan { channel: u32, can_type: u32 },
    StartCan(u32),
    ResetCan(u32),
    Transmit { channel: u32, count: usize },
    TransmitFd { channel: u32, count: usize },
    GetReceiveNum { channel: u32, frame_type: u8 },
    Receive { channel: u32, max: usize, wait_ms: i32 },
    ReceiveFd { channel: u32, max: usize, wait_ms: i32 },
    ClearFilter(u32),
    SetFilterMode(u32, u32),
    SetFilterStartId(u32, u32),
    SetFilterEndId(u32, u32),
    AckFilter(u32),
}

/// Driver calls that can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fail {
    OpenDevice,
    AbitBaud(u32),
    DbitBaud(u32),
    CanFdStandard(u32),
    InitCan(u32),
    StartCan(u32),
    ResetCan(u32),
    CloseDevice,
    SetFilterMode(u32),
    AckFilter(u32),
    Receive(u32),
}

#[derive(Debug, Clone, Copy, Default)]
struct FilterRegs {
    mode: u32,
    start: u32,
    end: u32,
}

impl FilterRegs {
    fn passes(&self, id: u32) -> bool {
        match self.mode {
            FILTER_MODE_RANGE => self.start <= id && id <= self.end,
            _ => id == self.start || id == self.end,
        }
    }
}

/// Mock ZCAN driver for testing the session, channels and client without hardware.
/// Models the acceptance filter, per-channel receive queues and partial transmit acceptance.
pub struct MockDriver {
    calls: RefCell<Vec<Call>>,
    failures: RefCell<HashSet<Fail>>,
    /// Caps how many frames a transmit call accepts
    accept_limit: Cell<Option<u32>>,
    /// Number of pending-count polls that report zero before the queue becomes visible
    empty_polls: Cell<u32>,
    staged_filters: RefCell<HashMap<u32, FilterRegs>>,
    filters: RefCell<HashMap<u32, FilterRegs>>,
    rx_queue: RefCell<HashMap<u32, VecDeque<ZCanReceiveData>>>,
    rx_fd_queue: RefCell<HashMap<u32, VecDeque<ZCanReceiveFdData>>>,
    transmitted: RefCell<Vec<(u32, ZCanTransmitData)>>,
    transmitted_fd: RefCell<Vec<(u32, ZCanTransmitFdData)>>,
    init_configs: RefCell<Vec<(u32, ZCanChannelInitConfig)>>,
    clock: Cell<u64>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            failures: RefCell::new(HashSet::new()),
            accept_limit: Cell::new(None),
            empty_polls: Cell::new(0),
            staged_filters: RefCell::new(HashMap::new()),
            filters: RefCell::new(HashMap::new()),
            rx_queue: RefCell::new(HashMap::new()),
            rx_fd_queue: RefCell::new(HashMap::new()),
            transmitted: RefCell::new(Vec::new()),
            transmitted_fd: RefCell::new(Vec::new()),
            init_configs: RefCell::new(Vec::new()),
            clock: Cell::new(1000),
        }
    }

    pub fn fail(&self, point: Fail) {
        self.failures.borrow_mut().insert(point);
    }

    pub fn set_accept_limit(&self, limit: Option<u32>) {
        self.accept_limit.set(limit);
    }

    pub fn set_empty_polls(&self, polls: u32) {
        self.empty_polls.set(polls);
    }

    /// Put a classic frame on the bus for `channel`. Returns false if the filter dropped it.
    pub fn inject(&self, channel: u32, frame: ZCanFrame) -> bool {
        if !self.filter_passes(channel, frame.can_id) {
            return false;
        }
        let timestamp = self.tick();
        self.rx_queue
            .borrow_mut()
            .entry(channel)
            .or_default()
            .push_back(ZCanReceiveData { frame, timestamp });
        true
    }

    /// Put an FD frame on the bus for `channel`. Returns false if the filter dropped it.
    pub fn inject_fd(&self, channel: u32, frame: ZCanFdFrame) -> bool {
        if !self.filter_passes(channel, frame.can_id) {
            return false;
        }
        let timestamp = self.tick();
        self.rx_fd_queue
            .borrow_mut()
            .entry(channel)
            .or_default()
            .push_back(ZCanReceiveFdData { frame, timestamp });
        true
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, call: &Call) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c == call)
    }

    pub fn transmitted(&self) -> Vec<(u32, ZCanTransmitData)> {
        self.transmitted.borrow().clone()
    }

    pub fn transmitted_fd(&self) -> Vec<(u32, ZCanTransmitFdData)> {
        self.transmitted_fd.borrow().clone()
    }

    pub fn init_configs(&self) -> Vec<(u32, ZCanChannelInitConfig)> {
        self.init_configs.borrow().clone()
    }

    fn tick(&self) -> u64 {
        let now = self.clock.get() + 100;
        self.clock.set(now);
        now
    }

    fn filter_passes(&self, channel: u32, can_id: u32) -> bool {
        match self.filters.borrow().get(&channel) {
            Some(regs) => regs.passes(can_id & CAN_EFF_MASK),
            None => true,
        }
    }

    fn failing(&self, point: Fail) -> bool {
        self.failures.borrow().contains(&point)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn status(&self, point: Fail) -> u32 {
        if self.failing(point) {
            STATUS_ERR
        } else {
            STATUS_OK
        }
    }

    fn index(channel: ChannelHandle) -> u32 {
        (channel.0 - CHANNEL_HANDLE_BASE) as u32
    }

    fn accepted(&self, requested: usize) -> usize {
        match self.accept_limit.get() {
            Some(limit) => requested.min(limit as usize),
            None => requested,
        }
    }

    fn visible_pending(&self) -> bool {
        let polls = self.empty_polls.get();
        if polls > 0 {
            self.empty_polls.set(polls - 1);
            return false;
        }
        true
    }
}

impl ZCanDriver for MockDriver {
    fn open_device(&self, device_type: u32, index: u32) -> DeviceHandle {
        self.record(Call::OpenDevice { device_type, index });
        if self.failing(Fail::OpenDevice) {
            return DeviceHandle::INVALID;
        }
        MOCK_DEVICE_HANDLE
    }

    fn close_device(&self, device: DeviceHandle) -> u32 {
        assert_eq!(device, MOCK_DEVICE_HANDLE);
        self.record(Call::CloseDevice);
        self.status(Fail::CloseDevice)
    }

    fn set_abit_baud(&self, _device: DeviceHandle, channel: u32, baud: u32) -> u32 {
        self.record(Call::SetAbitBaud { channel, baud });
        self.status(Fail::AbitBaud(channel))
    }

    fn set_dbit_baud(&self, _device: DeviceHandle, channel: u32, baud: u32) -> u32 {
        self.record(Call::SetDbitBaud { channel, baud });
        self.status(Fail::DbitBaud(channel))
    }

    fn set_canfd_standard(&self, _device: DeviceHandle, channel: u32, standard: u32) -> u32 {
        self.record(Call::SetCanFdStandard { channel, standard });
        self.status(Fail::CanFdStandard(channel))
    }

    fn init_can(
        &self,
        _device: DeviceHandle,
        channel: u32,
        config: &ZCanChannelInitConfig,
    ) -> ChannelHandle {
        self.record(Call::InitCan {
            channel,
            can_type: config.can_type,
        });
        self.init_configs.borrow_mut().push((channel, *config));
        if self.failing(Fail::InitCan(channel)) || channel >= CHANNEL_COUNT {
            return ChannelHandle::INVALID;
        }
        ChannelHandle(CHANNEL_HANDLE_BASE + channel as usize)
    }

    fn start_can(&self, channel: ChannelHandle) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::StartCan(idx));
        self.status(Fail::StartCan(idx))
    }

    fn reset_can(&self, channel: ChannelHandle) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::ResetCan(idx));
        self.status(Fail::ResetCan(idx))
    }

    fn transmit(&self, channel: ChannelHandle, frames: &[ZCanTransmitData]) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::Transmit {
            channel: idx,
            count: frames.len(),
        });
        let accepted = self.accepted(frames.len());
        self.transmitted
            .borrow_mut()
            .extend(frames[..accepted].iter().map(|f| (idx, *f)));
        accepted as u32
    }

    fn transmit_fd(&self, channel: ChannelHandle, frames: &[ZCanTransmitFdData]) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::TransmitFd {
            channel: idx,
            count: frames.len(),
        });
        let accepted = self.accepted(frames.len());
        self.transmitted_fd
            .borrow_mut()
            .extend(frames[..accepted].iter().map(|f| (idx, *f)));
        accepted as u32
    }

    fn get_receive_num(&self, channel: ChannelHandle, frame_type: u8) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::GetReceiveNum {
            channel: idx,
            frame_type,
        });
        if !self.visible_pending() {
            return 0;
        }
        let len = if frame_type == TYPE_CANFD {
            self.rx_fd_queue.borrow().get(&idx).map_or(0, |q| q.len())
        } else {
            self.rx_queue.borrow().get(&idx).map_or(0, |q| q.len())
        };
        len as u32
    }

    fn receive(&self, channel: ChannelHandle, buf: &mut [ZCanReceiveData], wait_ms: i32) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::Receive {
            channel: idx,
            max: buf.len(),
            wait_ms,
        });
        if self.failing(Fail::Receive(idx)) {
            return 0;
        }
        let mut queues = self.rx_queue.borrow_mut();
        let queue = queues.entry(idx).or_default();
        let mut n = 0;
        while n < buf.len() {
            match queue.pop_front() {
                Some(item) => {
                    buf[n] = item;
                    n += 1;
                }
                None => break,
            }
        }
        n as u32
    }

    fn receive_fd(
        &self,
        channel: ChannelHandle,
        buf: &mut [ZCanReceiveFdData],
        wait_ms: i32,
    ) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::ReceiveFd {
            channel: idx,
            max: buf.len(),
            wait_ms,
        });
        if self.failing(Fail::Receive(idx)) {
            return 0;
        }
        let mut queues = self.rx_fd_queue.borrow_mut();
        let queue = queues.entry(idx).or_default();
        let mut n = 0;
        while n < buf.len() {
            match queue.pop_front() {
                Some(item) => {
                    buf[n] = item;
                    n += 1;
                }
                None => break,
            }
        }
        n as u32
    }

    fn clear_filter(&self, channel: ChannelHandle) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::ClearFilter(idx));
        self.staged_filters.borrow_mut().remove(&idx);
        self.filters.borrow_mut().remove(&idx);
        STATUS_OK
    }

    fn set_filter_mode(&self, channel: ChannelHandle, mode: u32) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::SetFilterMode(idx, mode));
        self.staged_filters.borrow_mut().entry(idx).or_default().mode = mode;
        self.status(Fail::SetFilterMode(idx))
    }

    fn set_filter_start_id(&self, channel: ChannelHandle, id: u32) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::SetFilterStartId(idx, id));
        self.staged_filters.borrow_mut().entry(idx).or_default().start = id;
        STATUS_OK
    }

    fn set_filter_end_id(&self, channel: ChannelHandle, id: u32) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::SetFilterEndId(idx, id));
        self.staged_filters.borrow_mut().entry(idx).or_default().end = id;
        STATUS_OK
    }

    fn ack_filter(&self, channel: ChannelHandle) -> u32 {
        let idx = Self::index(channel);
        self.record(Call::AckFilter(idx));
        if self.failing(Fail::AckFilter(idx)) {
            return STATUS_ERR;
        }
        if let Some(regs) = self.staged_filters.borrow_mut().remove(&idx) {
            self.filters.borrow_mut().insert(idx, regs);
        }
        STATUS_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32) -> ZCanFrame {
        ZCanFrame {
            can_id: id,
            can_dlc: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_mock_filter_commits_on_ack() {
        let mock = MockDriver::new();
        let ch = ChannelHandle(CHANNEL_HANDLE_BASE + 1);
        mock.clear_filter(ch);
        mock.set_filter_mode(ch, FILTER_MODE_RANGE);
        mock.set_filter_start_id(ch, 0x31C);
        mock.set_filter_end_id(ch, 0x31C);

        // Staged only: everything still passes
        assert!(mock.inject(1, frame(0x100)));
        mock.ack_filter(ch);
        assert!(!mock.inject(1, frame(0x100)));
        assert!(mock.inject(1, frame(0x31C)));
        // Other channel is unfiltered
        assert!(mock.inject(0, frame(0x100)));
    }

    #[test]
    fn test_mock_empty_polls() {
        let mock = MockDriver::new();
        let ch = ChannelHandle(CHANNEL_HANDLE_BASE);
        mock.inject(0, frame(0x10));
        mock.set_empty_polls(2);
        assert_eq!(mock.get_receive_num(ch, TYPE_CAN), 0);
        assert_eq!(mock.get_receive_num(ch, TYPE_CAN), 0);
        assert_eq!(mock.get_receive_num(ch, TYPE_CAN), 1);
        assert_eq!(mock.get_receive_num(ch, TYPE_CANFD), 0);
    }

    #[test]
    fn test_mock_accept_limit() {
        let mock = MockDriver::new();
        let ch = ChannelHandle(CHANNEL_HANDLE_BASE);
        mock.set_accept_limit(Some(1));
        let frames = [ZCanTransmitData::default(); 3];
        assert_eq!(mock.transmit(ch, &frames), 1);
        assert_eq!(mock.transmitted().len(), 1);
    }

    #[test]
    fn test_mock_receive_timestamps_increase() {
        let mock = MockDriver::new();
        let ch = ChannelHandle(CHANNEL_HANDLE_BASE);
        mock.inject(0, frame(1));
        mock.inject(0, frame(2));
        let mut buf = [ZCanReceiveData::default(); 2];
        assert_eq!(mock.receive(ch, &mut buf, WAIT_FOREVER), 2);
        assert!(buf[0].timestamp < buf[1].timestamp);
        assert_eq!(mock.get_receive_num(ch, TYPE_CAN), 0);
    }
}
