//! In-memory stand-in for the Interception driver.
//!
//! `MockBackend` keeps per-slot filter, precedence, hardware id and a queue of
//! pending frames, and records every open, close and write so tests can
//! check resource accounting without the real driver.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::mem;
use std::sync::{Mutex, MutexGuard};

use super::{Backend, RawHandle};
use crate::device::{ControlCode, DEVICE_COUNT, HARDWARE_ID_CAPACITY};
use crate::stroke::Stroke;

#[derive(Debug, Default)]
struct MockDevice {
    filter: u16,
    precedence: i32,
    hardware_id: Option<Vec<u8>>,
    pending: VecDeque<Vec<u8>>,
    event: Option<RawHandle>,
}

#[derive(Debug)]
struct MockState {
    next_handle: isize,
    devices: Vec<MockDevice>,
    device_handles: HashMap<RawHandle, usize>,
    event_handles: HashSet<RawHandle>,
    opened_devices: usize,
    closed_devices: usize,
    created_events: usize,
    closed_events: usize,
    double_closes: usize,
    fail_open: Option<(usize, io::ErrorKind)>,
    fail_bind_at: Option<usize>,
    fail_filter_at: Option<usize>,
    short_reply_at: Option<usize>,
    writes: Vec<(usize, Vec<u8>)>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_handle: 0x100,
            devices: (0..DEVICE_COUNT).map(|_| MockDevice::default()).collect(),
            device_handles: HashMap::new(),
            event_handles: HashSet::new(),
            opened_devices: 0,
            closed_devices: 0,
            created_events: 0,
            closed_events: 0,
            double_closes: 0,
            fail_open: None,
            fail_bind_at: None,
            fail_filter_at: None,
            short_reply_at: None,
            writes: Vec::new(),
        }
    }
}

impl MockState {
    fn allocate(&mut self) -> RawHandle {
        let handle = RawHandle(self.next_handle);
        self.next_handle += 4;
        handle
    }
}

/// Driver double used by tests.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opening device `index` fails as if the resource did not exist.
    pub fn fail_open_at(self, index: usize) -> Self {
        self.fail_open_with(index, io::ErrorKind::NotFound)
    }

    pub fn fail_open_with(self, index: usize, kind: io::ErrorKind) -> Self {
        self.lock().fail_open = Some((index, kind));
        self
    }

    /// The event-binding control call fails for device `index`.
    pub fn fail_bind_at(self, index: usize) -> Self {
        self.lock().fail_bind_at = Some(index);
        self
    }

    /// The set-filter control call fails for device `index`.
    pub fn fail_filter_at(self, index: usize) -> Self {
        self.lock().fail_filter_at = Some(index);
        self
    }

    /// Filter and precedence queries on device `index` return a single byte.
    pub fn short_reply_at(self, index: usize) -> Self {
        self.lock().short_reply_at = Some(index);
        self
    }

    /// Queues a raw frame on device `index` and signals its event.
    pub fn push_frame(&self, index: usize, frame: impl Into<Vec<u8>>) {
        self.lock().devices[index].pending.push_back(frame.into());
    }

    pub fn push_stroke(&self, index: usize, stroke: &Stroke) {
        self.push_frame(index, stroke.encode());
    }

    /// Stores `id` as the UTF-16LE, NUL-terminated hardware id of `index`.
    pub fn set_hardware_id(&self, index: usize, id: &str) {
        let bytes: Vec<u8> = id
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();
        self.set_raw_hardware_id(index, bytes);
    }

    /// Stores `bytes` unchanged as the hardware id reply of `index`.
    pub fn set_raw_hardware_id(&self, index: usize, bytes: impl Into<Vec<u8>>) {
        self.lock().devices[index].hardware_id = Some(bytes.into());
    }

    pub fn writes(&self) -> Vec<(usize, Vec<u8>)> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn filter(&self, index: usize) -> u16 {
        self.lock().devices[index].filter
    }

    pub fn precedence(&self, index: usize) -> i32 {
        self.lock().devices[index].precedence
    }

    pub fn opened_devices(&self) -> usize {
        self.lock().opened_devices
    }

    pub fn closed_devices(&self) -> usize {
        self.lock().closed_devices
    }

    pub fn created_events(&self) -> usize {
        self.lock().created_events
    }

    pub fn closed_events(&self) -> usize {
        self.lock().closed_events
    }

    /// Handles (device or event) opened and not yet closed.
    pub fn live_handles(&self) -> usize {
        let state = self.lock();
        state.device_handles.len() + state.event_handles.len()
    }

    /// Close calls on a handle that was not open.
    pub fn double_closes(&self) -> usize {
        self.lock().double_closes
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn refused(what: &str) -> io::Error {
    io::Error::other(format!("mock driver refused {what}"))
}

fn write_prefix(output: &mut [u8], bytes: &[u8]) -> u32 {
    let n = output.len().min(bytes.len());
    output[..n].copy_from_slice(&bytes[..n]);
    n as u32
}

impl Backend for MockBackend {
    fn open_device(&self, index: usize) -> io::Result<RawHandle> {
        let mut state = self.lock();
        if let Some((at, kind)) = state.fail_open {
            if at == index {
                return Err(io::Error::new(kind, format!("device {index} unavailable")));
            }
        }
        let handle = state.allocate();
        state.device_handles.insert(handle, index);
        state.opened_devices += 1;
        Ok(handle)
    }

    fn create_event(&self) -> io::Result<RawHandle> {
        let mut state = self.lock();
        let event = state.allocate();
        state.event_handles.insert(event);
        state.created_events += 1;
        Ok(event)
    }

    fn device_io_control(
        &self,
        handle: RawHandle,
        code: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> io::Result<u32> {
        let mut state = self.lock();
        let index = *state
            .device_handles
            .get(&handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid handle"))?;
        let code = ControlCode::from_code(code)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unknown control code"))?;

        match code {
            ControlCode::SetEvent => {
                if state.fail_bind_at == Some(index) {
                    return Err(refused("event binding"));
                }
                let width = mem::size_of::<isize>();
                let raw = input
                    .get(..width)
                    .and_then(|b| <[u8; mem::size_of::<isize>()]>::try_from(b).ok())
                    .map(isize::from_le_bytes)
                    .ok_or_else(|| refused("short event buffer"))?;
                state.devices[index].event = Some(RawHandle(raw));
                Ok(0)
            }
            ControlCode::Read => {
                let frame = state.devices[index].pending.pop_front();
                Ok(frame.map(|f| write_prefix(output, &f)).unwrap_or(0))
            }
            ControlCode::Write => {
                state.writes.push((index, input.to_vec()));
                Ok(input.len() as u32)
            }
            ControlCode::GetFilter => {
                let filter = state.devices[index].filter.to_le_bytes();
                let len = if state.short_reply_at == Some(index) { 1 } else { 2 };
                Ok(write_prefix(output, &filter[..len]))
            }
            ControlCode::SetFilter => {
                if state.fail_filter_at == Some(index) {
                    return Err(refused("set filter"));
                }
                let bits = input
                    .get(..2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .ok_or_else(|| refused("short filter buffer"))?;
                state.devices[index].filter = bits;
                Ok(0)
            }
            ControlCode::GetPrecedence => {
                let precedence = state.devices[index].precedence.to_le_bytes();
                let len = if state.short_reply_at == Some(index) { 1 } else { 4 };
                Ok(write_prefix(output, &precedence[..len]))
            }
            ControlCode::SetPrecedence => {
                let value = input
                    .get(..4)
                    .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .ok_or_else(|| refused("short precedence buffer"))?;
                state.devices[index].precedence = value;
                Ok(0)
            }
            ControlCode::GetHardwareId => {
                let id = state.devices[index].hardware_id.clone().unwrap_or_default();
                let len = id.len().min(HARDWARE_ID_CAPACITY);
                Ok(write_prefix(output, &id[..len]))
            }
        }
    }

    fn wait_any(&self, events: &[RawHandle], timeout_ms: Option<u32>) -> io::Result<Option<usize>> {
        let state = self.lock();
        let ready = events.iter().position(|event| {
            event.is_valid()
                && state
                    .devices
                    .iter()
                    .any(|d| d.event == Some(*event) && !d.pending.is_empty())
        });

        match (ready, timeout_ms) {
            (Some(position), _) => Ok(Some(position)),
            (None, Some(_)) => Ok(None),
            (None, None) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "infinite wait with no pending input",
            )),
        }
    }

    fn close_handle(&self, handle: RawHandle) {
        let mut state = self.lock();
        if state.device_handles.remove(&handle).is_some() {
            state.closed_devices += 1;
        } else if state.event_handles.remove(&handle) {
            state.closed_events += 1;
        } else {
            state.double_closes += 1;
        }
    }
}
