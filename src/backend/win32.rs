use std::ffi::CString;
use std::io;
use std::ptr;

use tracing::trace;
use winapi::shared::minwindef::{DWORD, FALSE, LPVOID, TRUE};
use winapi::shared::winerror::WAIT_TIMEOUT;
use winapi::um::fileapi::{CreateFileA, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::ioapiset::DeviceIoControl;
use winapi::um::synchapi::{CreateEventA, WaitForMultipleObjects};
use winapi::um::winbase::{INFINITE, WAIT_FAILED, WAIT_OBJECT_0};
use winapi::um::winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, HANDLE};

use super::{device_path, Backend, RawHandle};

/// Backend that talks to the Interception driver through kernel32.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Backend;

impl Win32Backend {
    pub fn new() -> Self {
        Self
    }
}

fn to_handle(raw: RawHandle) -> HANDLE {
    raw.0 as HANDLE
}

fn from_handle(handle: HANDLE) -> RawHandle {
    RawHandle(handle as isize)
}

impl Backend for Win32Backend {
    fn open_device(&self, index: usize) -> io::Result<RawHandle> {
        let path = CString::new(device_path(index))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let handle = unsafe {
            CreateFileA(
                path.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                ptr::null_mut(),
                OPEN_EXISTING,
                0,
                ptr::null_mut(),
            )
        };

        if handle == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        Ok(from_handle(handle))
    }

    fn create_event(&self) -> io::Result<RawHandle> {
        let event = unsafe { CreateEventA(ptr::null_mut(), TRUE, FALSE, ptr::null()) };
        if event.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(from_handle(event))
    }

    fn device_io_control(
        &self,
        handle: RawHandle,
        code: u32,
        input: &[u8],
        output: &mut [u8],
    ) -> io::Result<u32> {
        let mut bytes_returned: DWORD = 0;
        let in_ptr = if input.is_empty() {
            ptr::null_mut()
        } else {
            input.as_ptr() as LPVOID
        };
        let out_ptr = if output.is_empty() {
            ptr::null_mut()
        } else {
            output.as_mut_ptr() as LPVOID
        };

        let ok = unsafe {
            DeviceIoControl(
                to_handle(handle),
                code,
                in_ptr,
                input.len() as DWORD,
                out_ptr,
                output.len() as DWORD,
                &mut bytes_returned,
                ptr::null_mut(),
            )
        };

        if ok == FALSE {
            return Err(io::Error::last_os_error());
        }
        Ok(bytes_returned)
    }

    fn wait_any(&self, events: &[RawHandle], timeout_ms: Option<u32>) -> io::Result<Option<usize>> {
        let handles: Vec<HANDLE> = events.iter().copied().map(to_handle).collect();
        let timeout = timeout_ms.unwrap_or(INFINITE);

        let result = unsafe {
            WaitForMultipleObjects(handles.len() as DWORD, handles.as_ptr(), FALSE, timeout)
        };
        trace!(result, "WaitForMultipleObjects returned");

        match result {
            WAIT_TIMEOUT => Ok(None),
            WAIT_FAILED => Err(io::Error::last_os_error()),
            r if r >= WAIT_OBJECT_0 && ((r - WAIT_OBJECT_0) as usize) < handles.len() => {
                Ok(Some((r - WAIT_OBJECT_0) as usize))
            }
            other => Err(io::Error::other(format!(
                "unexpected wait result {other:#x}"
            ))),
        }
    }

    fn close_handle(&self, handle: RawHandle) {
        if handle.is_valid() {
            unsafe {
                CloseHandle(to_handle(handle));
            }
        }
    }
}
