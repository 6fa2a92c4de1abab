//! Kernel32.dll bindings for process and memory operations

use crate::core::types::{Address, MemoryError, MemoryResult};
use std::mem;
use winapi::shared::minwindef::{FALSE, LPCVOID, LPVOID};
use winapi::shared::winerror::{ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::CloseHandle;
use winapi::um::memoryapi::{ReadProcessMemory, VirtualQueryEx, WriteProcessMemory};
use winapi::um::processthreadsapi::OpenProcess;
use winapi::um::winnt::{HANDLE, MEMORY_BASIC_INFORMATION};

/// Text of the calling thread's last Win32 error
pub fn last_error_message() -> String {
    windows::core::Error::from_win32().message().to_string()
}

/// Opens `pid`, classifying the common failures
pub fn open_process(pid: u32, desired_access: u32) -> MemoryResult<HANDLE> {
    unsafe {
        let handle = OpenProcess(desired_access, FALSE, pid);
        if !handle.is_null() {
            return Ok(handle);
        }

        match GetLastError() {
            ERROR_ACCESS_DENIED => Err(MemoryError::access_denied(pid, last_error_message())),
            ERROR_INVALID_PARAMETER => Err(MemoryError::ProcessNotFound(format!("PID: {}", pid))),
            _ => Err(MemoryError::WindowsApiError(
                windows::core::Error::from_win32(),
            )),
        }
    }
}

/// Closes a handle; null is accepted and ignored
///
/// # Safety
/// The handle must be a valid Windows handle
pub unsafe fn close_handle(handle: HANDLE) -> MemoryResult<()> {
    if handle.is_null() {
        return Ok(());
    }

    if CloseHandle(handle) == FALSE {
        Err(MemoryError::WindowsApiError(
            windows::core::Error::from_win32(),
        ))
    } else {
        Ok(())
    }
}

/// `ReadProcessMemory`; a partial copy is reported through the returned count
///
/// # Safety
/// The handle must be a valid process handle with `PROCESS_VM_READ`
pub unsafe fn read_process_memory(
    handle: HANDLE,
    address: Address,
    buffer: &mut [u8],
) -> MemoryResult<usize> {
    let mut bytes_read = 0;

    let result = ReadProcessMemory(
        handle,
        address.as_u64() as LPCVOID,
        buffer.as_mut_ptr() as LPVOID,
        buffer.len(),
        &mut bytes_read,
    );

    if result == FALSE && bytes_read == 0 {
        Err(MemoryError::read_fault(address, last_error_message()))
    } else {
        Ok(bytes_read)
    }
}

/// `WriteProcessMemory`; same count semantics as the read
///
/// # Safety
/// The handle must be a valid process handle with `PROCESS_VM_WRITE`
pub unsafe fn write_process_memory(
    handle: HANDLE,
    address: Address,
    data: &[u8],
) -> MemoryResult<usize> {
    let mut bytes_written = 0;

    let result = WriteProcessMemory(
        handle,
        address.as_u64() as LPVOID,
        data.as_ptr() as LPCVOID,
        data.len(),
        &mut bytes_written,
    );

    if result == FALSE && bytes_written == 0 {
        Err(MemoryError::write_fault(address, last_error_message()))
    } else {
        Ok(bytes_written)
    }
}

/// The region containing `address`, `None` past the end of the address space
///
/// # Safety
/// The handle must be a valid process handle with `PROCESS_QUERY_INFORMATION`
pub unsafe fn virtual_query_ex(handle: HANDLE, address: u64) -> Option<MEMORY_BASIC_INFORMATION> {
    let mut mbi: MEMORY_BASIC_INFORMATION = mem::zeroed();

    let result = VirtualQueryEx(
        handle,
        address as LPCVOID,
        &mut mbi,
        mem::size_of::<MEMORY_BASIC_INFORMATION>(),
    );

    if result == 0 {
        None
    } else {
        Some(mbi)
    }
}
