//! NTDLL.dll bindings for the kernel-assisted memory path

use crate::core::types::{Address, MemoryError, MemoryResult};
use std::mem;
use winapi::shared::basetsd::SIZE_T;
use winapi::shared::minwindef::ULONG;
use winapi::shared::ntdef::{NTSTATUS, PVOID};
use winapi::um::winnt::HANDLE;

pub const STATUS_SUCCESS: NTSTATUS = 0x00000000;
pub const STATUS_PARTIAL_COPY: NTSTATUS = 0x8000000D_u32 as i32;
pub const STATUS_ACCESS_DENIED: NTSTATUS = 0xC0000022_u32 as i32;

const PROCESS_WOW64_INFORMATION: ULONG = 26;

#[link(name = "ntdll")]
extern "system" {
    fn NtReadVirtualMemory(
        process_handle: HANDLE,
        base_address: PVOID,
        buffer: PVOID,
        bytes_to_read: SIZE_T,
        bytes_read: *mut SIZE_T,
    ) -> NTSTATUS;

    fn NtWriteVirtualMemory(
        process_handle: HANDLE,
        base_address: PVOID,
        buffer: PVOID,
        bytes_to_write: SIZE_T,
        bytes_written: *mut SIZE_T,
    ) -> NTSTATUS;

    fn NtQueryInformationProcess(
        process_handle: HANDLE,
        process_info_class: ULONG,
        process_info: PVOID,
        process_info_length: ULONG,
        return_length: *mut ULONG,
    ) -> NTSTATUS;
}

/// Success and informational codes; warnings and errors have the top bit set
pub fn nt_success(status: NTSTATUS) -> bool {
    status >= 0
}

/// Whether a read or write moved data. Informational codes such as
/// `STATUS_PENDING` pass [`nt_success`] but guarantee no copy, so only an
/// exact `STATUS_SUCCESS` or a non-empty partial copy counts.
fn transfer_completed(status: NTSTATUS, count: SIZE_T) -> bool {
    status == STATUS_SUCCESS || (status == STATUS_PARTIAL_COPY && count > 0)
}

/// Readable text for the codes the memory calls return
fn describe(call: &str, status: NTSTATUS) -> String {
    match status {
        STATUS_PARTIAL_COPY => format!("{}: only part of the range was copied", call),
        STATUS_ACCESS_DENIED => format!("{}: access denied", call),
        other => format!("{} status 0x{:08X}", call, other),
    }
}

/// Reads through `NtReadVirtualMemory`.
///
/// A partial copy surfaces as its byte count so the caller can reject it.
///
/// # Safety
/// The handle must be a valid process handle with `PROCESS_VM_READ`
pub unsafe fn read_virtual_memory(
    handle: HANDLE,
    address: Address,
    buffer: &mut [u8],
) -> MemoryResult<usize> {
    let mut bytes_read: SIZE_T = 0;
    let status = NtReadVirtualMemory(
        handle,
        address.as_u64() as PVOID,
        buffer.as_mut_ptr() as PVOID,
        buffer.len(),
        &mut bytes_read,
    );

    if transfer_completed(status, bytes_read) {
        Ok(bytes_read)
    } else {
        Err(MemoryError::read_fault(
            address,
            describe("NtReadVirtualMemory", status),
        ))
    }
}

/// Writes through `NtWriteVirtualMemory`
///
/// # Safety
/// The handle must be a valid process handle with `PROCESS_VM_WRITE`
pub unsafe fn write_virtual_memory(
    handle: HANDLE,
    address: Address,
    data: &[u8],
) -> MemoryResult<usize> {
    let mut bytes_written: SIZE_T = 0;
    let status = NtWriteVirtualMemory(
        handle,
        address.as_u64() as PVOID,
        data.as_ptr() as PVOID,
        data.len(),
        &mut bytes_written,
    );

    if transfer_completed(status, bytes_written) {
        Ok(bytes_written)
    } else {
        Err(MemoryError::write_fault(
            address,
            describe("NtWriteVirtualMemory", status),
        ))
    }
}

/// True when the target is a 32-bit process running under WoW64
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn is_wow64_process(handle: HANDLE) -> MemoryResult<bool> {
    let mut wow64_peb: usize = 0;
    let mut return_length = 0u32;

    let status = NtQueryInformationProcess(
        handle,
        PROCESS_WOW64_INFORMATION,
        &mut wow64_peb as *mut _ as PVOID,
        mem::size_of::<usize>() as ULONG,
        &mut return_length,
    );

    if nt_success(status) {
        Ok(wow64_peb != 0)
    } else {
        Err(MemoryError::InvalidHandle(format!(
            "failed to query WoW64 status: 0x{:08X}",
            status
        )))
    }
}
