//! PSAPI.dll bindings for module enumeration

use crate::core::types::{MemoryError, MemoryResult};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;
use winapi::shared::minwindef::{FALSE, HMODULE, MAX_PATH};
use winapi::um::psapi::{
    EnumProcessModulesEx, GetModuleBaseNameW, GetModuleFileNameExW, GetModuleInformation,
    LIST_MODULES_ALL, MODULEINFO,
};
use winapi::um::winnt::HANDLE;

/// Every module of the target, 32- and 64-bit alike; grows the buffer until it fits
///
/// # Safety
/// The handle must be a valid process handle
pub unsafe fn enum_process_modules(handle: HANDLE) -> MemoryResult<Vec<HMODULE>> {
    let mut modules = vec![std::ptr::null_mut(); 1024];
    let mut bytes_needed = 0u32;

    loop {
        let capacity = (modules.len() * std::mem::size_of::<HMODULE>()) as u32;
        let result = EnumProcessModulesEx(
            handle,
            modules.as_mut_ptr(),
            capacity,
            &mut bytes_needed,
            LIST_MODULES_ALL,
        );

        if result == FALSE {
            return Err(MemoryError::WindowsApiError(
                windows::core::Error::from_win32(),
            ));
        }
        if bytes_needed <= capacity {
            break;
        }
        modules.resize(bytes_needed as usize / std::mem::size_of::<HMODULE>(), std::ptr::null_mut());
    }

    modules.truncate(bytes_needed as usize / std::mem::size_of::<HMODULE>());
    Ok(modules)
}

/// Base address and image size of one module
///
/// # Safety
/// The handle must be a valid process handle and module must be valid
pub unsafe fn get_module_information(handle: HANDLE, module: HMODULE) -> MemoryResult<MODULEINFO> {
    let mut info = MODULEINFO {
        lpBaseOfDll: std::ptr::null_mut(),
        SizeOfImage: 0,
        EntryPoint: std::ptr::null_mut(),
    };

    let result = GetModuleInformation(
        handle,
        module,
        &mut info,
        std::mem::size_of::<MODULEINFO>() as u32,
    );

    if result == FALSE {
        return Err(MemoryError::WindowsApiError(
            windows::core::Error::from_win32(),
        ));
    }

    Ok(info)
}

/// File name without directory, e.g. `client.dll`
///
/// # Safety
/// The handle must be a valid process handle and module must be valid
pub unsafe fn get_module_base_name(handle: HANDLE, module: HMODULE) -> MemoryResult<String> {
    let mut buffer = vec![0u16; MAX_PATH];
    let length = GetModuleBaseNameW(handle, module, buffer.as_mut_ptr(), MAX_PATH as u32);

    if length == 0 {
        return Err(MemoryError::WindowsApiError(
            windows::core::Error::from_win32(),
        ));
    }

    buffer.truncate(length as usize);
    Ok(OsString::from_wide(&buffer).to_string_lossy().into_owned())
}

/// Full path of the module image
///
/// # Safety
/// The handle must be a valid process handle and module must be valid
pub unsafe fn get_module_file_name(handle: HANDLE, module: HMODULE) -> MemoryResult<PathBuf> {
    let mut buffer = vec![0u16; 32 * 1024];
    let length = GetModuleFileNameExW(handle, module, buffer.as_mut_ptr(), buffer.len() as u32);

    if length == 0 {
        return Err(MemoryError::WindowsApiError(
            windows::core::Error::from_win32(),
        ));
    }

    buffer.truncate(length as usize);
    Ok(PathBuf::from(OsString::from_wide(&buffer)))
}
