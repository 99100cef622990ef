//! Windows virtual memory implementation using VirtualAlloc/VirtualFree.

use core::ffi::c_void;

const MEM_COMMIT: u32 = 0x1000;
const MEM_RESERVE: u32 = 0x2000;
const MEM_RELEASE: u32 = 0x8000;
const PAGE_READWRITE: u32 = 0x04;

unsafe extern "system" {
    #[link_name = "VirtualAlloc"]
    fn virtual_alloc(
        lp_address: *mut c_void,
        dw_size: usize,
        fl_allocation_type: u32,
        fl_protect: u32,
    ) -> *mut c_void;

    #[link_name = "VirtualFree"]
    fn virtual_free(lp_address: *mut c_void, dw_size: usize, dw_free_type: u32) -> i32;

    #[link_name = "GetSystemInfo"]
    fn get_system_info(out: *mut SystemInfo);
}

#[repr(C)]
struct SystemInfo {
    processor_architecture: u16,
    reserved: u16,
    page_size: u32,
    min_app_addr: *mut c_void,
    max_app_addr: *mut c_void,
    active_processor_mask: usize,
    number_of_processors: u32,
    processor_type: u32,
    alloc_granularity: u32,
    processor_level: u16,
    processor_revision: u16,
}

pub fn page_size() -> usize {
    unsafe {
        let mut info: SystemInfo = core::mem::zeroed();
        get_system_info(&mut info);
        info.page_size as usize
    }
}

pub unsafe fn page_alloc(size: usize) -> *mut u8 {
    let ptr = unsafe {
        virtual_alloc(
            core::ptr::null_mut(),
            size,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        )
    };
    ptr as *mut u8
}

pub unsafe fn page_dealloc(ptr: *mut u8, _size: usize) {
    // MEM_RELEASE requires dwSize = 0 (releases the entire reservation).
    unsafe { virtual_free(ptr as *mut c_void, 0, MEM_RELEASE) };
}

/// Reserve `2 * size`, find the aligned sub-range, release the whole
/// reservation and re-reserve just the aligned window. Windows has no
/// partial-unmap primitive (unlike `munmap`), so unlike the Unix
/// implementation this cannot simply trim; it must free and retry, which is
/// racy against other allocations landing in the freed range. Acceptable
/// here because slab creation is already a cold, mutex-guarded path (see
/// `central_store`).
pub unsafe fn page_alloc_aligned(size: usize, align: usize) -> *mut u8 {
    loop {
        let probe =
            unsafe { virtual_alloc(core::ptr::null_mut(), size * 2, MEM_RESERVE, PAGE_READWRITE) };
        if probe.is_null() {
            return core::ptr::null_mut();
        }
        let probe_addr = probe as usize;
        let aligned_addr = (probe_addr + align - 1) & !(align - 1);
        unsafe { virtual_free(probe, 0, MEM_RELEASE) };

        let ptr = unsafe {
            virtual_alloc(
                aligned_addr as *mut c_void,
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        if !ptr.is_null() {
            return ptr as *mut u8;
        }
        // Another allocation raced us for the address; retry.
    }
}
