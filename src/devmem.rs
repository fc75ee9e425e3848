use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::ptr;

/// A shared mapping of physical memory through `/dev/mem` (or a UIO node).
///
/// The mapping is released on drop.
pub struct DevMem {
    map: *mut libc::c_void,
    map_len: usize,
    page_offset: usize,
}

impl DevMem {
    pub fn map(path: &str, phys_addr: u64, len: usize) -> Result<Self> {
        // SAFETY: sysconf takes no pointers and only reads a system constant
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return Err(anyhow!("Failed to query page size"));
        }
        let page_size = page_size as u64;
        let page_base = phys_addr & !(page_size - 1);
        let page_offset = (phys_addr - page_base) as usize;
        let map_len = page_offset + len;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)
            .context(format!("Failed to open memory device: {}", path))?;

        debug!(
            "Mapping {} byte(s) of {} at 0x{:x} (page 0x{:x})",
            map_len, path, phys_addr, page_base
        );
        // SAFETY: fresh mapping chosen by the kernel, fd stays open for the call
        let map = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                page_base as libc::off_t,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error())
                .context(format!("Failed to map 0x{:x} from {}", phys_addr, path));
        }

        info!("Mapped register block at 0x{:x}", phys_addr);
        Ok(DevMem {
            map,
            map_len,
            page_offset,
        })
    }

    /// Start of the requested physical range inside the mapping
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: page_offset < map_len, inside the mapping
        unsafe { self.map.cast::<u8>().add(self.page_offset) }
    }
}

impl Drop for DevMem {
    fn drop(&mut self) {
        // SAFETY: map/map_len come from the successful mmap in `map`
        unsafe {
            libc::munmap(self.map, self.map_len);
        }
    }
}
