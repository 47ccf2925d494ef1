//! Foreign-memory access: the accessor capability and per-view handles.

use std::io;
use std::sync::{Arc, Mutex};

use strum::Display;

use crate::error::{Error, Result};

/// Direction of a failed remote operation, carried inside
/// [`Error::RemoteIo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MemOp {
    Read,
    Write,
}

/// Capability to read and write raw bytes at an address in some address
/// space. Opening and closing whatever is behind it is the owner's job;
/// views only borrow the capability.
///
/// Implementations must be safe for concurrent calls, or callers must
/// serialize; the core adds no locking around remote I/O.
pub trait MemoryAccessor: Send + Sync {
    fn read(&self, address: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write(&self, address: u64, data: &[u8]) -> io::Result<()>;
}

/// Shared accessor plus a base address for one view. Rebasing on navigation
/// clones the accessor handle, never the underlying session.
#[derive(Clone)]
pub struct RemoteHandle {
    accessor: Arc<dyn MemoryAccessor>,
    address: u64,
}

impl RemoteHandle {
    pub fn new(accessor: Arc<dyn MemoryAccessor>, address: u64) -> Self {
        RemoteHandle { accessor, address }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn rebase(&self, address: u64) -> Self {
        RemoteHandle {
            accessor: Arc::clone(&self.accessor),
            address,
        }
    }

    /// One read of exactly `buf.len()` bytes at `address`.
    pub fn read_at(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.accessor
            .read(address, buf)
            .map_err(|source| Error::RemoteIo {
                op: MemOp::Read,
                address,
                len: buf.len(),
                source,
            })
    }

    /// One write of exactly `data.len()` bytes at `address`.
    pub fn write_at(&self, address: u64, data: &[u8]) -> Result<()> {
        self.accessor
            .write(address, data)
            .map_err(|source| Error::RemoteIo {
                op: MemOp::Write,
                address,
                len: data.len(),
                source,
            })
    }

    pub fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(address, &mut buf)?;
        Ok(buf)
    }

    pub fn read_u64(&self, address: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_at(address, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl std::fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("address", &format_args!("{:#x}", self.address))
            .finish_non_exhaustive()
    }
}

/// The trivial accessor: a byte buffer in this process, mapped at a chosen
/// base address. Useful for tests and for replaying memory dumps.
pub struct BufferAccessor {
    base: u64,
    mem: Mutex<Vec<u8>>,
}

impl BufferAccessor {
    pub fn new(base: u64, mem: Vec<u8>) -> Self {
        BufferAccessor {
            base,
            mem: Mutex::new(mem),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    fn span(&self, address: u64, len: usize) -> io::Result<std::ops::Range<usize>> {
        let size = match self.mem.lock() {
            Ok(mem) => mem.len(),
            Err(_) => return Err(io::Error::other("buffer lock poisoned")),
        };
        let start = address
            .checked_sub(self.base)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))? as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= size)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        Ok(start..end)
    }
}

impl MemoryAccessor for BufferAccessor {
    fn read(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        let range = self.span(address, buf.len())?;
        let mem = self
            .mem
            .lock()
            .map_err(|_| io::Error::other("buffer lock poisoned"))?;
        buf.copy_from_slice(&mem[range]);
        Ok(())
    }

    fn write(&self, address: u64, data: &[u8]) -> io::Result<()> {
        let range = self.span(address, data.len())?;
        let mut mem = self
            .mem
            .lock()
            .map_err(|_| io::Error::other("buffer lock poisoned"))?;
        mem[range].copy_from_slice(data);
        Ok(())
    }
}

/// Accessor over a live Windows process. The handle is caller-supplied and
/// caller-owned; this type never opens or closes it.
#[cfg(target_os = "windows")]
pub struct ProcessAccessor {
    handle: windows::Win32::Foundation::HANDLE,
}

#[cfg(target_os = "windows")]
impl ProcessAccessor {
    /// The handle must have `PROCESS_VM_READ` (and `PROCESS_VM_WRITE` for
    /// writes) and must outlive this accessor.
    pub fn new(handle: windows::Win32::Foundation::HANDLE) -> Self {
        ProcessAccessor { handle }
    }
}

// HANDLE is a process-wide capability; concurrent ReadProcessMemory calls
// are safe on the OS side.
#[cfg(target_os = "windows")]
unsafe impl Send for ProcessAccessor {}
#[cfg(target_os = "windows")]
unsafe impl Sync for ProcessAccessor {}

#[cfg(target_os = "windows")]
impl MemoryAccessor for ProcessAccessor {
    fn read(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
        let mut read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const std::ffi::c_void,
                buf.as_mut_ptr() as *mut std::ffi::c_void,
                buf.len(),
                Some(&mut read as *mut usize),
            )
        }
        .map_err(|_| io::Error::last_os_error())?;
        if read != buf.len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        Ok(())
    }

    fn write(&self, address: u64, data: &[u8]) -> io::Result<()> {
        use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
        let mut written = 0usize;
        unsafe {
            WriteProcessMemory(
                self.handle,
                address as *const std::ffi::c_void,
                data.as_ptr() as *const std::ffi::c_void,
                data.len(),
                Some(&mut written as *mut usize),
            )
        }
        .map_err(|_| io::Error::last_os_error())?;
        if written != data.len() {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }
        Ok(())
    }
}
