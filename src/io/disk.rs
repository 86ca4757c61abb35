use crate::config::{DiskSpec, DriverKind};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
    sync::Mutex,
};

/// Capability interface of a single backing store
///
/// Implementations perform blocking positional I/O; asynchrony is layered on
/// top by the per-disk submission queue. Reads and writes to disjoint byte
/// ranges may be issued concurrently from different queue threads; callers
/// must never issue overlapping in-flight requests.
pub trait Disk: Send + Sync + 'static {
    /// Reads into `buf` at `offset`, returning the number of bytes read
    ///
    /// A short count is only legal at end of file.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;

    /// Writes all of `buf` at `offset`, growing the store if needed
    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<()>;

    /// Truncates or extends the store
    fn set_size(&self, len: u64) -> std::io::Result<()>;

    /// Current size of the store in bytes
    fn size(&self) -> std::io::Result<u64>;
}

/// File-backed disk using seek + read/write syscalls
pub struct SyscallDisk {
    file: Mutex<File>,
    path: PathBuf,
    scratch: bool,
}

impl SyscallDisk {
    pub fn open(spec: &DiskSpec) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&spec.path)?;

        Ok(Self {
            file: Mutex::new(file),
            path: spec.path.clone(),
            scratch: spec.scratch,
        })
    }
}

impl Disk for SyscallDisk {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let mut file = self.file.lock().expect("lock is poisoned");
        file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }

        Ok(total)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<()> {
        let mut file = self.file.lock().expect("lock is poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }

    fn set_size(&self, len: u64) -> std::io::Result<()> {
        let file = self.file.lock().expect("lock is poisoned");
        file.set_len(len)
    }

    fn size(&self) -> std::io::Result<u64> {
        let file = self.file.lock().expect("lock is poisoned");
        Ok(file.metadata()?.len())
    }
}

impl Drop for SyscallDisk {
    fn drop(&mut self) {
        if self.scratch {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!(
                    "could not remove scratch file {}: {e:?}",
                    self.path.display()
                );
            }
        }
    }
}

/// RAM-backed disk, for tests
pub struct MemoryDisk {
    bytes: Mutex<Vec<u8>>,
}

impl MemoryDisk {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl Disk for MemoryDisk {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let bytes = self.bytes.lock().expect("lock is poisoned");

        let start = offset as usize;
        if start >= bytes.len() {
            return Ok(0);
        }

        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> std::io::Result<()> {
        let mut bytes = self.bytes.lock().expect("lock is poisoned");

        let end = offset as usize + buf.len();
        if bytes.len() < end {
            bytes.resize(end, 0);
        }

        bytes[offset as usize..end].copy_from_slice(buf);
        Ok(())
    }

    fn set_size(&self, len: u64) -> std::io::Result<()> {
        let mut bytes = self.bytes.lock().expect("lock is poisoned");
        bytes.resize(len as usize, 0);
        Ok(())
    }

    fn size(&self) -> std::io::Result<u64> {
        let bytes = self.bytes.lock().expect("lock is poisoned");
        Ok(bytes.len() as u64)
    }
}

/// Opens the driver configured for `spec`
pub fn open_disk(spec: &DiskSpec) -> std::io::Result<Box<dyn Disk>> {
    match spec.kind {
        DriverKind::Syscall => Ok(Box::new(SyscallDisk::open(spec)?)),
        DriverKind::Memory => Ok(Box::new(MemoryDisk::new())),
        DriverKind::Mmap => {
            // The mapped driver needs unsafe page aliasing the crate forbids;
            // serve the same contract through the syscall driver.
            log::warn!(
                "mmap driver requested for {}; using syscall driver",
                spec.path.display()
            );
            Ok(Box::new(SyscallDisk::open(spec)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn memory_disk_read_write() -> std::io::Result<()> {
        let disk = MemoryDisk::new();

        disk.write_at(b"hello", 10)?;
        assert_eq!(15, disk.size()?);

        let mut buf = [0u8; 5];
        assert_eq!(5, disk.read_at(&mut buf, 10)?);
        assert_eq!(b"hello", &buf);

        // short read past end
        assert_eq!(2, disk.read_at(&mut buf, 13)?);

        Ok(())
    }

    #[test]
    fn syscall_disk_roundtrip() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;

        let spec = DiskSpec {
            path: dir.path().join("blocks"),
            capacity_bytes: 1 << 20,
            kind: DriverKind::Syscall,
            scratch: false,
        };

        let disk = SyscallDisk::open(&spec)?;
        disk.write_at(&[7u8; 128], 4_096)?;

        let mut buf = [0u8; 128];
        assert_eq!(128, disk.read_at(&mut buf, 4_096)?);
        assert_eq!([7u8; 128], buf);

        Ok(())
    }
}
