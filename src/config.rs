use crate::block::manager::BlockManager;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Environment variable pointing at a JSON config file
pub const CONFIG_ENV: &str = "EXTMEM_CONFIG";

/// Default size of an external-memory block in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 1_024 * 1_024;

const DEFAULT_SCRATCH_CAPACITY: u64 = 1_024 * 1_024 * 1_024;

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Kind of driver backing a disk
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Blocking positional reads and writes on a background thread
    Syscall,

    /// RAM-backed store, for tests
    Memory,

    /// Memory-mapped file
    Mmap,
}

/// A single backing store for external-memory blocks
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DiskSpec {
    /// File path of the backing store (ignored for `memory` disks)
    pub path: PathBuf,

    /// Capacity in bytes; allocation fails once this is exhausted
    pub capacity_bytes: u64,

    /// Driver kind
    pub kind: DriverKind,

    /// Whether the backing file is scratch and should be removed on shutdown
    #[serde(default)]
    pub scratch: bool,
}

impl DiskSpec {
    /// Creates a scratch disk spec backed by a fresh file in the system
    /// temporary directory
    #[must_use]
    pub fn scratch(capacity_bytes: u64) -> Self {
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "extmem-scratch-{}-{n}",
            std::process::id()
        ));

        Self {
            path,
            capacity_bytes,
            kind: DriverKind::Syscall,
            scratch: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
/// Engine configuration
///
/// Declares the ordered list of disks blocks are spread over, and the block
/// size every container and stream built on top of the engine uses.
pub struct Config {
    /// Ordered list of disks
    pub disks: Vec<DiskSpec>,

    /// Size of one block in bytes
    pub block_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disks: vec![DiskSpec::scratch(DEFAULT_SCRATCH_CAPACITY)],
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Config {
    /// Initializes a config with a single scratch disk of the given capacity
    #[must_use]
    pub fn scratch(capacity_bytes: u64) -> Self {
        Self {
            disks: vec![DiskSpec::scratch(capacity_bytes)],
            ..Default::default()
        }
    }

    /// Initializes a config with a single RAM-backed disk, for tests
    #[must_use]
    pub fn memory(capacity_bytes: u64) -> Self {
        Self {
            disks: vec![DiskSpec {
                path: PathBuf::new(),
                capacity_bytes,
                kind: DriverKind::Memory,
                scratch: false,
            }],
            ..Default::default()
        }
    }

    /// Loads the config from the file named by the `EXTMEM_CONFIG`
    /// environment variable, falling back to a scratch-disk default
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file exists but cannot be read or parsed.
    pub fn from_env() -> crate::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Loads the config from a JSON file
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file cannot be read or parsed, or if the
    /// parsed config is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Adds a disk
    #[must_use]
    pub fn disk(mut self, spec: DiskSpec) -> Self {
        self.disks.push(spec);
        self
    }

    /// Replaces the disk list
    #[must_use]
    pub fn disks(mut self, disks: Vec<DiskSpec>) -> Self {
        self.disks = disks;
        self
    }

    /// Sets the block size.
    ///
    /// Defaults to 1 MiB.
    ///
    /// # Panics
    ///
    /// Panics if the block size is smaller than 64 bytes.
    #[must_use]
    pub fn block_size(mut self, block_size: usize) -> Self {
        assert!(block_size >= 64);

        self.block_size = block_size;
        self
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.disks.is_empty() {
            return Err(crate::Error::BadConfig("no disks configured".into()));
        }

        if self.block_size < 64 {
            return Err(crate::Error::BadConfig(format!(
                "block size {} is too small",
                self.block_size
            )));
        }

        for (idx, disk) in self.disks.iter().enumerate() {
            if disk.capacity_bytes < self.block_size as u64 {
                return Err(crate::Error::BadConfig(format!(
                    "disk {idx} cannot hold a single block"
                )));
            }
        }

        Ok(())
    }

    /// Opens a block manager using the config.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the config is invalid or a backing file cannot
    /// be opened.
    pub fn open(self) -> crate::Result<Arc<BlockManager>> {
        BlockManager::open(self)
    }
}
