//! External-memory algorithms and containers for data sets that exceed main
//! memory by orders of magnitude.
//!
//! The engine hands out fixed-size blocks across one or more disks, overlaps
//! I/O with computation through read/write pools and prefetch hints, and
//! keeps at most O(M/B) blocks resident at any time. On top of it sit:
//!
//! - [`ExtVec`]: a paged vector with a small direct-mapped block cache
//! - [`Sequence`]: a double-ended block sequence iterated only via streams
//! - [`stream`]: lazy pull-based dataflow operators (`Zip`, `Choose`,
//!   `Concatenate`, `Sort`, run creation/merging, `materialize`) that
//!   compose into sort-merge pipelines
//! - [`suffix`]: a difference-cover suffix-array builder, the reference
//!   consumer of the pipeline framework
//!
//! # Example usage
//!
//! ```
//! use extmem::{stream::{materialize, Sort}, Config, ExtVec};
//!
//! let manager = Config::memory(1 << 22).block_size(4_096).open()?;
//!
//! let mut input = ExtVec::<u64>::new(manager.clone());
//! for value in [5u64, 3, 8, 1, 9, 2, 7, 4, 6, 0] {
//!     input.push(value)?;
//! }
//!
//! // sort through external runs, honoring a 16 KiB memory budget
//! let sorted = Sort::new(
//!     manager.clone(),
//!     input.stream()?,
//!     |a: &u64, b: &u64| a.cmp(b),
//!     4 * 4_096,
//! )?;
//!
//! let mut output = ExtVec::<u64>::new(manager);
//! output.resize(10, false)?;
//! materialize(sorted, output.write_range(0, 10)?)?;
//!
//! assert_eq!(0, *output.get(0)?);
//! assert_eq!(9, *output.get(9)?);
//! #
//! # Ok::<(), extmem::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::multiple_crate_versions)]

pub mod block;
mod bufstream;
mod codec;
mod config;
mod error;
mod io;
mod pool;
mod sequence;
pub mod stream;
pub mod suffix;
mod vector;

pub use {
    block::{manager::BlockManager, strategy::AllocStrategy, BlockId},
    bufstream::{BufIstream, BufOstream},
    codec::{DecodeError, EncodeError, Record},
    config::{Config, DiskSpec, DriverKind, CONFIG_ENV},
    error::{Error, Result},
    io::{PendingIo, Request},
    pool::{PoolCensus, ReadWritePool},
    sequence::{SeqRevStream, SeqStream, Sequence},
    vector::{generate, pager::PagerKind, reader::VecReader, writer::VecWriter, ExtVec, VecOptions},
};
