use super::{
    disk::Disk,
    request::{short_read_error, Request, RequestState},
};
use crate::block::BlockBuf;
use std::sync::{
    mpsc::{sync_channel, Receiver, Sender, SyncSender},
    Arc,
};

const EAGAIN_RETRIES: usize = 3;

enum Job {
    Read {
        buf: BlockBuf,
        offset: u64,
        state: Arc<RequestState>,
        ret: SyncSender<BlockBuf>,
    },
    Write {
        buf: BlockBuf,
        offset: u64,
        state: Arc<RequestState>,
        ret: SyncSender<BlockBuf>,
    },
}

/// An in-flight block transfer whose buffer is owned by the driver until
/// completion
///
/// `wait` consumes the handle and returns the buffer, so a buffer can never
/// be observed while its request is still running. The underlying
/// [`Request`] can be cloned out for waiters that do not need the buffer.
pub struct PendingIo {
    request: Request,
    slot: Receiver<BlockBuf>,
}

impl PendingIo {
    /// Returns a waitable handle to the underlying request
    #[must_use]
    pub fn request(&self) -> Request {
        self.request.clone()
    }

    /// Returns `true` if the transfer has completed, without blocking
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.request.is_done()
    }

    /// Blocks until the transfer completes, then returns the buffer
    ///
    /// # Errors
    ///
    /// Will return `Err` if the driver reported a failure; the buffer is
    /// abandoned in that case and callers allocate a replacement on demand.
    pub fn wait(self) -> crate::Result<BlockBuf> {
        self.request.wait()?;
        Ok(self.slot.recv().expect("driver must return the buffer"))
    }

    /// Reclaims the buffer if the transfer has already completed
    ///
    /// # Errors
    ///
    /// Will return `Err` with the untouched handle if the transfer is still
    /// in flight.
    pub fn try_wait(self) -> std::result::Result<crate::Result<BlockBuf>, Self> {
        if self.is_done() {
            Ok(self.wait())
        } else {
            Err(self)
        }
    }
}

/// Submission queue of one disk: a background thread draining blocking I/O
/// jobs in order
pub(crate) struct DiskQueue {
    tx: Option<Sender<Job>>,
    worker: Option<std::thread::JoinHandle<()>>,
    disk_index: usize,
}

impl DiskQueue {
    pub(crate) fn spawn(disk_index: usize, disk: Arc<dyn Disk>) -> Self {
        let (tx, rx) = std::sync::mpsc::channel::<Job>();

        let worker = std::thread::Builder::new()
            .name(format!("extmem-disk-{disk_index}"))
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    run_job(&*disk, job);
                }
                log::trace!("disk queue {disk_index} drained, exiting");
            })
            .expect("should spawn disk queue thread");

        Self {
            tx: Some(tx),
            worker: Some(worker),
            disk_index,
        }
    }

    pub(crate) fn submit_read(&self, buf: BlockBuf, offset: u64) -> PendingIo {
        let state = RequestState::new();
        let request = Request {
            state: Arc::clone(&state),
            disk: self.disk_index,
            offset,
            len: buf.len(),
        };

        let (ret, slot) = sync_channel(1);
        self.tx
            .as_ref()
            .expect("queue is alive")
            .send(Job::Read {
                buf,
                offset,
                state,
                ret,
            })
            .expect("disk queue thread is alive");

        PendingIo { request, slot }
    }

    pub(crate) fn submit_write(&self, buf: BlockBuf, offset: u64) -> PendingIo {
        let state = RequestState::new();
        let request = Request {
            state: Arc::clone(&state),
            disk: self.disk_index,
            offset,
            len: buf.len(),
        };

        let (ret, slot) = sync_channel(1);
        self.tx
            .as_ref()
            .expect("queue is alive")
            .send(Job::Write {
                buf,
                offset,
                state,
                ret,
            })
            .expect("disk queue thread is alive");

        PendingIo { request, slot }
    }
}

impl Drop for DiskQueue {
    fn drop(&mut self) {
        drop(self.tx.take());

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("disk queue {} thread panicked", self.disk_index);
            }
        }
    }
}

fn run_job(disk: &dyn Disk, job: Job) {
    match job {
        Job::Read {
            mut buf,
            offset,
            state,
            ret,
        } => {
            let result = retrying(|| disk.read_at(&mut buf, offset)).and_then(|n| {
                if n == buf.len() {
                    Ok(())
                } else {
                    Err(short_read_error(n))
                }
            });

            // The buffer travels back before completion is published, so a
            // successful wait always finds it in the slot.
            let _ = ret.send(buf);
            state.complete(result);
        }
        Job::Write {
            buf,
            offset,
            state,
            ret,
        } => {
            let result = retrying(|| disk.write_at(&buf, offset).map(|()| 0usize)).map(|_| ());

            let _ = ret.send(buf);
            state.complete(result);
        }
    }
}

fn retrying(mut op: impl FnMut() -> std::io::Result<usize>) -> std::io::Result<usize> {
    let mut attempts = 0;

    loop {
        match op() {
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock && attempts < EAGAIN_RETRIES =>
            {
                attempts += 1;
                log::trace!("disk op returned EAGAIN, retry {attempts}");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::disk::MemoryDisk;
    use test_log::test;

    #[test]
    fn write_then_read_roundtrip() -> crate::Result<()> {
        let disk = Arc::new(MemoryDisk::new());
        let queue = DiskQueue::spawn(0, disk);

        let buf = BlockBuf::zeroed(256).filled(0xAB);
        let write = queue.submit_write(buf, 1_024);
        let buf = write.wait()?;

        let read = queue.submit_read(buf, 1_024);
        let buf = read.wait()?;
        assert!(buf.iter().all(|b| *b == 0xAB));

        Ok(())
    }

    #[test]
    fn short_read_is_reported() {
        let disk = Arc::new(MemoryDisk::new());
        let queue = DiskQueue::spawn(0, disk);

        let read = queue.submit_read(BlockBuf::zeroed(256), 0);
        let err = read.wait().expect_err("empty disk read must be short");

        assert!(matches!(
            err,
            crate::Error::ShortRead {
                wanted: 256,
                got: 0,
                ..
            }
        ));
    }
}
