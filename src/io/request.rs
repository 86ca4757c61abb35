use std::sync::{Arc, Condvar, Mutex};

type Outcome = std::result::Result<(), Arc<std::io::Error>>;

pub(crate) struct RequestState {
    outcome: Mutex<Option<Outcome>>,
    completed: Condvar,
}

impl RequestState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            completed: Condvar::new(),
        })
    }

    pub(crate) fn complete(&self, result: std::io::Result<()>) {
        let mut outcome = self.outcome.lock().expect("lock is poisoned");
        *outcome = Some(result.map_err(Arc::new));
        self.completed.notify_all();
    }
}

/// Handle to an in-flight asynchronous I/O request
///
/// Once submitted, a request always runs to completion; dropping the handle
/// does not cancel it. `wait` is idempotent: every call observes the same
/// outcome.
#[derive(Clone)]
pub struct Request {
    pub(crate) state: Arc<RequestState>,
    pub(crate) disk: usize,
    pub(crate) offset: u64,
    pub(crate) len: usize,
}

impl Request {
    /// Blocks until the request has completed and returns its outcome
    ///
    /// # Errors
    ///
    /// Will return `Err` if the driver reported a failure for this request's
    /// byte range. A short read surfaces as [`crate::Error::ShortRead`].
    pub fn wait(&self) -> crate::Result<()> {
        let mut outcome = self.state.outcome.lock().expect("lock is poisoned");

        while outcome.is_none() {
            outcome = self
                .state
                .completed
                .wait(outcome)
                .expect("lock is poisoned");
        }

        match outcome.as_ref().expect("outcome was checked above") {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(crate::Error::ShortRead {
                    disk: self.disk,
                    offset: self.offset,
                    wanted: self.len,
                    got: short_read_count(e),
                })
            }
            Err(e) => Err(crate::Error::Disk {
                disk: self.disk,
                offset: self.offset,
                len: self.len,
                source: Arc::clone(e),
            }),
        }
    }

    /// Returns `true` if the request has completed, without blocking
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state
            .outcome
            .lock()
            .expect("lock is poisoned")
            .is_some()
    }
}

pub(crate) fn short_read_error(got: usize) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, format!("{got}"))
}

fn short_read_count(e: &std::io::Error) -> usize {
    e.to_string().parse().unwrap_or(0)
}
