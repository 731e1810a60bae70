use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counts jobs that were submitted but have not finished yet.
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn increment(&self) {
        *self.count.lock().expect("in-flight counter poisoned") += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().expect("in-flight counter poisoned");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_for_zero(&self) {
        let mut count = self.count.lock().expect("in-flight counter poisoned");
        while *count > 0 {
            count = self.idle.wait(count).expect("in-flight counter poisoned");
        }
    }
}

/// Fixed-size pool of worker threads fed through a channel.
///
/// Submitting never blocks the caller: the queue is unbounded, the number of threads is not.
/// Jobs run in arbitrary order across workers.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(InFlight::default());

        let workers = (0..threads)
            .map(|index| {
                let rx = Arc::clone(&rx);
                let in_flight = Arc::clone(&in_flight);
                thread::Builder::new()
                    .name(format!("wta-worker-{}", index))
                    .spawn(move || Self::worker_loop(rx, in_flight))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        log::debug!("Worker pool started with {} threads.", threads);

        WorkerPool { sender: Mutex::new(Some(tx)), workers: Mutex::new(workers), in_flight }
    }

    fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Job>>>, in_flight: Arc<InFlight>) {
        loop {
            // The guard is dropped before the job runs so other workers can pick up work.
            let next = rx.lock().expect("worker queue poisoned").recv();
            match next {
                Ok(job) => {
                    // A panicking job still counts as finished and keeps the worker alive.
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("A worker job panicked while emitting trace records.");
                    }
                    in_flight.decrement();
                }
                Err(_) => break,
            }
        }
    }

    /// Queues `job` for execution on one of the workers.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock().expect("worker sender poisoned");
        let sender = guard.as_ref().ok_or(Error::PoolClosed)?;

        self.in_flight.increment();
        if sender.send(Box::new(job)).is_err() {
            self.in_flight.decrement();
            return Err(Error::PoolClosed);
        }
        Ok(())
    }

    /// Blocks until every job submitted so far has finished.
    pub fn wait_idle(&self) {
        self.in_flight.wait_for_zero();
    }

    /// Stops accepting jobs, lets the queue drain and joins all workers.
    pub fn shutdown(&self) {
        self.sender.lock().expect("worker sender poisoned").take();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().expect("worker handles poisoned").drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                log::error!("A worker thread panicked while emitting trace records.");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_every_submitted_job() {
        let pool = WorkerPool::new(3);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn panicking_job_does_not_block_wait_idle() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.execute(|| panic!("emission failed")).unwrap();
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn rejects_jobs_after_shutdown() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        assert!(matches!(pool.execute(|| {}), Err(Error::PoolClosed)));
    }
}
