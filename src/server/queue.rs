use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::errors::*;

/// Bounded FIFO feeding the worker pool. The queue is the only buffering
/// between connection threads (producers) and workers (consumers).
pub struct JobQueue<T> {
    jobs: Mutex<VecDeque<T>>,
    signal: Condvar,
    max_size: usize,
}

impl<T: Clone> JobQueue<T> {
    pub fn new(max_size: usize) -> JobQueue<T> {
        JobQueue {
            jobs: Mutex::new(VecDeque::new()),
            signal: Condvar::new(),
            max_size,
        }
    }

    /// Rejects with `QueueFull` at capacity; a successful push wakes every
    /// waiting consumer.
    pub fn push(&self, job: T) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.len() >= self.max_size {
            bail!(ErrorKind::QueueFull);
        }
        jobs.push_back(job);
        self.signal.notify_all();
        Ok(())
    }

    /// Block until work may be available. Returns immediately when the queue
    /// is non-empty; wakeups can be spurious, so callers re-wait when a
    /// subsequent `take` comes up empty.
    pub fn wait(&self) {
        let jobs = self.jobs.lock().unwrap();
        if jobs.is_empty() {
            let _jobs = self.signal.wait(jobs).unwrap();
        }
    }

    pub fn take(&self) -> Option<T> {
        self.jobs.lock().unwrap().pop_front()
    }

    /// Snapshot of pending jobs, front first.
    pub fn list(&self) -> Vec<T> {
        self.jobs.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new(10);
        for n in 0..5 {
            queue.push(n).unwrap();
        }
        for n in 0..5 {
            assert_eq!(queue.take(), Some(n));
        }
        assert_eq!(queue.take(), None);
    }

    #[test]
    fn test_overflow_rejected() {
        let queue = JobQueue::new(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        match queue.push(3) {
            Err(Error(ErrorKind::QueueFull, _)) => (),
            other => panic!("expected queue full, got {:?}", other),
        }
        // queue unchanged by the rejected push
        assert_eq!(queue.list(), vec![1, 2]);
    }

    #[test]
    fn test_push_wakes_waiter() {
        let queue = Arc::new(JobQueue::new(10));
        let consumer_queue = queue.clone();
        let consumer = thread::spawn(move || {
            loop {
                consumer_queue.wait();
                if let Some(job) = consumer_queue.take() {
                    return job;
                }
            }
        });
        thread::sleep(Duration::from_millis(50));
        queue.push(42).unwrap();
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn test_wait_returns_when_nonempty() {
        let queue = JobQueue::new(10);
        queue.push(1).unwrap();
        queue.wait();
        assert_eq!(queue.take(), Some(1));
    }
}
