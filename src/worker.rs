// src/worker.rs - Off-thread measurement for callers that must not block

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::cache::MeasurementCache;
use crate::config::Config;
use crate::errors::{ContactAngleError, Result};
use crate::image_utils::PixelBuffer;
use crate::pipeline::{measure_buffer, measure_with_cache, AngleResult, ContactAnalysis};

/// Pending result of a submitted measurement. Dropping it discards the result.
pub struct MeasurementTask {
    receiver: Receiver<Result<AngleResult>>,
}

impl MeasurementTask {
    /// Block until the measurement finishes
    pub fn wait(self) -> Result<AngleResult> {
        self.receiver
            .recv()
            .map_err(|_| ContactAngleError::Worker("measurement thread exited without a result".to_string()))?
    }

    /// Block for at most `timeout`; `None` if the measurement is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<AngleResult>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(ContactAngleError::Worker(
                "measurement thread exited without a result".to_string(),
            ))),
        }
    }
}

/// Runs whole measurements on a dedicated rayon pool
pub struct MeasurementWorker {
    pool: rayon::ThreadPool,
    cache: Option<Arc<MeasurementCache<ContactAnalysis>>>,
}

impl MeasurementWorker {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("contact-angle-{}", i))
            .build()
            .map_err(|e| ContactAngleError::Worker(e.to_string()))?;
        Ok(Self { pool, cache: None })
    }

    /// Share `cache` between every measurement run by this worker
    pub fn with_cache(mut self, cache: Arc<MeasurementCache<ContactAnalysis>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn submit(&self, buffer: PixelBuffer, config: Config) -> MeasurementTask {
        let (sender, receiver) = mpsc::channel();
        let cache = self.cache.clone();
        self.pool.spawn(move || {
            let result = match cache {
                Some(cache) => measure_with_cache(&buffer, &config, &cache),
                None => measure_buffer(&buffer, &config),
            };
            if sender.send(result).is_err() {
                debug!("worker: task dropped before completion, result discarded");
            }
        });
        MeasurementTask { receiver }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(vec![128; (width * height * 4) as usize], width, height).unwrap()
    }

    #[test]
    fn failures_come_back_through_the_task() {
        let worker = MeasurementWorker::new(2).unwrap();
        let task = worker.submit(blank(48, 48), Config::default());
        assert!(matches!(task.wait(), Err(ContactAngleError::EmptyMask)));
    }

    #[test]
    fn dropped_tasks_do_not_poison_the_pool() {
        let worker = MeasurementWorker::new(1).unwrap();
        drop(worker.submit(blank(32, 32), Config::default()));
        let task = worker.submit(blank(32, 32), Config::default());
        assert!(task.wait().is_err());
        assert_eq!(worker.threads(), 1);
    }
}
