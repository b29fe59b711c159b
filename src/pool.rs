//! Fixed-size worker thread pool for block decompression.
//!
//! A plain `std::thread` + `crossbeam_channel` pool, sized once at startup
//! (`Config::worker_threads`, defaulting to `num_cpus::get()`) rather than
//! grown or shrunk at runtime — decode work is CPU-bound and short-lived,
//! so there is nothing an async runtime would buy here that a bounded pool
//! of OS threads doesn't already give for free.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};

use crate::config::Config;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Pool {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("seekzip-worker-{id}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })
                .expect("failed to spawn decompression worker thread");
            workers.push(handle);
        }
        Pool { sender, workers }
    }

    pub fn sized_for(config: &Config) -> Self {
        Self::new(config.worker_threads.unwrap_or_else(num_cpus::get))
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        // The pool never shuts down its receiver while a `Pool` is alive,
        // so a send error here would mean every worker thread panicked.
        let _ = self.sender.send(Box::new(job));
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}
