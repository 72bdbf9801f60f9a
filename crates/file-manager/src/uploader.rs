//! Background upload worker, `spec.md` §4.8.5: drains the persistent
//! queue, waiting for in-flight modifications to settle before pushing
//! bytes to the provider.

use crate::registry::OpenFileRegistry;
use events::types::{FileUploadCompleted, FileUploadRemoved, FileUploadRetry};
use events::EventBus;
use provider::{FileManagerConfig, Provider, RepertoryError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use sync::Throttle;
use upload_queue::UploadQueue;

/// Owns the background thread that drains [`UploadQueue`] and pushes
/// completed writes to a [`Provider`].
pub struct Uploader {
    stop: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Uploader {
    /// Spawns the worker thread. Call [`Uploader::shutdown`] to stop it
    /// before dropping the returned handle.
    #[must_use]
    pub fn spawn(
        queue: Arc<UploadQueue>,
        provider: Arc<dyn Provider>,
        registry: Arc<OpenFileRegistry>,
        bus: Arc<EventBus>,
        config: FileManagerConfig,
    ) -> Arc<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let throttle = Arc::new(Throttle::new(config.max_concurrent_uploads.max(1)));

        let worker_stop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            run_loop(&queue, provider.as_ref(), &registry, &bus, &config, &throttle, &worker_stop);
        });

        Arc::new(Self {
            stop,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Signals the worker to stop and joins it.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    queue: &UploadQueue,
    provider: &dyn Provider,
    registry: &OpenFileRegistry,
    bus: &EventBus,
    config: &FileManagerConfig,
    throttle: &Throttle,
    stop: &AtomicBool,
) {
    let poll_interval = Duration::from_secs(config.upload_poll_interval_secs.max(1));
    let quiescence_window = Duration::from_secs(config.upload_quiescence_window_secs);

    while !stop.load(Ordering::SeqCst) {
        match queue.dequeue() {
            Ok(Some(entry)) => {
                if let Some(open_file) = registry.get(&entry.api_path) {
                    if open_file.is_modified() && open_file.get_open_file_count() > 0 {
                        std::thread::sleep(quiescence_window);
                        continue;
                    }
                }

                throttle.acquire();
                let result = provider.upload(&entry.api_path, &entry.source_path);
                throttle.release();

                match result {
                    Ok(()) => {
                        if let Err(error) = queue.complete(&entry.api_path) {
                            tracing_if_enabled(&error);
                        }
                        if let Some(open_file) = registry.get(&entry.api_path) {
                            open_file.clear_modified();
                        }
                        bus.publish(FileUploadCompleted {
                            api_path: entry.api_path.clone(),
                            source_path: entry.source_path.clone(),
                        });
                    }
                    Err(error) => {
                        let next_attempts = entry.attempts + 1;
                        if next_attempts >= config.max_upload_attempts {
                            let _ = queue.remove(&entry.api_path);
                            bus.publish(FileUploadRemoved {
                                api_path: entry.api_path.clone(),
                                reason: error.to_string(),
                            });
                        } else {
                            let _ = queue.retry(&entry.api_path);
                            bus.publish(FileUploadRetry {
                                api_path: entry.api_path.clone(),
                                attempts: next_attempts,
                                reason: error.to_string(),
                            });
                            std::thread::sleep(backoff_for(next_attempts));
                        }
                    }
                }
            }
            Ok(None) => std::thread::sleep(poll_interval),
            Err(_) => std::thread::sleep(poll_interval),
        }
    }
}

fn backoff_for(attempts: u32) -> Duration {
    Duration::from_millis(200_u64.saturating_mul(1 << attempts.min(8)))
}

fn tracing_if_enabled(_error: &RepertoryError) {
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %_error, "upload queue completion failed");
}
