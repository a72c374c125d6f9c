//! Frame clock adapter
//!
//! Wraps the platform's per-refresh timer behind [`TimerSource`]. The
//! default [`DisplayTimer`] drives ticks from a background thread at a fixed
//! refresh rate; hosts with a real display-link primitive install their own
//! source instead. Pausing stops tick delivery without tearing the thread
//! down, so demand changes are cheap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A pausable once-per-refresh tick source
pub trait TimerSource: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;
}

/// Background-thread tick source.
///
/// The callback receives seconds since `epoch` and may be invoked off the
/// primary execution context; returning false winds the thread down. The
/// thread is stopped and joined on drop.
pub struct DisplayTimer {
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DisplayTimer {
    pub fn spawn<F>(refresh_rate: u32, epoch: Instant, on_tick: F) -> Self
    where
        F: Fn(f64) -> bool + Send + 'static,
    {
        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let thread_paused = Arc::clone(&paused);
        let thread_stop = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let frame_duration = Duration::from_micros(1_000_000 / refresh_rate.max(1) as u64);

            while !thread_stop.load(Ordering::Relaxed) {
                let start = Instant::now();

                if !thread_paused.load(Ordering::Relaxed)
                    && !on_tick(epoch.elapsed().as_secs_f64())
                {
                    break;
                }

                // Sleep for remaining frame time
                let elapsed = start.elapsed();
                if elapsed < frame_duration {
                    thread::sleep(frame_duration - elapsed);
                }
            }
        });

        Self {
            paused,
            stop,
            handle: Some(handle),
        }
    }
}

impl TimerSource for DisplayTimer {
    fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

impl Drop for DisplayTimer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            // a timer torn down from inside its own tick callback cannot
            // join itself; the stop flag still winds the loop down
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
