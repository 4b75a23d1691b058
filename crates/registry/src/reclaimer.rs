//! crates/registry/src/reclaimer.rs
//!
//! The background worker that performs deferred reclamation (spec
//! §4.I), grounded on `BuffetAlligator`'s garbage-collection thread in
//! `buffet_alligator.hpp`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::fabric::Fabric;

/// Recommended Reclaimer cycle interval absent an explicit
/// `GC_INTERVAL_MS` configuration (spec §4.I step 1: "1-10 ms").
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_millis(5);

/// Owns the single dedicated Reclaimer thread for one [`Fabric`].
///
/// Dropping a `Reclaimer` stops its thread but does not tear down the
/// fabric's buffers; call [`Reclaimer::shutdown`] for the full teardown
/// sequence the spec describes (join, then deallocate every still-live
/// slot regardless of retirement).
pub struct Reclaimer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    fabric: Arc<Fabric>,
}

impl Reclaimer {
    /// Spawns the Reclaimer thread, running one [`Fabric::reclaim_cycle`]
    /// per `interval`.
    #[must_use]
    pub fn spawn(fabric: Arc<Fabric>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_fabric = Arc::clone(&fabric);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("alligator-reclaimer".to_owned())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    let _reclaimed = thread_fabric.reclaim_cycle();
                    #[cfg(feature = "tracing")]
                    if _reclaimed > 0 {
                        tracing::debug!(reclaimed = _reclaimed, "reclaimer cycle");
                    }
                }
            })
            .expect("failed to spawn alligator-reclaimer thread");
        Self {
            stop,
            handle: Some(handle),
            fabric,
        }
    }

    /// Stops the thread, joins it, then deallocates every still-live
    /// slot regardless of retirement (spec §4.I "Shutdown").
    pub fn shutdown(mut self) {
        self.stop_and_join();
        self.fabric.deallocate_all();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
