//! Progress-callback trait for per-page render events.
//!
//! Pass an [`Arc<dyn RenderProgress>`] to [`crate::pipeline::render::render_document`]
//! to receive events while a document is rasterised. The server does not use
//! it; the CLI drives an `indicatif` bar from it.
//!
//! Rendering happens on a blocking thread, so implementations must be
//! `Send + Sync`. Every method has a no-op default.
//!
//! # Example
//!
//! ```rust
//! use pdf2zip::RenderProgress;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl RenderProgress for Counter {
//!     fn on_page_rendered(&self, ordinal: usize, total: usize, bytes: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page_{ordinal} of {total}: {bytes} bytes");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the render pipeline as it processes each selected page.
pub trait RenderProgress: Send + Sync {
    /// Called once, after the document opened, before the first page.
    fn on_render_start(&self, total: usize) {
        let _ = total;
    }

    /// Called after a page has been rendered and encoded.
    ///
    /// # Arguments
    /// * `ordinal`: 1-based position in the selection (the archive name)
    /// * `total`  : number of selected pages
    /// * `bytes`  : encoded image size
    fn on_page_rendered(&self, ordinal: usize, total: usize, bytes: usize) {
        let _ = (ordinal, total, bytes);
    }

    /// Called once after every page rendered successfully.
    fn on_render_complete(&self, total: usize) {
        let _ = total;
    }
}

/// A no-op implementation, used when no callback is supplied.
pub struct NoopRenderProgress;

impl RenderProgress for NoopRenderProgress {}

/// Convenience alias for a shared callback.
pub type ProgressCallback = Arc<dyn RenderProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingProgress {
        started_total: AtomicUsize,
        rendered: AtomicUsize,
        bytes: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl RenderProgress for TrackingProgress {
        fn on_render_start(&self, total: usize) {
            self.started_total.store(total, Ordering::SeqCst);
        }

        fn on_page_rendered(&self, _ordinal: usize, _total: usize, bytes: usize) {
            self.rendered.fetch_add(1, Ordering::SeqCst);
            self.bytes.fetch_add(bytes, Ordering::SeqCst);
        }

        fn on_render_complete(&self, total: usize) {
            self.completed_total.store(total, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_progress_does_not_panic() {
        let cb = NoopRenderProgress;
        cb.on_render_start(5);
        cb.on_page_rendered(1, 5, 42);
        cb.on_render_complete(5);
    }

    #[test]
    fn tracking_progress_receives_events() {
        let tracker = TrackingProgress {
            started_total: AtomicUsize::new(0),
            rendered: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
            completed_total: AtomicUsize::new(0),
        };

        tracker.on_render_start(2);
        tracker.on_page_rendered(1, 2, 100);
        tracker.on_page_rendered(2, 2, 200);
        tracker.on_render_complete(2);

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.rendered.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.bytes.load(Ordering::SeqCst), 300);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_progress_works() {
        let cb: ProgressCallback = Arc::new(NoopRenderProgress);
        cb.on_render_start(10);
        cb.on_page_rendered(1, 10, 512);
    }
}
