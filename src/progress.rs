//! Progress-callback trait for per-page transcription events.
//!
//! Inject an [`Arc<dyn PageProgressCallback>`] via
//! [`crate::config::TranscribeConfigBuilder::progress_callback`] to receive
//! events as the driver works through the page images. The `pages2md` binary
//! uses it to drive an `indicatif` progress bar; library callers can forward
//! events anywhere without the driver knowing how.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docprep::{PageProgressCallback, TranscribeConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PageProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, _secs: f64, _len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done", page_num, total_pages);
//!     }
//! }
//!
//! let config = TranscribeConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the transcription driver as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are processed strictly in order.
pub trait PageProgressCallback: Send + Sync {
    /// Called once after the images are collected, before the model runs.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the model is asked about a page.
    ///
    /// # Arguments
    /// * `page_num`   : 1-based page number
    /// * `total_pages`: number of pages in the run
    /// * `image_name` : file name of the page image
    fn on_page_start(&self, page_num: usize, total_pages: usize, image_name: &str) {
        let _ = (page_num, total_pages, image_name);
    }

    /// Called after a page's block has been written and flushed.
    ///
    /// # Arguments
    /// * `elapsed_secs`: model time for this page
    /// * `markdown_len`: byte length of the written block
    fn on_page_complete(
        &self,
        page_num: usize,
        total_pages: usize,
        elapsed_secs: f64,
        markdown_len: usize,
    ) {
        let _ = (page_num, total_pages, elapsed_secs, markdown_len);
    }

    /// Called once after the last page has been written.
    fn on_run_complete(&self, total_pages: usize, total_secs: f64) {
        let _ = (total_pages, total_secs);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TranscribeConfig`].
pub type ProgressCallback = Arc<dyn PageProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        total: AtomicUsize,
    }

    impl PageProgressCallback for TrackingCallback {
        fn on_run_start(&self, total_pages: usize) {
            self.total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page_num: usize, _total_pages: usize, _image_name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _p: usize, _t: usize, _secs: f64, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_page_start(1, 2, "a.jpg");
        cb.on_page_complete(1, 2, 0.5, 10);
        cb.on_run_complete(2, 1.0);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_run_start(3);
        for p in 1..=3 {
            tracker.on_page_start(p, 3, "x.png");
            tracker.on_page_complete(p, 3, 0.1, 42);
        }
        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 3);
    }
}
