//! Progress-callback trait for batch and enrichment events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] (or
//! [`crate::enrich::MetadataEnricher::with_progress`]) to receive events as
//! decks are processed and slides are annotated.
//!
//! Callers forward events wherever they like: a terminal progress bar, a log
//! sink, a channel. The library knows nothing about how the host presents
//! them. Events arrive in document order because the pipeline is sequential.
//!
//! # Example
//!
//! ```rust
//! use deckmeta::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     summaries: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_summary_done(&self, slide_index: usize, total_slides: usize, generated: bool) {
//!         self.summaries.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("slide {}/{} summarised: {}", slide_index + 1, total_slides, generated);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { summaries: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes files and annotates slides.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. File indices are 1-based; slide and image indices
/// are 0-based like [`crate::output::SlideRecord::index`].
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first file of a batch.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is processed.
    fn on_file_start(&self, path: &Path, file_num: usize, total_files: usize) {
        let _ = (path, file_num, total_files);
    }

    /// Called when a file's metadata has been written.
    fn on_file_complete(&self, path: &Path, file_num: usize, total_files: usize) {
        let _ = (path, file_num, total_files);
    }

    /// Called when a file fails; the batch moves on to the next file.
    fn on_file_error(&self, path: &Path, file_num: usize, total_files: usize, error: &str) {
        let _ = (path, file_num, total_files, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }

    /// Called after the unenriched document is written, before the first
    /// model request.
    ///
    /// * `summaries`: slides with text, i.e. summary requests to come
    /// * `images`: image references across all slides
    fn on_enrichment_start(&self, markdown_path: &Path, summaries: usize, images: usize) {
        let _ = (markdown_path, summaries, images);
    }

    /// Called after each summary request, successful or not.
    fn on_summary_done(&self, slide_index: usize, total_slides: usize, generated: bool) {
        let _ = (slide_index, total_slides, generated);
    }

    /// Called for every image reference once descriptions are merged.
    fn on_image_described(&self, image_index: usize, total_images: usize, generated: bool) {
        let _ = (image_index, total_images, generated);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        files_started: AtomicUsize,
        files_completed: AtomicUsize,
        files_failed: AtomicUsize,
        batch_success: AtomicUsize,
        summaries_generated: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_file_start(&self, _path: &Path, _file_num: usize, _total_files: usize) {
            self.files_started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _path: &Path, _file_num: usize, _total_files: usize) {
            self.files_completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _path: &Path, _file_num: usize, _total_files: usize, _error: &str) {
            self.files_failed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total_files: usize, success_count: usize) {
            self.batch_success.store(success_count, Ordering::SeqCst);
        }

        fn on_summary_done(&self, _slide_index: usize, _total_slides: usize, generated: bool) {
            if generated {
                self.summaries_generated.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_file_start(Path::new("a.pptx"), 1, 2);
        cb.on_enrichment_start(Path::new("a.md"), 3, 1);
        cb.on_summary_done(0, 3, true);
        cb.on_image_described(0, 1, false);
        cb.on_file_complete(Path::new("a.pptx"), 1, 2);
        cb.on_file_error(Path::new("b.pptx"), 2, 2, "conversion failed");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_file_start(Path::new("a.pptx"), 1, 2);
        tracker.on_summary_done(0, 2, true);
        tracker.on_summary_done(1, 2, false);
        tracker.on_file_complete(Path::new("a.pptx"), 1, 2);
        tracker.on_file_start(Path::new("b.pptx"), 2, 2);
        tracker.on_file_error(Path::new("b.pptx"), 2, 2, "soffice exited with 1");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.files_started.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.files_completed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.files_failed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.batch_success.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.summaries_generated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_image_described(3, 10, true);
    }
}
