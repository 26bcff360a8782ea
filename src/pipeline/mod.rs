//! Pipeline stages for deck ingestion.
//!
//! Each submodule implements one step; the external tools (office suite,
//! document converter, language model) each sit behind their own module so
//! the core stages stay testable without them.
//!
//! ## Data Flow
//!
//! ```text
//! office ──▶ document ──▶ segment ──▶ annotate ──▶ store
//! (PDF)      (Markdown)   (slides)    (LLM)        (JSON)
//! ```
//!
//! 1. [`office`]: headless LibreOffice, `.pptx` → `.pdf`
//! 2. [`document`]: external converter, `.pdf` → paginated Markdown + images
//! 3. [`segment`]: split the Markdown into per-slide records
//! 4. [`annotate`]: summaries and image captions; uses [`encode`] for image
//!    payloads, [`backend`] for the model call and [`postprocess`] to clean
//!    the answer
//! 5. [`store`]: `<stem>_metadata.json`, written atomically

pub mod annotate;
pub mod backend;
pub mod document;
pub mod encode;
pub mod office;
pub mod postprocess;
pub mod segment;
pub mod store;
