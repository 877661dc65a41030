//! Page-level building blocks shared by the splitter and the transcriber.
//!
//! ```text
//! PDF ──▶ render ──▶ encode ──▶ *.jpg        (pdf-split)
//! *.jpg ──▶ collect ──▶ encode ──▶ llm ──▶ .md (pages2md)
//! ```
//!
//! 1. [`render`]: rasterise a PDF with pdfium (`spawn_blocking`) or with
//!    Poppler child processes
//! 2. [`encode`]: JPEG files out, base64 `ImageData` in
//! 3. [`collect`]: list a page directory in numeric page order
//! 4. [`llm`]: the [`llm::VisionModel`] seam and its `edgequake-llm`
//!    implementation; the only stage with network I/O

pub mod collect;
pub mod encode;
pub mod llm;
pub mod render;
