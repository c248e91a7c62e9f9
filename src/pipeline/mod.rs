//! Pipeline stages for Word-to-PDF assembly.
//!
//! Each submodule implements exactly one step, so each can be tested on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ harvest ──▶ order ──▶ assemble ──────────▶ merge
//! (zip/dir)  (walkdir)   (regex)   (backend chain)     (lopdf)
//! ```
//!
//! 1. [`source`]: materialise the input (archive, folder, file list,
//!    uploads) inside a job workspace
//! 2. [`harvest`]: recursive `.doc`/`.docx` discovery with path dedup
//! 3. [`order`]: page-order keys from filenames, dedup, and the
//!    caller-confirmed reorder
//! 4. [`assemble`]: convert each document through the backend chain,
//!    tolerating per-document failures
//! 5. [`merge`]: concatenate the per-document PDFs; runs in
//!    `spawn_blocking` because lopdf is synchronous

pub mod assemble;
pub mod harvest;
pub mod merge;
pub mod order;
pub mod source;
