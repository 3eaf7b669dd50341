#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Local document storage and its reconciliation with the remote corpus.

mod file_store;
mod sync;

pub use file_store::FileStore;
pub use sync::{CorpusSync, IngestOutcome, SyncReport, UPLOAD_CONCURRENCY};
