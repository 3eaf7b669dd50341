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

//! Question answering against a registered remote conversation.
//!
//! An [`AnswerPipeline`] call runs strictly in sequence:
//! - post the user's text to the conversation
//! - start an assistant run and wait for it to finish
//! - read back the newest assistant message
//! - rewrite its inline annotations into numbered citations
//!
//! Conversations must be registered through the session registry first;
//! asking never creates one implicitly.

mod citation;
mod pipeline;

pub use citation::{CitationMatcher, LiteralMatcher, OffsetMatcher, marker, render_answer};
pub use pipeline::{AnswerPipeline, AskConfig};
