//! Ingestion worker (spec.md §4.6): consumes `document.uploaded`, runs
//! parse -> chunk -> embed -> upsert, and maintains the document status
//! state machine. `pipeline` holds the per-document logic; `worker` is the
//! long-running consumer loop with bounded concurrency and graceful
//! shutdown.

pub mod chunker;
pub mod parser;
pub mod pipeline;
pub mod worker;
