//! peereval-core — Data model, CSV import, scoring, and report tables.
//!
//! This crate defines the types and pure logic that the store, the
//! providers, and the CLI build on. It does no I/O beyond reading CSV text
//! handed to it.

pub mod error;
pub mod model;
pub mod nlp;
pub mod notify;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod traits;
