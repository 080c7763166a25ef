//! HTTP request handlers for the cecli listener.
//!
//! Every handler decodes its input before doing any work and answers
//! malformed requests with a JSON error body carrying the error code name.

pub mod ingest;

pub use ingest::{ingest_event, ErrorDetail, ErrorResponse};
