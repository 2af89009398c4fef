//! HTTP front end for the stemsplit job supervisor.
//!
//! `POST /process` accepts a multipart upload and answers with a Server-Sent Events stream
//! carrying the job's progress, followed by a single `done` or `error` message.

pub mod config;
pub mod error;
pub mod routes;
pub mod wire;

pub use routes::{router, AppState};
