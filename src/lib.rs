//! Guestbook ingestion pipeline.
//!
//! Submissions are validated, stored durably, and then announced on a queue
//! on a best-effort basis. A separate consumer turns queued events into email
//! notifications.

pub mod config;
pub mod consumer;
pub mod db;
pub mod http;
pub mod mailer;
pub mod model;
pub mod parameters;
pub mod queue;
pub mod relay;
pub mod service;
pub mod validate;
