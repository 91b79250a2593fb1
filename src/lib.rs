//! Google Drive upload sync library
//!
//! Keeps a local directory tree mirrored into Google Drive and manages the
//! OAuth credential needed to do so.

pub mod auth;
pub mod config;
pub mod drive_service;
pub mod error;
pub mod log_appender;
pub mod scheduler;
pub mod sync;
