//! Database models split into domain-specific modules.
//!
//! This module re-exports all types so callers can use `crate::db::*`.

pub mod connection;
pub mod identity;
pub mod message;
pub mod post;
pub mod profile;
pub mod qna;
pub mod registration;
pub mod roster;

pub use connection::*;
pub use identity::*;
pub use message::*;
pub use post::*;
pub use profile::*;
pub use qna::*;
pub use registration::*;
pub use roster::*;

/// Fixed-width RFC 3339 timestamp, so text ordering matches time ordering
pub fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn timestamp_now() -> String {
    format_timestamp(chrono::Utc::now())
}
