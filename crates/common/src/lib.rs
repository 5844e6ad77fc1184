//! Shared error plumbing and small text helpers used across the mcpbox crates.

pub mod error;
pub mod text;

pub use {
    error::FromMessage,
    text::{preview, truncate_utf8},
};
