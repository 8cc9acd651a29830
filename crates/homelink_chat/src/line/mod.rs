#![forbid(unsafe_code)]

mod client;

pub use client::LineClient;

/// Default platform API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.line.me";
