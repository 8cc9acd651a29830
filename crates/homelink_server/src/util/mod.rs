#![forbid(unsafe_code)]

pub mod bind;
pub mod time;
