#![forbid(unsafe_code)]

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindParseError {
	#[error("bind endpoint must be non-empty (expected ws://ip:port)")]
	Empty,

	#[error("bind endpoint must start with ws:// : {0}")]
	MissingScheme(String),

	#[error("bind endpoint must be ws://ip:port with no path, query, or fragment: {0}")]
	TrailingInput(String),

	#[error("bind endpoint must be an IP literal with a non-zero port (DNS names are not bindable): {0}")]
	BadAddress(String),
}

/// Parse the device-channel bind argument `ws://ip:port` into a socket address.
///
/// The listener binds the address directly, so the host must be an IP literal
/// (IPv6 bracketed, e.g. `ws://[::1]:9030`) and the port non-zero.
pub fn parse_ws_bind(s: &str) -> Result<SocketAddr, BindParseError> {
	let s = s.trim();
	if s.is_empty() {
		return Err(BindParseError::Empty);
	}

	let rest = s
		.strip_prefix("ws://")
		.ok_or_else(|| BindParseError::MissingScheme(s.to_string()))?;

	if rest.contains('/') || rest.contains('?') || rest.contains('#') {
		return Err(BindParseError::TrailingInput(s.to_string()));
	}

	let addr: SocketAddr = rest.parse().map_err(|_| BindParseError::BadAddress(s.to_string()))?;

	if addr.port() == 0 {
		return Err(BindParseError::BadAddress(s.to_string()));
	}

	Ok(addr)
}
