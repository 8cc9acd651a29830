#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kinds of chat event sources a command can originate from.
///
/// A command's source is exactly one of these, never a combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
	User,
	Group,
	Room,
}

impl SourceKind {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			SourceKind::User => "user",
			SourceKind::Group => "group",
			SourceKind::Room => "room",
		}
	}
}

impl fmt::Display for SourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors for parsing identifiers and coded values from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty value")]
	Empty,
	#[error("unknown source kind: {0}")]
	UnknownSourceKind(String),
	#[error("unknown command kind: {0}")]
	UnknownCommandKind(String),
	#[error("invalid ban code: {0}")]
	InvalidBanCode(String),
}

impl FromStr for SourceKind {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"user" => Ok(SourceKind::User),
			"group" => Ok(SourceKind::Group),
			"room" => Ok(SourceKind::Room),
			other => Err(ParseError::UnknownSourceKind(other.to_string())),
		}
	}
}

/// Opaque identifier naming a chat user, group, or room.
///
/// Equality is by value; the registry deduplicates on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(String);

impl RecipientId {
	/// Create a non-empty `RecipientId`.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for RecipientId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for RecipientId {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RecipientId::new(s.to_string())
	}
}

/// Device command kinds that wait on a device reply.
///
/// Each kind owns exactly one pending-request set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
	Picture,
	Location,
	TvStatus,
}

impl CommandKind {
	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			CommandKind::Picture => "picture",
			CommandKind::Location => "location",
			CommandKind::TvStatus => "tv_status",
		}
	}

	/// All kinds, in a fixed order.
	pub const ALL: [CommandKind; 3] = [CommandKind::Picture, CommandKind::Location, CommandKind::TvStatus];
}

impl fmt::Display for CommandKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CommandKind {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"picture" => Ok(CommandKind::Picture),
			"location" => Ok(CommandKind::Location),
			"tv_status" | "tvstatus" => Ok(CommandKind::TvStatus),
			other => Err(ParseError::UnknownCommandKind(other.to_string())),
		}
	}
}

/// Persisted per-TV access flag.
///
/// Exactly two values exist at the storage boundary; any other persisted code
/// makes the TV invalid for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BanFlag {
	Allowed,
	Banned,
}

impl BanFlag {
	/// Stable storage/wire code ("0" allowed, "1" banned).
	pub const fn code(self) -> &'static str {
		match self {
			BanFlag::Allowed => "0",
			BanFlag::Banned => "1",
		}
	}

	/// Parse a storage/wire code; anything but the two sentinels is rejected.
	pub fn from_code(code: &str) -> Result<Self, ParseError> {
		match code.trim() {
			"0" => Ok(BanFlag::Allowed),
			"1" => Ok(BanFlag::Banned),
			other => Err(ParseError::InvalidBanCode(other.to_string())),
		}
	}

	/// The opposite flag (menu toggle target).
	pub const fn toggled(self) -> Self {
		match self {
			BanFlag::Allowed => BanFlag::Banned,
			BanFlag::Banned => BanFlag::Allowed,
		}
	}

	/// Human-readable label used in chat menus.
	pub const fn label(self) -> &'static str {
		match self {
			BanFlag::Allowed => "allowed",
			BanFlag::Banned => "banned",
		}
	}
}

impl fmt::Display for BanFlag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

/// Name of a TV appliance (string key into the durable store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TvName(String);

impl TvName {
	/// Create a non-empty `TvName`.
	pub fn new(name: impl Into<String>) -> Result<Self, ParseError> {
		let name = name.into();
		if name.trim().is_empty() {
			return Err(ParseError::Empty);
		}
		Ok(Self(name))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for TvName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for TvName {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		TvName::new(s.to_string())
	}
}
