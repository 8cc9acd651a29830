#![forbid(unsafe_code)]

pub mod line;
pub mod messages;
pub mod signature;
pub mod webhook;

use core::fmt;

use async_trait::async_trait;
use homelink_domain::RecipientId;

use crate::messages::Message;

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl serde::Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<<S as serde::Serializer>::Ok, <S as serde::Serializer>::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str("")
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}

/// Chat user profile snapshot.
#[derive(Debug, Clone, Default)]
pub struct Profile {
	pub display_name: String,
}

/// Outbound chat surface used by the server.
///
/// The seam exists so dispatch/correlation logic can be tested against a
/// recording fake instead of the real platform API.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
	/// Reply to a webhook event using its one-shot reply token.
	async fn reply(&self, reply_token: &str, messages: Vec<Message>) -> anyhow::Result<()>;

	/// Push messages to a user/group/room without a reply token.
	async fn push(&self, to: &RecipientId, messages: Vec<Message>) -> anyhow::Result<()>;

	/// Look up a user's profile (display name).
	async fn profile(&self, user_id: &str) -> anyhow::Result<Profile>;
}
