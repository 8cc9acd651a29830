#![forbid(unsafe_code)]

use homelink_domain::{ParseError, RecipientId, SourceKind};
use serde::Deserialize;

/// Webhook request body: a batch of events, each handled independently.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
	#[serde(default)]
	pub events: Vec<WebhookEvent>,
}

/// One inbound webhook event.
///
/// Only `message` and `postback` carry behavior here; every other `type`
/// (follow, unfollow, join, ...) is a no-op for the dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
	#[serde(rename = "type")]
	pub kind: String,

	#[serde(rename = "replyToken", default)]
	pub reply_token: Option<String>,

	#[serde(default)]
	pub source: Option<EventSource>,

	#[serde(default)]
	pub message: Option<MessagePayload>,

	#[serde(default)]
	pub postback: Option<PostbackPayload>,
}

/// Event source: exactly one of user/group/room.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSource {
	#[serde(rename = "type")]
	pub kind: String,

	#[serde(rename = "userId", default)]
	pub user_id: Option<String>,

	#[serde(rename = "groupId", default)]
	pub group_id: Option<String>,

	#[serde(rename = "roomId", default)]
	pub room_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePayload {
	#[serde(rename = "type", default)]
	pub kind: String,

	#[serde(default)]
	pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostbackPayload {
	pub data: String,
}

impl EventSource {
	/// Resolve the recipient a reply-independent message must go to.
	///
	/// Group and room events address the group/room, not the individual sender.
	pub fn recipient(&self) -> Result<RecipientId, ParseError> {
		let kind: SourceKind = self.kind.parse()?;

		let id = match kind {
			SourceKind::User => self.user_id.as_deref(),
			SourceKind::Group => self.group_id.as_deref(),
			SourceKind::Room => self.room_id.as_deref(),
		};

		RecipientId::new(id.unwrap_or_default())
	}

	/// The individual sender, when the platform includes one.
	pub fn sender_user_id(&self) -> Option<&str> {
		self.user_id.as_deref().filter(|s| !s.trim().is_empty())
	}
}
