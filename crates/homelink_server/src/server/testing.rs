#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use homelink_chat::messages::Message;
use homelink_chat::{ChatApi, Profile};
use homelink_domain::RecipientId;

/// Recording `ChatApi` fake for dispatcher and correlator tests.
#[derive(Default)]
pub struct FakeChat {
	pub replies: Mutex<Vec<(String, Vec<Message>)>>,
	pub pushes: Mutex<Vec<(RecipientId, Vec<Message>)>>,
	profiles: Mutex<HashMap<String, String>>,
	profile_delay: Option<Duration>,
}

impl FakeChat {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_profile(self, user_id: &str, display_name: &str) -> Self {
		if let Ok(mut profiles) = self.profiles.lock() {
			profiles.insert(user_id.to_string(), display_name.to_string());
		}
		self
	}

	/// Make profile lookups slow so tests can observe what runs before they land.
	pub fn with_profile_delay(mut self, delay: Duration) -> Self {
		self.profile_delay = Some(delay);
		self
	}

	pub fn reply_count(&self) -> usize {
		self.replies.lock().map(|r| r.len()).unwrap_or(0)
	}

	pub fn push_count(&self) -> usize {
		self.pushes.lock().map(|p| p.len()).unwrap_or(0)
	}

	pub fn reply_texts(&self) -> Vec<String> {
		let replies = match self.replies.lock() {
			Ok(replies) => replies,
			Err(_) => return Vec::new(),
		};

		replies
			.iter()
			.flat_map(|(_, messages)| messages.iter())
			.filter_map(|m| match m {
				Message::Text { text } => Some(text.clone()),
				_ => None,
			})
			.collect()
	}

	pub fn pushes_to(&self, recipient: &RecipientId) -> Vec<Vec<Message>> {
		let pushes = match self.pushes.lock() {
			Ok(pushes) => pushes,
			Err(_) => return Vec::new(),
		};

		pushes
			.iter()
			.filter(|(to, _)| to == recipient)
			.map(|(_, messages)| messages.clone())
			.collect()
	}
}

#[async_trait]
impl ChatApi for FakeChat {
	async fn reply(&self, reply_token: &str, messages: Vec<Message>) -> anyhow::Result<()> {
		self.replies
			.lock()
			.map_err(|_| anyhow::anyhow!("replies lock poisoned"))?
			.push((reply_token.to_string(), messages));
		Ok(())
	}

	async fn push(&self, to: &RecipientId, messages: Vec<Message>) -> anyhow::Result<()> {
		self.pushes
			.lock()
			.map_err(|_| anyhow::anyhow!("pushes lock poisoned"))?
			.push((to.clone(), messages));
		Ok(())
	}

	async fn profile(&self, user_id: &str) -> anyhow::Result<Profile> {
		if let Some(delay) = self.profile_delay {
			tokio::time::sleep(delay).await;
		}

		let display_name = self
			.profiles
			.lock()
			.map_err(|_| anyhow::anyhow!("profiles lock poisoned"))?
			.get(user_id)
			.cloned()
			.ok_or_else(|| anyhow::anyhow!("no profile for {user_id}"))?;

		Ok(Profile { display_name })
	}
}
