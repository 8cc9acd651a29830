#![forbid(unsafe_code)]

use std::sync::Arc;

use homelink_chat::ChatApi;
use homelink_chat::messages::Message;
use homelink_domain::RecipientId;
use tracing::{debug, warn};

/// Best-effort push channel to the single distinguished owner recipient.
///
/// Failures are logged and dropped; nothing waits on a notification.
#[derive(Clone)]
pub struct OwnerNotifier {
	chat: Arc<dyn ChatApi>,
	owner: Option<RecipientId>,
}

impl OwnerNotifier {
	pub fn new(chat: Arc<dyn ChatApi>, owner: Option<RecipientId>) -> Self {
		if owner.is_none() {
			warn!("no owner recipient configured; owner notifications disabled");
		}
		Self { chat, owner }
	}

	/// Fire-and-forget text notification to the owner.
	pub fn notify(&self, text: String) {
		let Some(owner) = self.owner.clone() else {
			debug!("owner notification skipped (no owner configured)");
			return;
		};

		let chat = Arc::clone(&self.chat);
		tokio::spawn(async move {
			if let Err(e) = chat.push(&owner, vec![Message::text(text)]).await {
				warn!(error = %e, "owner notification failed");
			}
		});
	}
}
