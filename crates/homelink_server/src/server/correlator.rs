#![forbid(unsafe_code)]

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use homelink_chat::ChatApi;
use homelink_chat::messages::{Message, TemplateAction};
use homelink_domain::{BanFlag, CommandKind, RecipientId, TvName};
use homelink_protocol::{DeviceCommand, DeviceEvent, TvStatusEntry};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::server::device_hub::DeviceHub;
use crate::server::dispatcher::{action_data_tv_ban, action_data_tv_logs};
use crate::server::notifier::OwnerNotifier;
use crate::server::registry::PendingRegistry;
use crate::server::state::SharedState;
use crate::server::store::Store;

/// Fixed, access-token-gated download URLs handed out in picture messages.
#[derive(Debug, Clone)]
pub struct MediaUrls {
	full: String,
	preview: String,
}

impl MediaUrls {
	pub fn new(base_url: &str, url_access_token: &str) -> Self {
		let base = base_url.trim_end_matches('/');
		Self {
			full: format!("{base}/image/full?key={url_access_token}"),
			preview: format!("{base}/image/preview?key={url_access_token}"),
		}
	}
}

/// Routes device replies back to whoever asked for them.
///
/// Fan-out reads a snapshot of the pending set, delivers to every member, and
/// only then drains in one atomic clear. A request registered mid-fan-out can
/// miss the delivery and still be cleared by the drain; that window is part of
/// the contract (see `PendingRegistry`).
#[derive(Clone)]
pub struct Correlator {
	chat: Arc<dyn ChatApi>,
	registry: PendingRegistry,
	hub: DeviceHub,
	store: Store,
	shared: SharedState,
	notifier: OwnerNotifier,
	media: MediaUrls,
}

impl Correlator {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		chat: Arc<dyn ChatApi>,
		registry: PendingRegistry,
		hub: DeviceHub,
		store: Store,
		shared: SharedState,
		notifier: OwnerNotifier,
		media: MediaUrls,
	) -> Self {
		Self {
			chat,
			registry,
			hub,
			store,
			shared,
			notifier,
			media,
		}
	}

	/// Consume decoded device events until the channel closes.
	pub async fn run(self, mut events_rx: mpsc::Receiver<(u64, DeviceEvent)>) {
		while let Some((conn_id, event)) = events_rx.recv().await {
			self.handle_event(conn_id, event).await;
		}

		info!("device event channel closed; correlator stopping");
	}

	pub async fn handle_event(&self, conn_id: u64, event: DeviceEvent) {
		match event {
			DeviceEvent::PictureReady { image_base64 } => self.handle_picture(&image_base64).await,
			DeviceEvent::TvStatus { statuses } => self.handle_tv_status(&statuses).await,
			DeviceEvent::TvBanQuery { name } => self.handle_tv_ban_query(conn_id, &name).await,
			DeviceEvent::TvStatusLog { name, status } => self.handle_tv_status_log(&name, &status).await,
			DeviceEvent::TvOfflineNotice { name } => {
				self.notifier.notify(format!("TV {name} went offline."));
			}
		}
	}

	/// Picture reply: decode, overwrite the image slot, fan out download links,
	/// notify the owner, drain.
	async fn handle_picture(&self, image_base64: &str) {
		let image = match BASE64.decode(image_base64) {
			Ok(image) => image,
			Err(e) => {
				warn!(error = %e, "dropping picture with undecodable payload");
				return;
			}
		};

		info!(bytes = image.len(), "picture received");
		self.shared.set_latest_image(Bytes::from(image));

		let pending = self.registry.snapshot(CommandKind::Picture).await;
		for recipient in &pending {
			let message = Message::image(self.media.full.clone(), self.media.preview.clone());
			if let Err(e) = self.chat.push(recipient, vec![message]).await {
				warn!(recipient = %recipient, error = %e, "picture fan-out push failed");
			}

			self.notify_owner_about(recipient);
		}

		self.registry.drain(CommandKind::Picture).await;
	}

	/// Owner notification composed from the cached display name.
	///
	/// The profile lookup that fills the cache is spawned, not awaited: the
	/// first notification for a recipient goes out with an empty name and later
	/// ones pick up whatever the lookup cached. Accepted behavior, kept as is.
	fn notify_owner_about(&self, recipient: &RecipientId) {
		let name = self.shared.display_name(recipient.as_str()).unwrap_or_default();
		self.notifier.notify(format!("Sent the picture to {name} ({recipient})."));

		let chat = Arc::clone(&self.chat);
		let shared = self.shared.clone();
		let user_id = recipient.as_str().to_string();
		tokio::spawn(async move {
			match chat.profile(&user_id).await {
				Ok(profile) => shared.remember_display_name(user_id, profile.display_name),
				Err(e) => debug!(user_id, error = %e, "profile lookup failed"),
			}
		});
	}

	/// Location reply: same fan-out pattern, literal coordinates.
	pub async fn handle_location_reply(&self, latitude: f64, longitude: f64) {
		let pending = self.registry.snapshot(CommandKind::Location).await;
		info!(latitude, longitude, pending = pending.len(), "location received");

		for recipient in &pending {
			let message = Message::location("Phone location", "Last reported position", latitude, longitude);
			if let Err(e) = self.chat.push(recipient, vec![message]).await {
				warn!(recipient = %recipient, error = %e, "location fan-out push failed");
			}
		}

		self.registry.drain(CommandKind::Location).await;
	}

	/// TvStatus reply: cross-reference reported statuses against persisted ban
	/// flags and fan out one combined menu. TVs with no persisted record or an
	/// invalid stored code are excluded with a warning.
	async fn handle_tv_status(&self, statuses: &[TvStatusEntry]) {
		let mut lines = Vec::new();
		let mut actions = Vec::new();

		for entry in statuses {
			let name = match TvName::new(entry.name.clone()) {
				Ok(name) => name,
				Err(e) => {
					warn!(error = %e, "skipping TV with invalid name in status report");
					continue;
				}
			};

			let code = match self.store.ban_flag(&name).await {
				Ok(Some(code)) => code,
				Ok(None) => {
					warn!(tv = %name, "skipping TV with no persisted ban record");
					continue;
				}
				Err(e) => {
					warn!(tv = %name, error = %e, "skipping TV after ban flag read failure");
					continue;
				}
			};

			let flag = match BanFlag::from_code(&code) {
				Ok(flag) => flag,
				Err(e) => {
					warn!(tv = %name, error = %e, "skipping TV with invalid persisted ban code");
					continue;
				}
			};

			lines.push(format!("{name}: {} ({})", entry.status, flag.label()));
			actions.push(TemplateAction::postback(
				format!("{name}: set {}", flag.toggled().label()),
				action_data_tv_ban(&name, flag.toggled()),
			));
			actions.push(TemplateAction::postback(format!("{name}: logs"), action_data_tv_logs(&name)));
		}

		let pending = self.registry.snapshot(CommandKind::TvStatus).await;

		if actions.is_empty() {
			for recipient in &pending {
				if let Err(e) = self.chat.push(recipient, vec![Message::text("No known TVs reported.")]).await {
					warn!(recipient = %recipient, error = %e, "tv-status fan-out push failed");
				}
			}
		} else {
			let message = Message::buttons("TV status", "TV status", lines.join("\n"), actions);
			for recipient in &pending {
				if let Err(e) = self.chat.push(recipient, vec![message.clone()]).await {
					warn!(recipient = %recipient, error = %e, "tv-status fan-out push failed");
				}
			}
		}

		self.registry.drain(CommandKind::TvStatus).await;
	}

	/// Ban query: answer the asking connection only with the stored code.
	async fn handle_tv_ban_query(&self, conn_id: u64, raw_name: &str) {
		let name = match TvName::new(raw_name) {
			Ok(name) => name,
			Err(e) => {
				warn!(error = %e, "ignoring ban query with invalid name");
				return;
			}
		};

		let code = match self.store.ban_flag(&name).await {
			Ok(Some(code)) => code,
			Ok(None) => {
				warn!(tv = %name, "ignoring ban query for unknown TV");
				return;
			}
			Err(e) => {
				warn!(tv = %name, error = %e, "ban query read failed");
				return;
			}
		};

		if let Err(e) = BanFlag::from_code(&code) {
			warn!(tv = %name, error = %e, "ignoring ban query for TV with invalid persisted code");
			return;
		}

		let answered = self
			.hub
			.send_to(
				conn_id,
				&DeviceCommand::BanState {
					name: name.into_string(),
					ban: code,
				},
			)
			.await;

		if !answered {
			debug!(conn_id, "ban query connection gone before reply");
		}
	}

	/// Status-change report: append-only, best-effort.
	async fn handle_tv_status_log(&self, raw_name: &str, status: &str) {
		let name = match TvName::new(raw_name) {
			Ok(name) => name,
			Err(e) => {
				warn!(error = %e, "ignoring status log with invalid name");
				return;
			}
		};

		if let Err(e) = self.store.append_status_log(&name, status).await {
			warn!(tv = %name, error = %e, "failed to append status log");
		}
	}
}
