#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::DateTime;
use homelink_chat::ChatApi;
use homelink_chat::messages::{Message, TemplateAction};
use homelink_chat::webhook::{WebhookBody, WebhookEvent};
use homelink_domain::{BanFlag, CommandKind, TvName};
use homelink_protocol::DeviceCommand;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::server::device_hub::DeviceHub;
use crate::server::registry::PendingRegistry;
use crate::server::store::Store;

/// Fixed reply when a device-requiring command arrives with no device online.
pub const NOT_CONNECTED_TEXT: &str = "The home device is not connected right now.";

/// Parsed postback action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	GetPicture,
	GetLocation,
	GetTvStatus,
	SetTvBan {
		change_to: BanFlag,
		name: TvName,
	},
	ShowTvBanLogs {
		name: TvName,
	},
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionParseError {
	#[error("missing action key")]
	MissingAction,
	#[error("unknown action: {0}")]
	UnknownAction(String),
	#[error("missing parameter: {0}")]
	MissingParam(&'static str),
	#[error("invalid parameter {param}: {detail}")]
	InvalidParam {
		param: &'static str,
		detail: String,
	},
}

/// Decode a flat `key=value&key=value` postback string into an `Action`.
///
/// Malformed encodings are rejected explicitly instead of sliced positionally.
pub fn parse_action(data: &str) -> Result<Action, ActionParseError> {
	let params: BTreeMap<String, String> = url::form_urlencoded::parse(data.as_bytes())
		.map(|(k, v)| (k.into_owned(), v.into_owned()))
		.collect();

	let action = params.get("action").ok_or(ActionParseError::MissingAction)?;

	let tv_name = |params: &BTreeMap<String, String>| -> Result<TvName, ActionParseError> {
		let raw = params.get("name").ok_or(ActionParseError::MissingParam("name"))?;
		TvName::new(raw.clone()).map_err(|e| ActionParseError::InvalidParam {
			param: "name",
			detail: e.to_string(),
		})
	};

	match action.as_str() {
		"getpic" => Ok(Action::GetPicture),
		"getlocation" => Ok(Action::GetLocation),
		"tvstatus" => Ok(Action::GetTvStatus),
		"tvban" => {
			let raw = params.get("changeTo").ok_or(ActionParseError::MissingParam("changeTo"))?;
			let change_to = BanFlag::from_code(raw).map_err(|e| ActionParseError::InvalidParam {
				param: "changeTo",
				detail: e.to_string(),
			})?;
			Ok(Action::SetTvBan {
				change_to,
				name: tv_name(&params)?,
			})
		}
		"tvlogs" => Ok(Action::ShowTvBanLogs { name: tv_name(&params)? }),
		other => Err(ActionParseError::UnknownAction(other.to_string())),
	}
}

/// Postback data strings the menu and TV messages hand out.
pub fn action_data_tv_ban(name: &TvName, change_to: BanFlag) -> String {
	format!("action=tvban&changeTo={}&name={}", change_to.code(), name.as_str())
}

pub fn action_data_tv_logs(name: &TvName) -> String {
	format!("action=tvlogs&name={}", name.as_str())
}

/// The fixed action menu sent in reply to any plain message.
pub fn action_menu() -> Message {
	Message::buttons(
		"Home command menu",
		"Home commands",
		"Pick an action.",
		vec![
			TemplateAction::postback("Living room picture", "action=getpic"),
			TemplateAction::postback("Phone location", "action=getlocation"),
			TemplateAction::postback("TV status", "action=tvstatus"),
		],
	)
}

/// Maps inbound chat events to device actions and registry entries.
#[derive(Clone)]
pub struct Dispatcher {
	chat: Arc<dyn ChatApi>,
	registry: PendingRegistry,
	hub: DeviceHub,
	store: Store,
}

impl Dispatcher {
	pub fn new(chat: Arc<dyn ChatApi>, registry: PendingRegistry, hub: DeviceHub, store: Store) -> Self {
		Self {
			chat,
			registry,
			hub,
			store,
		}
	}

	/// Handle one webhook event. Returns the per-event result for the batch
	/// response: `null` for skipped events, a small ack object otherwise.
	pub async fn handle_event(&self, event: &WebhookEvent) -> Value {
		metrics::counter!("homelink_webhook_events_total").increment(1);

		match event.kind.as_str() {
			"message" => self.handle_message(event).await,
			"postback" => self.handle_postback(event).await,
			other => {
				debug!(kind = other, "ignoring webhook event kind");
				Value::Null
			}
		}
	}

	async fn handle_message(&self, event: &WebhookEvent) -> Value {
		let Some(reply_token) = event.reply_token.as_deref() else {
			warn!("message event without reply token; skipping");
			return Value::Null;
		};

		if let Err(e) = self.chat.reply(reply_token, vec![action_menu()]).await {
			warn!(error = %e, "failed to reply with action menu");
		}

		json!({ "status": "menu" })
	}

	async fn handle_postback(&self, event: &WebhookEvent) -> Value {
		let Some(data) = event.postback.as_ref().map(|p| p.data.as_str()) else {
			warn!("postback event without data; skipping");
			return Value::Null;
		};

		let action = match parse_action(data) {
			Ok(action) => action,
			Err(e) => {
				warn!(error = %e, data, "ignoring unrecognized postback action");
				return Value::Null;
			}
		};

		match action {
			Action::GetPicture => self.request_from_device(event, CommandKind::Picture, DeviceCommand::RequestPicture).await,
			Action::GetLocation => {
				self.request_from_device(event, CommandKind::Location, DeviceCommand::RequestLocation)
					.await
			}
			Action::GetTvStatus => {
				self.request_from_device(event, CommandKind::TvStatus, DeviceCommand::RequestTvStatus)
					.await
			}
			Action::SetTvBan { change_to, name } => self.set_tv_ban(name, change_to).await,
			Action::ShowTvBanLogs { name } => self.show_tv_ban_logs(event, name).await,
		}
	}

	/// Device-requiring command: fall back immediately when no device is
	/// connected (command dropped, not queued), otherwise register the
	/// requester and broadcast.
	async fn request_from_device(&self, event: &WebhookEvent, kind: CommandKind, command: DeviceCommand) -> Value {
		if self.hub.connection_count().await == 0 {
			if let Some(reply_token) = event.reply_token.as_deref() {
				if let Err(e) = self.chat.reply(reply_token, vec![Message::text(NOT_CONNECTED_TEXT)]).await {
					warn!(error = %e, "failed to send not-connected reply");
				}
			}

			return json!({ "status": "device_unavailable" });
		}

		let Some(source) = event.source.as_ref() else {
			warn!("postback event without source; skipping");
			return Value::Null;
		};

		let recipient = match source.recipient() {
			Ok(recipient) => recipient,
			Err(e) => {
				warn!(error = %e, "postback source cannot be resolved; skipping");
				return Value::Null;
			}
		};

		// For group/room sources the recipient is the group/room; keep the
		// individual sender visible in the logs.
		debug!(
			kind = %kind,
			recipient = %recipient,
			sender = source.sender_user_id().unwrap_or(""),
			"device command requested"
		);

		self.registry.add(kind, recipient).await;
		self.hub.broadcast(&command).await;

		json!({ "status": "requested", "kind": kind.as_str() })
	}

	/// Persist the new flag, then tell devices. Persistence failure stops the
	/// operation: no retry, no user-visible error.
	async fn set_tv_ban(&self, name: TvName, change_to: BanFlag) -> Value {
		if let Err(e) = self.store.set_ban_flag(&name, change_to).await {
			warn!(tv = %name, error = %e, "failed to persist ban flag");
			return json!({ "status": "ban_failed" });
		}

		self.hub
			.broadcast(&DeviceCommand::BanUpdated {
				name: name.as_str().to_string(),
			})
			.await;

		json!({ "status": "ban_updated", "tv": name.as_str() })
	}

	async fn show_tv_ban_logs(&self, event: &WebhookEvent, name: TvName) -> Value {
		let Some(reply_token) = event.reply_token.as_deref() else {
			warn!("tvlogs postback without reply token; skipping");
			return Value::Null;
		};

		let entries = match self.store.status_logs(&name).await {
			Ok(entries) => entries,
			Err(e) => {
				warn!(tv = %name, error = %e, "failed to query status logs");
				return json!({ "status": "logs_failed" });
			}
		};

		let mut text = format!("Status log for {name}");
		for entry in &entries {
			let when = DateTime::from_timestamp(entry.observed_at, 0)
				.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
				.unwrap_or_else(|| entry.observed_at.to_string());
			text.push_str(&format!("\n{when} {}", entry.status));
		}

		if let Err(e) = self.chat.reply(reply_token, vec![Message::text(text)]).await {
			warn!(error = %e, "failed to reply with status logs");
		}

		json!({ "status": "logs", "entries": entries.len() })
	}
}

/// Process a webhook batch: every event independently, nothing aborts the
/// batch, and the result array lines up with the input events.
pub async fn process_events(dispatcher: &Dispatcher, body: &WebhookBody) -> Vec<Value> {
	let mut results = Vec::with_capacity(body.events.len());
	for event in &body.events {
		results.push(dispatcher.handle_event(event).await);
	}
	results
}
