#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use homelink_chat::messages::{Message, Template, TemplateAction};
use homelink_domain::{BanFlag, CommandKind, RecipientId, TvName};
use homelink_protocol::{DEFAULT_MAX_FRAME_SIZE, DeviceCommand, DeviceEvent, TvStatusEntry, decode_command};
use tokio::time::timeout;

use crate::server::correlator::{Correlator, MediaUrls};
use crate::server::device_hub::{DeviceHub, DeviceHubConfig};
use crate::server::notifier::OwnerNotifier;
use crate::server::registry::PendingRegistry;
use crate::server::state::SharedState;
use crate::server::store::Store;
use crate::server::testing::FakeChat;

const OWNER: &str = "OWNER";

struct Harness {
	chat: Arc<FakeChat>,
	registry: PendingRegistry,
	hub: DeviceHub,
	store: Store,
	shared: SharedState,
	correlator: Correlator,
}

async fn harness(chat: FakeChat) -> Harness {
	let chat = Arc::new(chat);
	let registry = PendingRegistry::new();
	let hub = DeviceHub::new(DeviceHubConfig::default());
	let store = Store::connect("sqlite::memory:").await.expect("in-memory store");
	let shared = SharedState::new();
	let owner = RecipientId::new(OWNER).expect("owner id");
	let notifier = OwnerNotifier::new(chat.clone(), Some(owner));
	let media = MediaUrls::new("https://bridge.example/", "sekrit");

	let correlator = Correlator::new(
		chat.clone(),
		registry.clone(),
		hub.clone(),
		store.clone(),
		shared.clone(),
		notifier,
		media,
	);

	Harness {
		chat,
		registry,
		hub,
		store,
		shared,
		correlator,
	}
}

fn recipient(id: &str) -> RecipientId {
	RecipientId::new(id).expect("recipient id")
}

/// Poll until `check` passes or the deadline hits.
async fn wait_until(check: impl Fn() -> bool) {
	for _ in 0..100 {
		if check() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not reached within deadline");
}

fn owner_texts(chat: &FakeChat) -> Vec<String> {
	chat.pushes_to(&recipient(OWNER))
		.into_iter()
		.flatten()
		.filter_map(|m| match m {
			Message::Text { text } => Some(text),
			_ => None,
		})
		.collect()
}

#[tokio::test]
async fn location_reply_fans_out_literal_coordinates_and_drains() {
	let h = harness(FakeChat::new()).await;

	h.registry.add(CommandKind::Location, recipient("A")).await;
	h.registry.add(CommandKind::Location, recipient("B")).await;

	h.correlator.handle_location_reply(35.0, 139.0).await;

	for id in ["A", "B"] {
		let pushes = h.chat.pushes_to(&recipient(id));
		assert_eq!(pushes.len(), 1, "exactly one push to {id}");
		match &pushes[0][0] {
			Message::Location { latitude, longitude, .. } => {
				assert_eq!(*latitude, 35.0);
				assert_eq!(*longitude, 139.0);
			}
			other => panic!("unexpected message: {other:?}"),
		}
	}

	assert_eq!(h.registry.len(CommandKind::Location).await, 0);
}

#[tokio::test]
async fn picture_reply_stores_image_and_sends_gated_urls() {
	let h = harness(FakeChat::new()).await;

	h.registry.add(CommandKind::Picture, recipient("A")).await;

	let payload = b"not-really-a-jpeg".to_vec();
	h.correlator
		.handle_event(
			1,
			DeviceEvent::PictureReady {
				image_base64: BASE64.encode(&payload),
			},
		)
		.await;

	assert_eq!(h.shared.latest_image().as_deref(), Some(payload.as_slice()));
	assert_eq!(h.registry.len(CommandKind::Picture).await, 0);

	let pushes = h.chat.pushes_to(&recipient("A"));
	assert_eq!(pushes.len(), 1);
	match &pushes[0][0] {
		Message::Image {
			original_content_url,
			preview_image_url,
		} => {
			assert_eq!(original_content_url, "https://bridge.example/image/full?key=sekrit");
			assert_eq!(preview_image_url, "https://bridge.example/image/preview?key=sekrit");
		}
		other => panic!("unexpected message: {other:?}"),
	}
}

#[tokio::test]
async fn undecodable_picture_payload_leaves_pending_set_intact() {
	let h = harness(FakeChat::new()).await;

	h.registry.add(CommandKind::Picture, recipient("A")).await;

	h.correlator
		.handle_event(
			1,
			DeviceEvent::PictureReady {
				image_base64: "%%%not-base64%%%".to_string(),
			},
		)
		.await;

	assert!(h.shared.latest_image().is_none());
	assert_eq!(h.registry.len(CommandKind::Picture).await, 1);
	assert_eq!(h.chat.push_count(), 0);
}

#[tokio::test]
async fn first_owner_notification_carries_an_empty_name() {
	let chat = FakeChat::new()
		.with_profile("U1", "Alice")
		.with_profile_delay(Duration::from_millis(30));
	let h = harness(chat).await;

	h.registry.add(CommandKind::Picture, recipient("U1")).await;
	h.correlator
		.handle_event(
			1,
			DeviceEvent::PictureReady {
				image_base64: BASE64.encode(b"one"),
			},
		)
		.await;

	{
		let chat = h.chat.clone();
		wait_until(move || !owner_texts(&chat).is_empty()).await;
	}
	assert!(
		owner_texts(&h.chat)[0].contains("to  (U1)"),
		"first notification composed before the profile lookup lands"
	);

	{
		let shared = h.shared.clone();
		wait_until(move || shared.display_name("U1").is_some()).await;
	}

	h.registry.add(CommandKind::Picture, recipient("U1")).await;
	h.correlator
		.handle_event(
			1,
			DeviceEvent::PictureReady {
				image_base64: BASE64.encode(b"two"),
			},
		)
		.await;

	{
		let chat = h.chat.clone();
		wait_until(move || owner_texts(&chat).len() >= 2).await;
	}
	assert!(
		owner_texts(&h.chat)[1].contains("Alice"),
		"second notification uses the cached display name"
	);
}

#[tokio::test]
async fn tv_status_menu_excludes_unknown_and_invalid_tvs() {
	let h = harness(FakeChat::new()).await;

	let living = TvName::new("LivingTV").expect("name");
	h.store.set_ban_flag(&living, BanFlag::Allowed).await.expect("persist");

	h.registry.add(CommandKind::TvStatus, recipient("A")).await;

	h.correlator
		.handle_event(
			1,
			DeviceEvent::TvStatus {
				statuses: vec![
					TvStatusEntry {
						name: "LivingTV".to_string(),
						status: "on".to_string(),
					},
					TvStatusEntry {
						name: "GhostTV".to_string(),
						status: "on".to_string(),
					},
				],
			},
		)
		.await;

	let pushes = h.chat.pushes_to(&recipient("A"));
	assert_eq!(pushes.len(), 1);

	match &pushes[0][0] {
		Message::Template { template, .. } => {
			let Template::Buttons { text, actions, .. } = template;
			assert!(text.contains("LivingTV: on (allowed)"));
			assert!(!text.contains("GhostTV"));

			// Toggle targets the opposite of the stored flag, plus a logs action.
			assert_eq!(actions.len(), 2);
			let TemplateAction::Postback { data, .. } = &actions[0];
			assert_eq!(data, "action=tvban&changeTo=1&name=LivingTV");
			let TemplateAction::Postback { data, .. } = &actions[1];
			assert_eq!(data, "action=tvlogs&name=LivingTV");
		}
		other => panic!("unexpected message: {other:?}"),
	}

	assert_eq!(h.registry.len(CommandKind::TvStatus).await, 0);
}

#[tokio::test]
async fn tv_status_with_no_known_tvs_still_drains() {
	let h = harness(FakeChat::new()).await;

	h.registry.add(CommandKind::TvStatus, recipient("A")).await;

	h.correlator
		.handle_event(
			1,
			DeviceEvent::TvStatus {
				statuses: vec![TvStatusEntry {
					name: "GhostTV".to_string(),
					status: "off".to_string(),
				}],
			},
		)
		.await;

	let pushes = h.chat.pushes_to(&recipient("A"));
	assert_eq!(pushes.len(), 1);
	assert!(matches!(&pushes[0][0], Message::Text { .. }));
	assert_eq!(h.registry.len(CommandKind::TvStatus).await, 0);
}

#[tokio::test]
async fn ban_query_answers_the_asking_connection_only() {
	let h = harness(FakeChat::new()).await;

	let name = TvName::new("LivingTV").expect("name");
	h.store.set_ban_flag(&name, BanFlag::Banned).await.expect("persist");

	let (conn_id, mut rx) = h.hub.register().await;
	let (_other_id, mut other_rx) = h.hub.register().await;

	h.correlator
		.handle_event(
			conn_id,
			DeviceEvent::TvBanQuery {
				name: "LivingTV".to_string(),
			},
		)
		.await;

	let frame = timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("reply within timeout")
		.expect("channel open");
	assert_eq!(
		decode_command(&frame, DEFAULT_MAX_FRAME_SIZE).expect("valid frame"),
		DeviceCommand::BanState {
			name: "LivingTV".to_string(),
			ban: "1".to_string(),
		}
	);

	assert!(timeout(Duration::from_millis(50), other_rx.recv()).await.is_err());
}

#[tokio::test]
async fn ban_query_for_unknown_tv_is_ignored() {
	let h = harness(FakeChat::new()).await;
	let (conn_id, mut rx) = h.hub.register().await;

	h.correlator
		.handle_event(
			conn_id,
			DeviceEvent::TvBanQuery {
				name: "GhostTV".to_string(),
			},
		)
		.await;

	assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn status_log_events_are_appended() {
	let h = harness(FakeChat::new()).await;

	h.correlator
		.handle_event(
			1,
			DeviceEvent::TvStatusLog {
				name: "LivingTV".to_string(),
				status: "on".to_string(),
			},
		)
		.await;

	let name = TvName::new("LivingTV").expect("name");
	let entries = h.store.status_logs(&name).await.expect("query");
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].status, "on");
}

#[tokio::test]
async fn offline_notice_reaches_the_owner_only() {
	let h = harness(FakeChat::new()).await;

	h.correlator
		.handle_event(
			1,
			DeviceEvent::TvOfflineNotice {
				name: "LivingTV".to_string(),
			},
		)
		.await;

	{
		let chat = h.chat.clone();
		wait_until(move || !owner_texts(&chat).is_empty()).await;
	}

	let texts = owner_texts(&h.chat);
	assert_eq!(texts.len(), 1);
	assert!(texts[0].contains("LivingTV"));
	assert_eq!(h.chat.push_count(), 1);
}
