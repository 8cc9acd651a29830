#![forbid(unsafe_code)]

use std::time::Duration;

use homelink_protocol::{DEFAULT_MAX_FRAME_SIZE, DeviceCommand, decode_command};
use tokio::time::timeout;

use crate::server::device_hub::{DeviceHub, DeviceHubConfig};

async fn recv_command(rx: &mut tokio::sync::mpsc::Receiver<String>) -> DeviceCommand {
	let frame = timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("expected frame within timeout")
		.expect("channel open");
	decode_command(&frame, DEFAULT_MAX_FRAME_SIZE).expect("valid command frame")
}

#[tokio::test]
async fn broadcast_reaches_every_connection() {
	let hub = DeviceHub::new(DeviceHubConfig::default());

	let (_id_a, mut rx_a) = hub.register().await;
	let (_id_b, mut rx_b) = hub.register().await;
	assert_eq!(hub.connection_count().await, 2);

	let queued = hub.broadcast(&DeviceCommand::RequestPicture).await;
	assert_eq!(queued, 2);

	assert_eq!(recv_command(&mut rx_a).await, DeviceCommand::RequestPicture);
	assert_eq!(recv_command(&mut rx_b).await, DeviceCommand::RequestPicture);
}

#[tokio::test]
async fn broadcast_with_no_connections_is_silently_lost() {
	let hub = DeviceHub::new(DeviceHubConfig::default());

	assert_eq!(hub.connection_count().await, 0);
	assert_eq!(hub.broadcast(&DeviceCommand::RequestLocation).await, 0);
}

#[tokio::test]
async fn unregister_removes_from_broadcast_set() {
	let hub = DeviceHub::new(DeviceHubConfig::default());

	let (id_a, mut rx_a) = hub.register().await;
	let (_id_b, mut rx_b) = hub.register().await;

	assert!(hub.unregister(id_a).await);
	assert!(!hub.unregister(id_a).await);
	assert_eq!(hub.connection_count().await, 1);

	let queued = hub.broadcast(&DeviceCommand::RequestTvStatus).await;
	assert_eq!(queued, 1);

	assert_eq!(recv_command(&mut rx_b).await, DeviceCommand::RequestTvStatus);

	let nothing = timeout(Duration::from_millis(50), rx_a.recv()).await;
	assert!(nothing.is_err() || nothing.unwrap().is_none());
}

#[tokio::test]
async fn send_to_targets_one_connection_only() {
	let hub = DeviceHub::new(DeviceHubConfig::default());

	let (id_a, mut rx_a) = hub.register().await;
	let (_id_b, mut rx_b) = hub.register().await;

	let command = DeviceCommand::BanState {
		name: "LivingTV".to_string(),
		ban: "1".to_string(),
	};
	assert!(hub.send_to(id_a, &command).await);

	assert_eq!(recv_command(&mut rx_a).await, command);
	assert!(timeout(Duration::from_millis(50), rx_b.recv()).await.is_err());
}

#[tokio::test]
async fn send_to_unknown_connection_fails() {
	let hub = DeviceHub::new(DeviceHubConfig::default());
	assert!(
		!hub.send_to(
			999,
			&DeviceCommand::BanUpdated {
				name: "LivingTV".to_string()
			}
		)
		.await
	);
}
