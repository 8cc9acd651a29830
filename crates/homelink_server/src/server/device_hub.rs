#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use homelink_chat::SecretString;
use homelink_protocol::{DEFAULT_MAX_FRAME_SIZE, DeviceCommand, DeviceEvent, decode_event, encode_command};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

use crate::server::notifier::OwnerNotifier;

/// Hub over the set of live authenticated device connections.
///
/// Commands are broadcast to every connection with no acknowledgment and no
/// delivery guarantee; with zero connections an emit is silently lost. Callers
/// that need "is anyone listening" semantics check `connection_count` first.
#[derive(Clone)]
pub struct DeviceHub {
	inner: Arc<Mutex<Inner>>,
	next_conn_id: Arc<AtomicU64>,
	cfg: DeviceHubConfig,
}

/// Configuration for `DeviceHub`.
#[derive(Debug, Clone)]
pub struct DeviceHubConfig {
	/// Maximum number of queued outbound frames per connection.
	pub outbound_queue_capacity: usize,
}

impl Default for DeviceHubConfig {
	fn default() -> Self {
		Self {
			outbound_queue_capacity: 64,
		}
	}
}

#[derive(Default)]
struct Inner {
	conns: HashMap<u64, mpsc::Sender<String>>,
}

impl DeviceHub {
	pub fn new(cfg: DeviceHubConfig) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner::default())),
			next_conn_id: Arc::new(AtomicU64::new(1)),
			cfg,
		}
	}

	/// Join the broadcast set. Returns the connection id and the outbound
	/// frame stream the connection task must forward to its socket.
	pub async fn register(&self) -> (u64, mpsc::Receiver<String>) {
		let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = mpsc::channel(self.cfg.outbound_queue_capacity);

		let mut inner = self.inner.lock().await;
		inner.conns.insert(conn_id, tx);
		debug!(conn_id, conns = inner.conns.len(), "device connection registered");

		(conn_id, rx)
	}

	/// Leave the broadcast set. Returns `false` if the id was already gone.
	pub async fn unregister(&self, conn_id: u64) -> bool {
		let mut inner = self.inner.lock().await;
		let removed = inner.conns.remove(&conn_id).is_some();
		if removed {
			debug!(conn_id, conns = inner.conns.len(), "device connection unregistered");
		}
		removed
	}

	pub async fn connection_count(&self) -> usize {
		let inner = self.inner.lock().await;
		inner.conns.len()
	}

	/// Fire-and-forget broadcast to every connection. Returns how many
	/// connections the frame was queued for.
	pub async fn broadcast(&self, command: &DeviceCommand) -> usize {
		let frame = match encode_command(command) {
			Ok(frame) => frame,
			Err(e) => {
				warn!(error = %e, "failed to encode device command");
				return 0;
			}
		};

		let inner = self.inner.lock().await;
		let mut queued = 0;
		for (conn_id, tx) in &inner.conns {
			match tx.try_send(frame.clone()) {
				Ok(()) => queued += 1,
				Err(mpsc::error::TrySendError::Full(_)) => {
					warn!(conn_id, "device outbound queue full; dropping command");
				}
				Err(mpsc::error::TrySendError::Closed(_)) => {}
			}
		}

		queued
	}

	/// Send a command to one connection only (query replies).
	pub async fn send_to(&self, conn_id: u64, command: &DeviceCommand) -> bool {
		let frame = match encode_command(command) {
			Ok(frame) => frame,
			Err(e) => {
				warn!(error = %e, "failed to encode device command");
				return false;
			}
		};

		let inner = self.inner.lock().await;
		match inner.conns.get(&conn_id) {
			Some(tx) => tx.try_send(frame).is_ok(),
			None => false,
		}
	}
}

/// Extract the `token` query parameter from a websocket upgrade request.
fn handshake_token(req: &Request) -> Option<String> {
	let query = req.uri().query()?;
	url::form_urlencoded::parse(query.as_bytes())
		.find(|(k, _)| k == "token")
		.map(|(_, v)| v.into_owned())
}

fn unauthorized_response() -> ErrorResponse {
	Response::builder()
		.status(StatusCode::UNAUTHORIZED)
		.body(None)
		.unwrap_or_default()
}

/// Accept device-channel connections until the listener fails.
///
/// Authentication is stateless per attempt: the `?token=` query parameter must
/// equal the configured shared secret or the handshake is refused outright.
pub async fn run_device_listener(
	bind: SocketAddr,
	hub: DeviceHub,
	shared_token: Option<SecretString>,
	events_tx: mpsc::Sender<(u64, DeviceEvent)>,
	notifier: OwnerNotifier,
) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind).await?;
	info!(%bind, "device channel listening");

	loop {
		let (stream, remote) = listener.accept().await?;

		let hub = hub.clone();
		let shared_token = shared_token.clone();
		let events_tx = events_tx.clone();
		let notifier = notifier.clone();

		tokio::spawn(async move {
			if let Err(e) = handle_device_connection(stream, remote, hub, shared_token, events_tx, notifier).await {
				warn!(%remote, error = %e, "device connection ended with error");
			}
		});
	}
}

async fn handle_device_connection(
	stream: TcpStream,
	remote: SocketAddr,
	hub: DeviceHub,
	shared_token: Option<SecretString>,
	events_tx: mpsc::Sender<(u64, DeviceEvent)>,
	notifier: OwnerNotifier,
) -> anyhow::Result<()> {
	let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
		let Some(expected) = shared_token.as_ref() else {
			warn!("device channel has no shared token configured; refusing connection");
			return Err(unauthorized_response());
		};

		match handshake_token(req) {
			Some(token) if token == expected.expose() => Ok(resp),
			_ => {
				warn!("device authentication failed (bad or missing token)");
				Err(unauthorized_response())
			}
		}
	};

	let ws = match accept_hdr_async(stream, callback).await {
		Ok(ws) => ws,
		Err(e) => {
			metrics::counter!("homelink_device_auth_failures_total").increment(1);
			return Err(anyhow::anyhow!("websocket handshake refused: {e}"));
		}
	};

	let session_id = uuid::Uuid::new_v4().to_string();
	let (conn_id, mut outbound_rx) = hub.register().await;
	metrics::counter!("homelink_device_connections_total").increment(1);
	info!(conn_id, %remote, %session_id, "device connected");

	let (mut sink, mut source) = ws.split();

	loop {
		tokio::select! {
			frame = outbound_rx.recv() => {
				let Some(frame) = frame else {
					break;
				};

				if let Err(e) = sink.send(Message::Text(frame.into())).await {
					warn!(conn_id, error = %e, "device send failed");
					break;
				}
			}

			msg = source.next() => {
				let Some(msg) = msg else {
					break;
				};

				match msg {
					Ok(Message::Text(text)) => {
						metrics::counter!("homelink_device_events_total").increment(1);

						match decode_event(text.as_str(), DEFAULT_MAX_FRAME_SIZE) {
							Ok(event) => {
								if events_tx.send((conn_id, event)).await.is_err() {
									warn!(conn_id, "device event channel closed; dropping connection");
									break;
								}
							}
							Err(e) => {
								warn!(conn_id, error = %e, "dropping undecodable device frame");
							}
						}
					}
					Ok(Message::Ping(payload)) => {
						if sink.send(Message::Pong(payload)).await.is_err() {
							break;
						}
					}
					Ok(Message::Close(_)) => break,
					Ok(_) => {}
					Err(e) => {
						warn!(conn_id, error = %e, "device receive failed");
						break;
					}
				}
			}
		}
	}

	hub.unregister(conn_id).await;
	info!(conn_id, %remote, "device disconnected");
	notifier.notify("A device disconnected from the home channel.".to_string());

	Ok(())
}
