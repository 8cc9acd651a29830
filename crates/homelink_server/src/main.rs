#![forbid(unsafe_code)]

mod config;
mod server;
mod util;

use std::net::SocketAddr;
use std::sync::Arc;

use homelink_chat::line::{DEFAULT_BASE_URL, LineClient};
use homelink_chat::{ChatApi, SecretString};
use homelink_domain::RecipientId;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::server::correlator::{Correlator, MediaUrls};
use crate::server::device_hub::{DeviceHub, DeviceHubConfig, run_device_listener};
use crate::server::dispatcher::Dispatcher;
use crate::server::notifier::OwnerNotifier;
use crate::server::registry::PendingRegistry;
use crate::server::state::SharedState;
use crate::server::store::Store;
use crate::server::webhook::{HttpState, spawn_http_server};
use crate::util::bind::parse_ws_bind;

/// Capacity of the decoded device-event channel between gateway and correlator.
const DEVICE_EVENT_QUEUE: usize = 256;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: homelink_server [--bind ws://ip:port]\n\
\n\
Options:\n\
\t--bind    Device channel bind endpoint (default: ws://127.0.0.1:9030)\n\
\t         Format: ws://ip:port (IP literal; IPv6 bracketed)\n\
\t--help   Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> SocketAddr {
	let mut bind_endpoint = "ws://127.0.0.1:9030".to_string();

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--bind" | "--listen" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--bind must be non-empty (expected ws://ip:port)");
					usage_and_exit();
				}
				bind_endpoint = v;
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	parse_ws_bind(&bind_endpoint).unwrap_or_else(|e| {
		eprintln!("{e}");
		usage_and_exit();
	})
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,homelink_server=debug".to_string());

	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false))
		.init();
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let device_bind = parse_args();

	let config_path = crate::config::default_config_path()?;
	let server_cfg = crate::config::load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	init_metrics(server_cfg.server.metrics_bind.as_deref());

	let Some(database_url) = server_cfg.persistence.database_url.as_deref() else {
		return Err(anyhow::anyhow!("no database_url configured (persistence.database_url)"));
	};
	let store = Store::connect(database_url).await?;
	info!("durable store ready");

	let chat_base_url = server_cfg.chat.api_base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
	let access_token = server_cfg
		.chat
		.channel_access_token
		.clone()
		.unwrap_or_else(|| SecretString::new(String::new()));
	let chat: Arc<dyn ChatApi> = Arc::new(LineClient::new(chat_base_url, access_token));

	let owner = match server_cfg.chat.owner_id.as_deref() {
		Some(id) => match RecipientId::new(id) {
			Ok(owner) => Some(owner),
			Err(e) => {
				warn!(error = %e, "invalid owner_id in config; owner notifications disabled");
				None
			}
		},
		None => None,
	};

	let registry = PendingRegistry::new();
	let hub = DeviceHub::new(DeviceHubConfig::default());
	let shared = SharedState::new();
	let notifier = OwnerNotifier::new(Arc::clone(&chat), owner);

	let base_url = server_cfg
		.server
		.base_url
		.clone()
		.unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
	let url_access_token = server_cfg
		.media
		.url_access_token
		.clone()
		.unwrap_or_else(|| SecretString::new(String::new()));
	let media = MediaUrls::new(&base_url, url_access_token.expose());

	let correlator = Correlator::new(
		Arc::clone(&chat),
		registry.clone(),
		hub.clone(),
		store.clone(),
		shared.clone(),
		notifier.clone(),
		media,
	);
	let dispatcher = Dispatcher::new(Arc::clone(&chat), registry.clone(), hub.clone(), store.clone());

	let channel_secret = server_cfg
		.chat
		.channel_secret
		.clone()
		.unwrap_or_else(|| SecretString::new(String::new()));

	if let Some(bind) = server_cfg.server.http_bind.as_deref() {
		match bind.parse::<std::net::SocketAddr>() {
			Ok(addr) => {
				spawn_http_server(
					addr,
					HttpState {
						dispatcher,
						correlator: correlator.clone(),
						store: store.clone(),
						shared: shared.clone(),
						channel_secret,
						url_access_token,
					},
				);
			}
			Err(e) => warn!(error = %e, %bind, "invalid http bind address (expected host:port)"),
		}
	} else {
		warn!("no http_bind configured; webhook and image endpoints disabled");
	}

	let (events_tx, events_rx) = mpsc::channel(DEVICE_EVENT_QUEUE);
	tokio::spawn(correlator.run(events_rx));

	run_device_listener(
		device_bind,
		hub,
		server_cfg.device.shared_token.clone(),
		events_tx,
		notifier,
	)
	.await
}
