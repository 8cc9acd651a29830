#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use homelink_chat::SecretString;
use serde::Deserialize;
use tracing::{info, warn};

/// Default config path: `~/.homelink/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".homelink").join("config.toml"))
}

/// Load the server config from TOML at `path`, then apply env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub chat: ChatSettings,
	pub device: DeviceSettings,
	pub media: MediaSettings,
	pub persistence: PersistenceSettings,
}

#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
	/// Webhook/image/phone HTTP bind address (host:port).
	pub http_bind: Option<String>,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Externally reachable base URL used to build image download links.
	pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChatSettings {
	/// Webhook signature secret.
	pub channel_secret: Option<SecretString>,
	/// Outbound API bearer token.
	pub channel_access_token: Option<SecretString>,
	/// Recipient for owner notifications (user/group/room id).
	pub owner_id: Option<String>,
	/// Chat API base URL (optional override).
	pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceSettings {
	/// Shared secret the device channel handshake must present.
	pub shared_token: Option<SecretString>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaSettings {
	/// Static access key gating the image download endpoints.
	pub url_access_token: Option<SecretString>,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceSettings {
	/// Database URL (sqlite: or postgres:).
	pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	chat: FileChatSettings,

	#[serde(default)]
	device: FileDeviceSettings,

	#[serde(default)]
	media: FileMediaSettings,

	#[serde(default)]
	persistence: FilePersistenceSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	http_bind: Option<String>,
	metrics_bind: Option<String>,
	base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileChatSettings {
	channel_secret: Option<String>,
	channel_access_token: Option<String>,
	owner_id: Option<String>,
	api_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileDeviceSettings {
	shared_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileMediaSettings {
	url_access_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePersistenceSettings {
	database_url: Option<String>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		Self {
			server: ServerSettings {
				http_bind: file.server.http_bind.filter(|s| !s.trim().is_empty()),
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				base_url: file.server.base_url.filter(|s| !s.trim().is_empty()),
			},
			chat: ChatSettings {
				channel_secret: file
					.chat
					.channel_secret
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				channel_access_token: file
					.chat
					.channel_access_token
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				owner_id: file.chat.owner_id.filter(|s| !s.trim().is_empty()),
				api_base_url: file.chat.api_base_url.filter(|s| !s.trim().is_empty()),
			},
			device: DeviceSettings {
				shared_token: file
					.device
					.shared_token
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
			},
			media: MediaSettings {
				url_access_token: file
					.media
					.url_access_token
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
			},
			persistence: PersistenceSettings {
				database_url: file.persistence.database_url.filter(|s| !s.trim().is_empty()),
			},
		}
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ServerConfig) {
	if let Ok(v) = std::env::var("HOMELINK_HTTP_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.http_bind = Some(v);
			info!("server config: http_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_BASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.base_url = Some(v);
			info!("server config: base_url overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_CHANNEL_SECRET") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.chat.channel_secret = Some(SecretString::new(v));
			info!("chat config: channel_secret overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_CHANNEL_ACCESS_TOKEN") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.chat.channel_access_token = Some(SecretString::new(v));
			info!("chat config: channel_access_token overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_OWNER_ID") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.chat.owner_id = Some(v);
			info!("chat config: owner_id overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_CHAT_API_BASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.chat.api_base_url = Some(v);
			info!("chat config: api_base_url overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_DEVICE_SHARED_TOKEN") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.device.shared_token = Some(SecretString::new(v));
			info!("device config: shared_token overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_URL_ACCESS_TOKEN") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.media.url_access_token = Some(SecretString::new(v));
			info!("media config: url_access_token overridden by env");
		}
	}

	if let Ok(v) = std::env::var("HOMELINK_DATABASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.persistence.database_url = Some(v);
			info!("persistence: database_url overridden by env");
		}
	}

	if cfg.chat.channel_secret.is_none() {
		warn!("chat config: no channel_secret configured; webhook requests will be rejected");
	}

	if cfg.device.shared_token.is_none() {
		warn!("device config: no shared_token configured; device connections will be refused");
	}
}
