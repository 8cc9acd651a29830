#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum frame size for v1.
///
/// Picture payloads arrive base64-inlined, so the ceiling is generous.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024; // 8 MiB

#[derive(Debug, Error)]
pub enum FrameError {
	#[error("frame exceeds maximum size: len={len} max={max}")]
	FrameTooLarge {
		len: usize,
		max: usize,
	},

	#[error("json decode error: {0}")]
	Decode(#[source] serde_json::Error),

	#[error("json encode error: {0}")]
	Encode(#[source] serde_json::Error),
}

/// A `{name, status}` pair reported by the router in a `tv-status` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TvStatusEntry {
	pub name: String,
	pub status: String,
}

/// Device → server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceEvent {
	/// Camera snapshot, base64-inlined.
	#[serde(rename = "picture-ready")]
	PictureReady {
		#[serde(rename = "imageBase64")]
		image_base64: String,
	},

	/// Bulk status report for all TVs the router can see.
	#[serde(rename = "tv-status")]
	TvStatus {
		statuses: Vec<TvStatusEntry>,
	},

	/// Router asks for the persisted ban flag of one TV.
	#[serde(rename = "tv-ban-query")]
	TvBanQuery {
		name: String,
	},

	/// Single observed status change, to be appended to the audit log.
	#[serde(rename = "tv-status-log")]
	TvStatusLog {
		name: String,
		status: String,
	},

	/// A TV stopped responding; owner-notification only.
	#[serde(rename = "tv-offline-notice")]
	TvOfflineNotice {
		name: String,
	},
}

/// Server → device frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceCommand {
	#[serde(rename = "request-picture")]
	RequestPicture,

	#[serde(rename = "request-location")]
	RequestLocation,

	#[serde(rename = "request-tv-status")]
	RequestTvStatus,

	/// The persisted ban flag for `name` changed; the router should re-query.
	#[serde(rename = "ban-updated")]
	BanUpdated {
		name: String,
	},

	/// Reply to a `tv-ban-query`, carrying the stored flag code ("0"/"1").
	#[serde(rename = "ban-state")]
	BanState {
		name: String,
		ban: String,
	},
}

/// Encode a device event as a JSON text frame.
pub fn encode_event(event: &DeviceEvent) -> Result<String, FrameError> {
	serde_json::to_string(event).map_err(FrameError::Encode)
}

/// Encode a server command as a JSON text frame.
pub fn encode_command(command: &DeviceCommand) -> Result<String, FrameError> {
	serde_json::to_string(command).map_err(FrameError::Encode)
}

/// Decode a device → server frame, enforcing the size ceiling.
pub fn decode_event(text: &str, max_frame_size: usize) -> Result<DeviceEvent, FrameError> {
	if text.len() > max_frame_size {
		return Err(FrameError::FrameTooLarge {
			len: text.len(),
			max: max_frame_size,
		});
	}

	serde_json::from_str(text).map_err(FrameError::Decode)
}

/// Decode a server → device frame, enforcing the size ceiling.
pub fn decode_command(text: &str, max_frame_size: usize) -> Result<DeviceCommand, FrameError> {
	if text.len() > max_frame_size {
		return Err(FrameError::FrameTooLarge {
			len: text.len(),
			max: max_frame_size,
		});
	}

	serde_json::from_str(text).map_err(FrameError::Decode)
}
