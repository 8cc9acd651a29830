#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

/// Shared in-memory server state.
///
/// The image slot is last-write-wins with no history; display names are a
/// best-effort cache filled by profile lookups that nobody awaits.
#[derive(Clone, Default)]
pub struct SharedState {
	latest_image: Arc<RwLock<Option<Bytes>>>,
	display_names: Arc<RwLock<HashMap<String, String>>>,
}

impl SharedState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Overwrite the most recently received image.
	pub fn set_latest_image(&self, image: Bytes) {
		if let Ok(mut slot) = self.latest_image.write() {
			*slot = Some(image);
		}
	}

	/// Current image, if any has arrived since startup.
	pub fn latest_image(&self) -> Option<Bytes> {
		self.latest_image.read().ok().and_then(|slot| slot.clone())
	}

	pub fn remember_display_name(&self, id: impl Into<String>, name: impl Into<String>) {
		if let Ok(mut names) = self.display_names.write() {
			names.insert(id.into(), name.into());
		}
	}

	/// Cached display name; empty-handed until a lookup has landed.
	pub fn display_name(&self, id: &str) -> Option<String> {
		self.display_names.read().ok().and_then(|names| names.get(id).cloned())
	}
}
