#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use homelink_domain::{CommandKind, RecipientId};
use tokio::sync::Mutex;
use tracing::debug;

/// Per-command-kind sets of recipients awaiting a device reply.
///
/// Entries carry no metadata and are never persisted; a restart loses them.
/// The set for a kind is authoritative only between "command emitted" and
/// "reply drained": a request registered while a fan-out for the same kind is
/// in flight may miss that fan-out and still be cleared by its drain. That
/// window is part of the contract, not a bug to fix here.
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
	inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
	sets: HashMap<CommandKind, HashSet<RecipientId>>,
}

impl PendingRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Deduplicating insert. Returns `true` if the recipient was newly added.
	pub async fn add(&self, kind: CommandKind, id: RecipientId) -> bool {
		let mut inner = self.inner.lock().await;
		let inserted = inner.sets.entry(kind).or_default().insert(id);

		if inserted {
			debug!(kind = %kind, pending = inner.sets.get(&kind).map(HashSet::len).unwrap_or(0), "registered pending requester");
		}

		inserted
	}

	/// Snapshot of the current set without clearing it (fan-out reads this).
	pub async fn snapshot(&self, kind: CommandKind) -> HashSet<RecipientId> {
		let inner = self.inner.lock().await;
		inner.sets.get(&kind).cloned().unwrap_or_default()
	}

	/// Atomic clear-and-return of the set for `kind`.
	///
	/// Clears everything present at call time, including recipients added
	/// after an earlier `snapshot`.
	pub async fn drain(&self, kind: CommandKind) -> HashSet<RecipientId> {
		let mut inner = self.inner.lock().await;
		inner.sets.remove(&kind).unwrap_or_default()
	}

	/// Number of recipients currently waiting on `kind`.
	pub async fn len(&self, kind: CommandKind) -> usize {
		let inner = self.inner.lock().await;
		inner.sets.get(&kind).map(HashSet::len).unwrap_or(0)
	}
}
