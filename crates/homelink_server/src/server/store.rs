#![forbid(unsafe_code)]

use anyhow::{Context, anyhow};
use homelink_domain::{BanFlag, TvName};

use crate::util::time::unix_secs_now;

/// Hard cap on rows returned by a status-log query.
pub const LOG_PAGE_SIZE: i64 = 20;

/// One immutable status-log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLogEntry {
	pub status: String,
	pub observed_at: i64,
}

/// Durable config/log store: per-TV ban flags, the append-only status log,
/// and the singleton phone notification token.
///
/// Callers treat every operation as best-effort: failures are logged at the
/// call site and never retried or surfaced to chat users.
#[derive(Clone)]
pub struct Store {
	backend: Backend,
}

#[derive(Clone)]
enum Backend {
	Sqlite(sqlx::SqlitePool),
	Postgres(sqlx::PgPool),
}

impl Store {
	pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
		if database_url.starts_with("sqlite:") {
			// Each in-memory sqlite connection is its own database; a pool
			// larger than one would migrate one connection and query another.
			let pool = if database_url.contains(":memory:") {
				sqlx::sqlite::SqlitePoolOptions::new()
					.max_connections(1)
					.connect(database_url)
					.await
					.context("connect sqlite")?
			} else {
				sqlx::SqlitePool::connect(database_url).await.context("connect sqlite")?
			};

			sqlx::migrate!("migrations/sqlite")
				.run(&pool)
				.await
				.context("run sqlite migrations")?;

			Ok(Self {
				backend: Backend::Sqlite(pool),
			})
		} else if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:") {
			let pool = sqlx::PgPool::connect(database_url).await.context("connect postgres")?;
			sqlx::migrate!("migrations/postgres")
				.run(&pool)
				.await
				.context("run postgres migrations")?;

			Ok(Self {
				backend: Backend::Postgres(pool),
			})
		} else {
			Err(anyhow!("unsupported database_url (expected sqlite: or postgres:)"))
		}
	}

	/// Raw persisted ban code for `name`, if any record exists.
	///
	/// Returns the stored string untouched; callers validate it against the
	/// two sentinel codes and decide what an invalid value means for them.
	pub async fn ban_flag(&self, name: &TvName) -> anyhow::Result<Option<String>> {
		match &self.backend {
			Backend::Sqlite(pool) => sqlx::query_scalar::<_, String>("SELECT flag FROM tv_ban_flags WHERE name = ?")
				.bind(name.as_str())
				.fetch_optional(pool)
				.await
				.context("select ban flag (sqlite)"),
			Backend::Postgres(pool) => sqlx::query_scalar::<_, String>("SELECT flag FROM tv_ban_flags WHERE name = $1")
				.bind(name.as_str())
				.fetch_optional(pool)
				.await
				.context("select ban flag (postgres)"),
		}
	}

	/// Persist the ban flag for `name`, creating or overwriting the record.
	pub async fn set_ban_flag(&self, name: &TvName, flag: BanFlag) -> anyhow::Result<()> {
		match &self.backend {
			Backend::Sqlite(pool) => {
				sqlx::query(
					"INSERT INTO tv_ban_flags (name, flag) VALUES (?, ?) \
					ON CONFLICT(name) DO UPDATE SET flag = excluded.flag",
				)
				.bind(name.as_str())
				.bind(flag.code())
				.execute(pool)
				.await
				.context("upsert ban flag (sqlite)")?;
			}
			Backend::Postgres(pool) => {
				sqlx::query(
					"INSERT INTO tv_ban_flags (name, flag) VALUES ($1, $2) \
					ON CONFLICT(name) DO UPDATE SET flag = excluded.flag",
				)
				.bind(name.as_str())
				.bind(flag.code())
				.execute(pool)
				.await
				.context("upsert ban flag (postgres)")?;
			}
		}

		Ok(())
	}

	/// Append an immutable status row with a server-assigned timestamp.
	pub async fn append_status_log(&self, name: &TvName, status: &str) -> anyhow::Result<()> {
		self.append_status_log_at(name, status, unix_secs_now()).await
	}

	pub(crate) async fn append_status_log_at(&self, name: &TvName, status: &str, observed_at: i64) -> anyhow::Result<()> {
		match &self.backend {
			Backend::Sqlite(pool) => {
				sqlx::query("INSERT INTO tv_status_log (name, status, observed_at) VALUES (?, ?, ?)")
					.bind(name.as_str())
					.bind(status)
					.bind(observed_at)
					.execute(pool)
					.await
					.context("insert status log (sqlite)")?;
			}
			Backend::Postgres(pool) => {
				sqlx::query("INSERT INTO tv_status_log (name, status, observed_at) VALUES ($1, $2, $3)")
					.bind(name.as_str())
					.bind(status)
					.bind(observed_at)
					.execute(pool)
					.await
					.context("insert status log (postgres)")?;
			}
		}

		Ok(())
	}

	/// Newest-first status rows for `name`, capped at `LOG_PAGE_SIZE`.
	pub async fn status_logs(&self, name: &TvName) -> anyhow::Result<Vec<StatusLogEntry>> {
		let rows: Vec<(String, i64)> = match &self.backend {
			Backend::Sqlite(pool) => {
				sqlx::query_as(
					"SELECT status, observed_at FROM tv_status_log WHERE name = ? \
					ORDER BY observed_at DESC, id DESC LIMIT ?",
				)
				.bind(name.as_str())
				.bind(LOG_PAGE_SIZE)
				.fetch_all(pool)
				.await
				.context("select status logs (sqlite)")?
			}
			Backend::Postgres(pool) => {
				sqlx::query_as(
					"SELECT status, observed_at FROM tv_status_log WHERE name = $1 \
					ORDER BY observed_at DESC, id DESC LIMIT $2",
				)
				.bind(name.as_str())
				.bind(LOG_PAGE_SIZE)
				.fetch_all(pool)
				.await
				.context("select status logs (postgres)")?
			}
		};

		Ok(rows
			.into_iter()
			.map(|(status, observed_at)| StatusLogEntry { status, observed_at })
			.collect())
	}

	/// The singleton phone notification token, if registered.
	pub async fn notify_token(&self) -> anyhow::Result<Option<String>> {
		match &self.backend {
			Backend::Sqlite(pool) => sqlx::query_scalar::<_, String>("SELECT token FROM notify_token WHERE id = 1")
				.fetch_optional(pool)
				.await
				.context("select notify token (sqlite)"),
			Backend::Postgres(pool) => sqlx::query_scalar::<_, String>("SELECT token FROM notify_token WHERE id = 1")
				.fetch_optional(pool)
				.await
				.context("select notify token (postgres)"),
		}
	}

	/// Overwrite the singleton notification token wholesale.
	pub async fn set_notify_token(&self, token: &str) -> anyhow::Result<()> {
		match &self.backend {
			Backend::Sqlite(pool) => {
				sqlx::query(
					"INSERT INTO notify_token (id, token) VALUES (1, ?) \
					ON CONFLICT(id) DO UPDATE SET token = excluded.token",
				)
				.bind(token)
				.execute(pool)
				.await
				.context("upsert notify token (sqlite)")?;
			}
			Backend::Postgres(pool) => {
				sqlx::query(
					"INSERT INTO notify_token (id, token) VALUES (1, $1) \
					ON CONFLICT(id) DO UPDATE SET token = excluded.token",
				)
				.bind(token)
				.execute(pool)
				.await
				.context("upsert notify token (postgres)")?;
			}
		}

		Ok(())
	}
}
