#![forbid(unsafe_code)]

use homelink_domain::{BanFlag, TvName};

use crate::server::store::{LOG_PAGE_SIZE, Store};

async fn memory_store() -> Store {
	Store::connect("sqlite::memory:").await.expect("in-memory store")
}

fn tv(name: &str) -> TvName {
	TvName::new(name).expect("valid TvName")
}

#[tokio::test]
async fn unknown_tv_has_no_flag() {
	let store = memory_store().await;
	assert_eq!(store.ban_flag(&tv("LivingTV")).await.expect("query"), None);
}

#[tokio::test]
async fn ban_flag_roundtrip_restores_original_value() {
	let store = memory_store().await;
	let name = tv("LivingTV");

	store.set_ban_flag(&name, BanFlag::Banned).await.expect("persist");
	assert_eq!(store.ban_flag(&name).await.expect("query").as_deref(), Some("1"));

	store.set_ban_flag(&name, BanFlag::Allowed).await.expect("persist");
	assert_eq!(store.ban_flag(&name).await.expect("query").as_deref(), Some("0"));

	store.set_ban_flag(&name, BanFlag::Banned).await.expect("persist");
	assert_eq!(store.ban_flag(&name).await.expect("query").as_deref(), Some("1"));
}

#[tokio::test]
async fn status_logs_are_capped_and_newest_first() {
	let store = memory_store().await;
	let name = tv("LivingTV");

	for i in 0..25i64 {
		store
			.append_status_log_at(&name, &format!("status-{i}"), 1_000 + i)
			.await
			.expect("append");
	}

	let logs = store.status_logs(&name).await.expect("query");
	assert_eq!(logs.len(), LOG_PAGE_SIZE as usize);

	assert_eq!(logs[0].status, "status-24");
	assert_eq!(logs[0].observed_at, 1_024);

	for pair in logs.windows(2) {
		assert!(pair[0].observed_at >= pair[1].observed_at, "log not newest-first");
	}
}

#[tokio::test]
async fn status_logs_are_scoped_by_name() {
	let store = memory_store().await;

	store.append_status_log_at(&tv("LivingTV"), "on", 10).await.expect("append");
	store.append_status_log_at(&tv("BedroomTV"), "off", 11).await.expect("append");

	let logs = store.status_logs(&tv("LivingTV")).await.expect("query");
	assert_eq!(logs.len(), 1);
	assert_eq!(logs[0].status, "on");
}

#[tokio::test]
async fn empty_log_query_returns_no_rows() {
	let store = memory_store().await;
	assert!(store.status_logs(&tv("LivingTV")).await.expect("query").is_empty());
}

#[tokio::test]
async fn notify_token_is_a_singleton_overwritten_wholesale() {
	let store = memory_store().await;

	assert_eq!(store.notify_token().await.expect("query"), None);

	store.set_notify_token("token-a").await.expect("persist");
	assert_eq!(store.notify_token().await.expect("query").as_deref(), Some("token-a"));

	store.set_notify_token("token-b").await.expect("persist");
	assert_eq!(store.notify_token().await.expect("query").as_deref(), Some("token-b"));
}
