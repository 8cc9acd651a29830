#![forbid(unsafe_code)]

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use homelink_domain::RecipientId;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::messages::Message;
use crate::{ChatApi, Profile, SecretString};

/// Outbound LINE messaging client.
#[derive(Debug, Clone)]
pub struct LineClient {
	base_url: String,
	access_token: SecretString,
	client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ReplyRequest<'a> {
	#[serde(rename = "replyToken")]
	reply_token: &'a str,
	messages: &'a [Message],
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
	to: &'a str,
	messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
	#[serde(rename = "displayName", default)]
	display_name: String,
}

impl LineClient {
	pub fn new(base_url: impl Into<String>, access_token: SecretString) -> Self {
		Self {
			base_url: base_url.into(),
			access_token,
			client: reqwest::Client::new(),
		}
	}

	fn auth_header(&self) -> anyhow::Result<String> {
		if self.access_token.expose().trim().is_empty() {
			return Err(anyhow!("missing channel access token"));
		}
		Ok(format!("Bearer {}", self.access_token.expose().trim()))
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}{}", self.base_url.trim_end_matches('/'), path)
	}
}

#[async_trait]
impl ChatApi for LineClient {
	async fn reply(&self, reply_token: &str, messages: Vec<Message>) -> anyhow::Result<()> {
		let body = ReplyRequest {
			reply_token,
			messages: &messages,
		};

		let resp = self
			.client
			.post(self.endpoint("/v2/bot/message/reply"))
			.header("Authorization", self.auth_header()?)
			.json(&body)
			.send()
			.await
			.context("line reply")?;

		match resp.status() {
			StatusCode::OK => Ok(()),
			status => Err(anyhow!("line reply failed: status={}", status)),
		}
	}

	async fn push(&self, to: &RecipientId, messages: Vec<Message>) -> anyhow::Result<()> {
		let body = PushRequest {
			to: to.as_str(),
			messages: &messages,
		};

		let resp = self
			.client
			.post(self.endpoint("/v2/bot/message/push"))
			.header("Authorization", self.auth_header()?)
			.json(&body)
			.send()
			.await
			.context("line push")?;

		match resp.status() {
			StatusCode::OK => Ok(()),
			status => Err(anyhow!("line push failed: status={}", status)),
		}
	}

	async fn profile(&self, user_id: &str) -> anyhow::Result<Profile> {
		let resp = self
			.client
			.get(self.endpoint(&format!("/v2/bot/profile/{user_id}")))
			.header("Authorization", self.auth_header()?)
			.send()
			.await
			.context("line profile")?;

		match resp.status() {
			StatusCode::OK => {
				let profile: ProfileResponse = resp.json().await.context("parse profile response")?;
				Ok(Profile {
					display_name: profile.display_name,
				})
			}
			status => Err(anyhow!("line profile failed: status={}", status)),
		}
	}
}
