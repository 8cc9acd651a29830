#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use homelink_chat::SecretString;
use homelink_chat::signature::verify_signature;
use homelink_chat::webhook::WebhookBody;

use crate::server::correlator::Correlator;
use crate::server::dispatcher::{Dispatcher, process_events};
use crate::server::state::SharedState;
use crate::server::store::Store;

/// Everything the HTTP surface needs, cheap to clone per connection.
#[derive(Clone)]
pub struct HttpState {
	pub dispatcher: Dispatcher,
	pub correlator: Correlator,
	pub store: Store,
	pub shared: SharedState,
	pub channel_secret: SecretString,
	pub url_access_token: SecretString,
}

/// `POST /phone` body: either a push-registration or a location reply.
#[derive(Debug, Deserialize)]
struct PhoneBody {
	#[serde(default)]
	token: Option<String>,
	#[serde(default)]
	latitude: Option<f64>,
	#[serde(default)]
	longitude: Option<f64>,
}

pub fn spawn_http_server(bind: SocketAddr, state: HttpState) {
	tokio::spawn(async move {
		if let Err(err) = run_http_server(bind, state).await {
			warn!(error = %err, "http server stopped");
		}
	});
}

async fn run_http_server(bind: SocketAddr, state: HttpState) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind).await?;
	info!(%bind, "http server listening");

	loop {
		let (stream, _addr) = listener.accept().await?;
		let io = TokioIo::new(stream);
		let state = state.clone();
		tokio::spawn(async move {
			let service = service_fn(move |req| handle_request(req, state.clone()));
			if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
				warn!(error = %err, "http connection error");
			}
		});
	}
}

async fn handle_request(req: Request<Incoming>, state: HttpState) -> Result<Response<Full<Bytes>>, hyper::Error> {
	let (parts, body) = req.into_parts();
	let query = parts.uri.query().map(str::to_owned);

	let body = match body.collect().await {
		Ok(collected) => collected.to_bytes(),
		Err(e) => {
			warn!(error = %e, "failed to read request body");
			return Ok(plain(StatusCode::BAD_REQUEST, "bad body"));
		}
	};

	Ok(route(
		&state,
		&parts.method,
		parts.uri.path(),
		query.as_deref(),
		&parts.headers,
		body,
	)
	.await)
}

/// Route a fully-read request. Split from the hyper plumbing so tests can
/// exercise it without a socket.
pub(crate) async fn route(
	state: &HttpState,
	method: &Method,
	path: &str,
	query: Option<&str>,
	headers: &HeaderMap,
	body: Bytes,
) -> Response<Full<Bytes>> {
	match (method, path) {
		(&Method::POST, "/callback") => handle_callback(state, headers, body).await,
		(&Method::GET, "/image/full") | (&Method::GET, "/image/preview") => handle_image(state, query),
		(&Method::POST, "/phone") => handle_phone(state, body).await,
		_ => plain(StatusCode::NOT_FOUND, "not found"),
	}
}

/// Chat webhook: verify the signature over the raw body, then handle every
/// event independently. The platform always gets a success-shaped batch
/// response; individual event failures never abort the batch.
async fn handle_callback(state: &HttpState, headers: &HeaderMap, body: Bytes) -> Response<Full<Bytes>> {
	metrics::counter!("homelink_webhook_requests_total").increment(1);

	let signature = headers.get("x-line-signature").and_then(|v| v.to_str().ok());

	let Some(signature) = signature else {
		warn!("webhook request without signature header");
		return plain(StatusCode::UNAUTHORIZED, "missing signature");
	};

	if !verify_signature(state.channel_secret.expose(), &body, signature) {
		warn!("webhook request with invalid signature");
		metrics::counter!("homelink_webhook_bad_signatures_total").increment(1);
		return plain(StatusCode::UNAUTHORIZED, "invalid signature");
	}

	let parsed: WebhookBody = match serde_json::from_slice(&body) {
		Ok(parsed) => parsed,
		Err(e) => {
			warn!(error = %e, "webhook body is not valid json");
			return plain(StatusCode::BAD_REQUEST, "bad body");
		}
	};

	let results = process_events(&state.dispatcher, &parsed).await;
	json_response(StatusCode::OK, &serde_json::Value::Array(results))
}

/// Latest-image download, gated by the static URL access token.
///
/// Full and preview share one image slot; the paths differ only so the chat
/// platform sees two distinct URLs.
fn handle_image(state: &HttpState, query: Option<&str>) -> Response<Full<Bytes>> {
	let key = query.and_then(|q| {
		url::form_urlencoded::parse(q.as_bytes())
			.find(|(k, _)| k == "key")
			.map(|(_, v)| v.into_owned())
	});

	match key {
		Some(key) if key == state.url_access_token.expose() => {}
		_ => {
			warn!("image request with bad or missing access key");
			return plain(StatusCode::UNAUTHORIZED, "bad key");
		}
	}

	match state.shared.latest_image() {
		Some(image) => Response::builder()
			.status(StatusCode::OK)
			.header("content-type", "image/jpeg")
			.body(Full::new(image))
			.unwrap(),
		None => plain(StatusCode::NOT_FOUND, "no image"),
	}
}

/// Phone companion endpoint: `{token}` registers for push notifications,
/// `{latitude, longitude}` is a location reply.
async fn handle_phone(state: &HttpState, body: Bytes) -> Response<Full<Bytes>> {
	let parsed: PhoneBody = match serde_json::from_slice(&body) {
		Ok(parsed) => parsed,
		Err(e) => {
			warn!(error = %e, "phone body is not valid json");
			return plain(StatusCode::BAD_REQUEST, "bad body");
		}
	};

	if let Some(token) = parsed.token.as_deref() {
		if let Err(e) = state.store.set_notify_token(token).await {
			warn!(error = %e, "failed to persist notify token");
		} else {
			debug!("notify token registered");
		}
		return json_response(StatusCode::OK, &json!({ "status": "registered" }));
	}

	if let (Some(latitude), Some(longitude)) = (parsed.latitude, parsed.longitude) {
		state.correlator.handle_location_reply(latitude, longitude).await;
		return json_response(StatusCode::OK, &json!({ "status": "delivered" }));
	}

	plain(StatusCode::BAD_REQUEST, "expected token or latitude/longitude")
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
	Response::builder().status(status).body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
	Response::builder()
		.status(status)
		.header("content-type", "application/json")
		.body(Full::new(Bytes::from(value.to_string())))
		.unwrap()
}
