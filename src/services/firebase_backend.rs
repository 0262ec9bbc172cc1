// src/services/firebase_backend.rs
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Url, header::ACCEPT};
use reqwest_eventsource::{Event, EventSource, retry::ExponentialBackoff};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::{geofence::GeofenceConfig, order::OrderSnapshot},
    services::{
        backend::{ConfigSource, OrderSource, sort_newest_first},
        subscription::EventSink,
    },
    utils::shared_init::SharedInit,
};

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub database_url: String,
    pub auth_token: Option<String>,
    pub geofence_path: String,
    pub orders_path: String,
    pub request_timeout: Duration,
    /// First reconnect delay after a stream drops; doubles up to 30 s.
    pub reconnect_delay: Duration,
    /// Consecutive reconnects before a stream is given up. `None` retries
    /// forever.
    pub max_reconnects: Option<usize>,
}

impl FirebaseConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            auth_token: None,
            geofence_path: "settings/geofence".to_string(),
            orders_path: "orders".to_string(),
            request_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(1),
            max_reconnects: None,
        }
    }
}

#[derive(Debug)]
struct FirebaseClient {
    http: reqwest::Client,
    base: Url,
}

/// Body of a realtime-database `put` / `patch` stream event.
#[derive(Debug, Deserialize)]
struct StreamBody {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Firebase Realtime Database over its REST interface.
///
/// Reads are plain `GET {node}.json`. Subscriptions follow the node's
/// event stream, reconnecting with backoff when it drops, and forward every
/// change as a whole replacement value.
pub struct FirebaseBackend {
    config: FirebaseConfig,
    client: SharedInit<FirebaseClient>,
}

impl FirebaseBackend {
    pub fn new(config: FirebaseConfig) -> Self {
        Self {
            config,
            client: SharedInit::new("Firebase client"),
        }
    }

    async fn client(&self) -> SparrowResult<&FirebaseClient> {
        self.client
            .get_or_try_init(|| async {
                let mut base = Url::parse(&self.config.database_url).map_err(SparrowError::invalid_url)?;
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                // the stream itself must not time out, only connection setup
                let http = reqwest::Client::builder()
                    .connect_timeout(self.config.request_timeout)
                    .build()?;
                Ok::<_, SparrowError>(FirebaseClient { http, base })
            })
            .await
    }

    async fn resolve(&self, path: &str) -> SparrowResult<(reqwest::Client, Url)> {
        let client = self.client().await?;
        let url = node_url(&client.base, path, self.config.auth_token.as_deref())?;
        Ok((client.http.clone(), url))
    }

    fn spawn_stream<T, D>(&self, http: reqwest::Client, url: Url, sink: EventSink<T>, decode: D)
    where
        T: Send + 'static,
        D: Fn(Value) -> SparrowResult<Option<T>> + Send + Sync + 'static,
    {
        let pump_sink = sink.clone();
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            pump(http, url, pump_sink, decode, &config).await;
        });
        sink.attach(handle.abort_handle());
    }
}

fn node_url(base: &Url, path: &str, auth: Option<&str>) -> SparrowResult<Url> {
    let mut url = base
        .join(&format!("{}.json", path.trim_matches('/')))
        .map_err(SparrowError::invalid_url)?;
    if let Some(token) = auth {
        url.query_pairs_mut().append_pair("auth", token);
    }
    Ok(url)
}

async fn read_value(http: &reqwest::Client, url: &Url, timeout: Duration) -> SparrowResult<Value> {
    let response = http.get(url.clone()).timeout(timeout).send().await?;
    if !response.status().is_success() {
        return Err(SparrowError::FetchFailed(format!(
            "GET {} returned {}",
            url.path(),
            response.status()
        )));
    }
    Ok(response.json::<Value>().await?)
}

/// Whether the pump keeps reading.
enum Flow {
    Continue,
    Stop,
}

fn keep_going(delivered: bool) -> Flow {
    if delivered { Flow::Continue } else { Flow::Stop }
}

async fn pump<T, D>(http: reqwest::Client, url: Url, sink: EventSink<T>, decode: D, config: &FirebaseConfig)
where
    D: Fn(Value) -> SparrowResult<Option<T>>,
{
    let request = http.get(url.clone()).header(ACCEPT, "text/event-stream");
    let mut stream = match EventSource::new(request) {
        Ok(stream) => stream,
        Err(e) => {
            sink.finish(SparrowError::SubscriptionFailed(e.to_string()));
            return;
        }
    };
    stream.set_retry_policy(Box::new(ExponentialBackoff::new(
        config.reconnect_delay,
        2.0,
        Some(MAX_RECONNECT_DELAY),
        config.max_reconnects,
    )));

    while let Some(event) = stream.next().await {
        let flow = match event {
            Ok(Event::Open) => {
                tracing::info!("Streaming {}", url.path());
                Flow::Continue
            }
            Ok(Event::Message(message)) => {
                handle_message(&http, &url, &message, &sink, &decode, config.request_timeout).await
            }
            Err(reqwest_eventsource::Error::StreamEnded) => {
                tracing::warn!("Stream {} dropped, reconnecting", url.path());
                keep_going(sink.error(SparrowError::SubscriptionFailed(format!(
                    "stream {} dropped, reconnecting",
                    url.path()
                ))))
            }
            Err(e @ reqwest_eventsource::Error::InvalidStatusCode(..))
            | Err(e @ reqwest_eventsource::Error::InvalidContentType(..)) => {
                // a refused listen is final
                tracing::error!("Stream {} refused: {}", url.path(), e);
                stream.close();
                sink.finish(SparrowError::SubscriptionFailed(format!(
                    "stream {} refused ({}) and will not reconnect",
                    url.path(),
                    e
                )));
                return;
            }
            Err(reqwest_eventsource::Error::Transport(e)) => {
                tracing::warn!("Stream {} transport error: {}", url.path(), e);
                keep_going(sink.error(e.into()))
            }
            Err(e) => {
                tracing::warn!("Stream {} failed: {}", url.path(), e);
                keep_going(sink.error(SparrowError::SubscriptionFailed(format!(
                    "stream {}: {}",
                    url.path(),
                    e
                ))))
            }
        };
        if let Flow::Stop = flow {
            stream.close();
            return;
        }
    }

    tracing::error!("Stream {} gave up", url.path());
    sink.finish(SparrowError::SubscriptionFailed(format!(
        "stream {} closed and will not reconnect",
        url.path()
    )));
}

async fn handle_message<T, D>(
    http: &reqwest::Client,
    url: &Url,
    message: &eventsource_stream::Event,
    sink: &EventSink<T>,
    decode: &D,
    read_timeout: Duration,
) -> Flow
where
    D: Fn(Value) -> SparrowResult<Option<T>>,
{
    match message.event.as_str() {
        "put" | "patch" => {
            let value = match serde_json::from_str::<StreamBody>(&message.data) {
                Ok(body) if message.event == "put" && body.path == "/" => Ok(body.data),
                // partial change: re-read so subscribers get a whole value
                Ok(_) => read_value(http, url, read_timeout).await,
                Err(e) => Err(e.into()),
            };
            let delivered = match value.and_then(decode) {
                Ok(Some(value)) => sink.data(value),
                Ok(None) => !sink.is_closed(),
                Err(e) => sink.error(e),
            };
            keep_going(delivered)
        }
        "keep-alive" => {
            tracing::trace!("keep-alive on {}", url.path());
            Flow::Continue
        }
        "cancel" | "auth_revoked" => {
            tracing::warn!("Stream {} ended by server: {}", url.path(), message.event);
            sink.finish(SparrowError::SubscriptionRevoked(message.event.clone()));
            Flow::Stop
        }
        other => {
            tracing::debug!("Ignoring stream event {}", other);
            Flow::Continue
        }
    }
}

fn decode_config(value: Value) -> SparrowResult<Option<GeofenceConfig>> {
    if value.is_null() {
        tracing::warn!("Geofence node is empty");
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

fn decode_order(order_id: &str, value: Value) -> SparrowResult<Option<OrderSnapshot>> {
    if value.is_null() {
        return Ok(None);
    }
    let mut order: OrderSnapshot = serde_json::from_value(value)?;
    if order.id.is_empty() {
        order.id = order_id.to_string();
    }
    Ok(Some(order))
}

/// The orders node is a map keyed by order id. Malformed entries are
/// skipped so one bad record cannot blank the whole list.
fn decode_orders(value: Value) -> SparrowResult<Vec<OrderSnapshot>> {
    let entries = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(entries) => entries,
        other => {
            return Err(SparrowError::InvalidFormat(format!(
                "orders node must be an object, got {}",
                other
            )));
        }
    };

    let mut orders = Vec::with_capacity(entries.len());
    for (key, entry) in entries {
        match decode_order(&key, entry) {
            Ok(Some(order)) => orders.push(order),
            Ok(None) => {}
            Err(e) => tracing::warn!("Skipping malformed order {}: {}", key, e),
        }
    }
    sort_newest_first(&mut orders);
    Ok(orders)
}

#[async_trait]
impl ConfigSource for FirebaseBackend {
    async fn fetch_config(&self) -> SparrowResult<Option<GeofenceConfig>> {
        let (http, url) = self.resolve(&self.config.geofence_path).await?;
        let value = read_value(&http, &url, self.config.request_timeout).await?;
        decode_config(value)
    }

    async fn subscribe_config(&self, sink: EventSink<GeofenceConfig>) -> SparrowResult<()> {
        let (http, url) = self.resolve(&self.config.geofence_path).await?;
        self.spawn_stream(http, url, sink, decode_config);
        Ok(())
    }
}

#[async_trait]
impl OrderSource for FirebaseBackend {
    async fn subscribe_orders(&self, sink: EventSink<Vec<OrderSnapshot>>) -> SparrowResult<()> {
        let (http, url) = self.resolve(&self.config.orders_path).await?;
        self.spawn_stream(http, url, sink, |value| decode_orders(value).map(Some));
        Ok(())
    }

    async fn subscribe_order(
        &self,
        order_id: &str,
        sink: EventSink<Option<OrderSnapshot>>,
    ) -> SparrowResult<()> {
        let path = format!("{}/{}", self.config.orders_path.trim_end_matches('/'), order_id);
        let (http, url) = self.resolve(&path).await?;
        let order_id = order_id.to_string();
        self.spawn_stream(http, url, sink, move |value| decode_order(&order_id, value).map(Some));
        Ok(())
    }
}
