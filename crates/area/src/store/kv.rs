//! Remote key-value backing store.
//!
//! Records live at `<base>/data/<collection>/<id>`. `GET` returns a JSON
//! object of attribute names to values (or 404), `POST` to the collection
//! creates a record whose body carries the identifier in a reserved `_key`
//! member, `POST` to the record updates it and `DELETE` removes it. The
//! collection itself is managed through `<base>/config` and
//! `<base>/config/<collection>`.

use super::error::{ErrorKind, Result};
use super::{Store, item_id};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use recon_model::{CachedItem, Schema, Value};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Map, Value as Json, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::instrument;

/// Reserved body member holding the record identifier.
const KEY_MEMBER: &str = "_key";

/// Where to find a remote collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvConnection {
    pub base_url: String,
    pub collection: String,
    pub timeout: Duration,
}

pub struct KvStore {
    name: String,
    collection: String,
    base: Url,
    schema: Arc<Schema>,
    client: Client,
    ready: AtomicBool,
}

impl KvStore {
    pub fn new(name: impl Into<String>, connection: KvConnection, schema: Arc<Schema>) -> Result<Self> {
        let invalid = || ErrorKind::Network(format!("invalid base url: {}", connection.base_url));
        let base = Url::parse(&connection.base_url).or_raise(invalid)?;
        if base.cannot_be_a_base() {
            exn::bail!(invalid());
        }
        let client = Client::builder()
            .timeout(connection.timeout)
            .build()
            .or_raise(|| ErrorKind::Network("unable to build http client".to_string()))?;
        Ok(Self {
            name: name.into(),
            collection: connection.collection,
            base,
            schema,
            client,
            ready: AtomicBool::new(false),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .ok()
            .ok_or_raise(|| ErrorKind::Network(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn record_url(&self, id: &str) -> Result<Url> {
        self.url(&["data", &self.collection, id])
    }

    /// Request body for an item: every schema field plus the reserved key.
    fn body(&self, item: &CachedItem) -> Result<Json> {
        let mut body: Map<String, Json> = item.iter().map(|(name, value)| (name.to_string(), value.to_json())).collect();
        body.insert(KEY_MEMBER.to_string(), Json::String(item_id(item)?));
        Ok(Json::Object(body))
    }

    fn decode(&self, body: Json) -> Result<CachedItem> {
        let Json::Object(mut body) = body else {
            exn::bail!(ErrorKind::InvalidData(self.collection.clone()));
        };
        let mut item = CachedItem::new(self.schema.clone());
        for field in self.schema.fields() {
            let invalid = || ErrorKind::InvalidData(field.name.clone());
            let json = body.remove(&field.name).ok_or_raise(invalid)?;
            let value = Value::from_json_as(field.kind, &field.name, json).or_raise(invalid)?;
            item.set(&field.name, value).or_raise(invalid)?;
        }
        Ok(item)
    }

    fn schema_body(&self) -> Json {
        let fields: Map<String, Json> = self
            .schema
            .fields()
            .iter()
            .map(|field| (field.name.clone(), serde_json::to_value(field.kind).unwrap_or(Json::Null)))
            .collect();
        json!({ "key": self.schema.key(), "fields": fields })
    }

    /// Send a request, mapping 404 to `None` and any other failure status
    /// to an error.
    async fn send(&self, request: RequestBuilder) -> Result<Option<Response>> {
        let network = |e: &reqwest::Error| ErrorKind::Network(e.url().map(Url::to_string).unwrap_or_default());
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = network(&e);
                return Err(exn::Exn::from(e).raise(kind));
            },
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        match response.error_for_status() {
            Ok(response) => Ok(Some(response)),
            Err(e) => {
                let kind = network(&e);
                Err(exn::Exn::from(e).raise(kind))
            },
        }
    }

    async fn collections(&self) -> Result<HashSet<String>> {
        let url = self.url(&["config"])?;
        let Some(response) = self.send(self.client.get(url.clone())).await? else {
            return Ok(HashSet::new());
        };
        let listed: Vec<Json> = response.json().await.or_raise(|| ErrorKind::InvalidData(url.to_string()))?;
        Ok(listed
            .iter()
            .filter_map(|entry| entry.get("name").and_then(Json::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.collections().await?.contains(&self.collection) {
            exn::bail!(ErrorKind::NotInitialized(self.name.clone()));
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl Store for KvStore {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn initialize(&self) -> Result<()> {
        if !self.collections().await?.contains(&self.collection) {
            let create = self.client.post(self.url(&["config"])?).json(&json!({ "name": self.collection }));
            self.send(create).await?;
        }
        let configure = self
            .client
            .post(self.url(&["config", &self.collection])?)
            .json(&self.schema_body());
        self.send(configure).await?;
        if !self.collections().await?.contains(&self.collection) {
            exn::bail!(ErrorKind::Network(format!("collection {} missing after initialize", self.collection)));
        }
        self.ready.store(true, Ordering::Release);
        tracing::info!("Initialized remote collection");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CachedItem>> {
        self.ensure_ready().await?;
        let url = self.record_url(id)?;
        let Some(response) = self.send(self.client.get(url.clone())).await? else {
            return Ok(None);
        };
        let body: Json = response.json().await.or_raise(|| ErrorKind::InvalidData(url.to_string()))?;
        self.decode(body).map(Some)
    }

    async fn insert(&self, item: &CachedItem) -> Result<()> {
        self.ensure_ready().await?;
        let request = self.client.post(self.url(&["data", &self.collection])?).json(&self.body(item)?);
        self.send(request)
            .await?
            .ok_or_raise(|| ErrorKind::NotInitialized(self.name.clone()))?;
        Ok(())
    }

    async fn update(&self, item: &CachedItem) -> Result<()> {
        self.ensure_ready().await?;
        let id = item_id(item)?;
        let request = self.client.post(self.record_url(&id)?).json(&self.body(item)?);
        self.send(request).await?.ok_or_raise(|| ErrorKind::NotFound(id))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_ready().await?;
        let request = self.client.delete(self.record_url(id)?);
        self.send(request)
            .await?
            .ok_or_raise(|| ErrorKind::NotFound(id.to_string()))?;
        Ok(())
    }

    async fn ids(&self) -> Result<HashSet<String>> {
        self.ensure_ready().await?;
        let url = self.url(&["data", &self.collection])?;
        let request = self.client.get(url.clone()).query(&[("fields", KEY_MEMBER)]);
        let Some(response) = self.send(request).await? else {
            return Ok(HashSet::new());
        };
        let records: Vec<Json> = response.json().await.or_raise(|| ErrorKind::InvalidData(url.to_string()))?;
        records
            .iter()
            .map(|record| {
                record
                    .get(KEY_MEMBER)
                    .and_then(|key| Value::from_json(key.clone()).as_id())
                    .ok_or_raise(|| ErrorKind::InvalidData(url.to_string()))
            })
            .collect()
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn clear(&self) -> Result<()> {
        self.ready.store(false, Ordering::Release);
        if !self.collections().await?.contains(&self.collection) {
            return Ok(());
        }
        self.send(self.client.delete(self.url(&["config", &self.collection])?)).await?;
        tracing::info!("Deleted remote collection");
        Ok(())
    }
}
