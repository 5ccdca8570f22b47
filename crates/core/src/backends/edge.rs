//! Edge storage provider over the Cloudflare REST APIs.
//!
//! One provider, three addressing modes:
//!
//! | Mode     | Object URL                                                    | Key                  |
//! |----------|---------------------------------------------------------------|----------------------|
//! | `kv`     | `{api}/accounts/{acct}/storage/kv/namespaces/{ns}/values/{key}` | `session:<id>`       |
//! | `object` | `{api}/accounts/{acct}/r2/buckets/{bucket}/objects/{key}`       | `sessions/<id>.json` |
//! | `actor`  | `{endpoint}/namespaces/{ns}/sessions/{id}`                      | `<id>`               |
//!
//! `kv` and `object` list keys with cursor pagination and then fetch each
//! value. The actor worker answers `list` with a metadata array directly.

use std::time::Duration;

use async_trait::async_trait;
use psp_shared::{
    EdgeConfig, EdgeMode, SessionFilter, SessionMetadata, StorageError, StorageResult,
    StoredSession,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::codec;
use crate::provider::{StorageProvider, check_id};

/// Default Cloudflare API base.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const KV_KEY_PREFIX: &str = "session:";
const OBJECT_KEY_PREFIX: &str = "sessions/";
const OBJECT_KEY_SUFFIX: &str = ".json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 256;

/// Mode-specific base URLs, resolved once at construction.
#[derive(Debug, Clone)]
enum Target {
    Kv { namespace: Url },
    Object { bucket: Url },
    Actor { sessions: Url },
}

/// Key-value, object or actor storage at the edge.
#[derive(Debug, Clone)]
pub struct EdgeProvider {
    client: Client,
    target: Target,
    api_token: String,
    label: String,
}

/// Cloudflare list envelope (`kv` keys and `object` listings).
#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    #[serde(default)]
    result: Vec<ListedKey>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

/// KV names its entries `name`, R2 names them `key`.
#[derive(Debug, Deserialize)]
struct ListedKey {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    key: Option<String>,
}

impl ListedKey {
    fn into_key(self) -> Option<String> {
        self.name.or(self.key)
    }
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

const fn default_success() -> bool {
    true
}

impl EdgeProvider {
    /// Builds a provider for `config.mode`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a field required by the mode is missing
    /// or a base URL cannot be parsed.
    pub fn new(config: &EdgeConfig) -> StorageResult<Self> {
        let api = parse_base(config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE))?;
        let account = required(&config.account_id, "account_id")?;

        let target = match config.mode {
            EdgeMode::Kv => {
                let ns = required_opt(config.namespace_id.as_deref(), "namespace_id")?;
                Target::Kv {
                    namespace: join(
                        &api,
                        &["accounts", account, "storage", "kv", "namespaces", ns],
                    )?,
                }
            }
            EdgeMode::Object => {
                let bucket = required_opt(config.container.as_deref(), "container")?;
                Target::Object {
                    bucket: join(&api, &["accounts", account, "r2", "buckets", bucket])?,
                }
            }
            EdgeMode::Actor => {
                let ns = required_opt(config.namespace_id.as_deref(), "namespace_id")?;
                let endpoint = parse_base(required_opt(config.endpoint.as_deref(), "endpoint")?)?;
                Target::Actor {
                    sessions: join(&endpoint, &["namespaces", ns, "sessions"])?,
                }
            }
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::validation(format!("edge http client: {e}")))?;

        Ok(Self {
            client,
            target,
            api_token: config.api_token.clone(),
            label: format!("edge-{}", config.mode.as_str()),
        })
    }

    /// Addressing mode.
    #[must_use]
    pub const fn mode(&self) -> EdgeMode {
        match self.target {
            Target::Kv { .. } => EdgeMode::Kv,
            Target::Object { .. } => EdgeMode::Object,
            Target::Actor { .. } => EdgeMode::Actor,
        }
    }

    /// Storage key for `id` in the current mode.
    #[must_use]
    pub fn key(&self, id: &str) -> String {
        match self.target {
            Target::Kv { .. } => format!("{KV_KEY_PREFIX}{id}"),
            Target::Object { .. } => format!("{OBJECT_KEY_PREFIX}{id}{OBJECT_KEY_SUFFIX}"),
            Target::Actor { .. } => id.to_string(),
        }
    }

    /// Recovers the session id from a listed key.
    fn id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let id = match self.target {
            Target::Kv { .. } => key.strip_prefix(KV_KEY_PREFIX),
            Target::Object { .. } => key
                .strip_prefix(OBJECT_KEY_PREFIX)
                .and_then(|rest| rest.strip_suffix(OBJECT_KEY_SUFFIX)),
            Target::Actor { .. } => Some(key),
        }?;
        (!id.is_empty() && check_id(id).is_ok()).then_some(id)
    }

    /// URL of the value for `id`.
    fn value_url(&self, id: &str) -> StorageResult<Url> {
        let key = self.key(id);
        match &self.target {
            Target::Kv { namespace } => join(namespace, &["values", &key]),
            Target::Object { bucket } => join(bucket, &["objects", &key]),
            Target::Actor { sessions } => join(sessions, &[&key]),
        }
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_token)
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<Response> {
        self.authed(request)
            .send()
            .await
            .map_err(|e| StorageError::unavailable(&self.label, e.to_string()))
    }

    async fn status_error(&self, response: Response) -> StorageError {
        let status = response.status();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        StorageError::unavailable(&self.label, format!("HTTP {status}: {body}"))
    }

    async fn fetch(&self, id: &str) -> StorageResult<Vec<u8>> {
        let response = self.send(self.client.get(self.value_url(id)?)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::not_found(id)),
            status if status.is_success() => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| StorageError::unavailable(&self.label, e.to_string())),
            _ => Err(self.status_error(response).await),
        }
    }

    /// Pages through a Cloudflare key listing.
    async fn list_keys(&self, url: Url, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("prefix", prefix.to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let response = self.send(self.client.get(url.clone()).query(&query)).await?;
            if !response.status().is_success() {
                return Err(self.status_error(response).await);
            }
            let page: ListPage = response.json().await.map_err(|e| {
                StorageError::unavailable(&self.label, format!("malformed list page: {e}"))
            })?;
            if !page.success {
                let messages: Vec<_> = page.errors.into_iter().map(|m| m.message).collect();
                return Err(StorageError::unavailable(&self.label, messages.join("; ")));
            }

            keys.extend(page.result.into_iter().filter_map(ListedKey::into_key));

            let next = page
                .result_info
                .and_then(|info| info.cursor)
                .filter(|c| !c.is_empty());
            if next.is_none() || next == cursor {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    async fn list_by_keys(&self, url: Url, prefix: &str) -> StorageResult<Vec<SessionMetadata>> {
        let keys = self.list_keys(url, prefix).await?;
        debug!(backend = %self.label, count = keys.len(), "Listed edge keys");

        let mut items = Vec::with_capacity(keys.len());
        for key in &keys {
            let Some(id) = self.id_from_key(key) else {
                continue;
            };
            let bytes = match self.fetch(id).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => {
                    warn!(backend = %self.label, key, "Session vanished during listing");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match codec::decode_metadata(&bytes, id) {
                Ok(meta) => items.push(meta),
                Err(e) => {
                    error!(backend = %self.label, key, error = %e, "Corrupt session payload");
                }
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl StorageProvider for EdgeProvider {
    fn name(&self) -> &str {
        &self.label
    }

    async fn save(&self, session: &StoredSession) -> StorageResult<()> {
        check_id(session.id())?;
        let body = codec::encode(session)?;
        let request = self
            .client
            .put(self.value_url(session.id())?)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);

        let response = self.send(request).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.status_error(response).await)
        }
    }

    async fn load(&self, id: &str) -> StorageResult<StoredSession> {
        check_id(id)?;
        let bytes = self.fetch(id).await?;
        codec::decode(&bytes, id).inspect_err(|e| {
            error!(backend = %self.label, session_id = id, error = %e, "Corrupt session payload");
        })
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        check_id(id)?;
        let response = self.send(self.client.delete(self.value_url(id)?)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            _ => Err(self.status_error(response).await),
        }
    }

    async fn list(&self, filter: &SessionFilter) -> StorageResult<Vec<SessionMetadata>> {
        filter.validate()?;

        let items = match &self.target {
            Target::Kv { namespace } => {
                self.list_by_keys(join(namespace, &["keys"])?, KV_KEY_PREFIX)
                    .await?
            }
            Target::Object { bucket } => {
                self.list_by_keys(join(bucket, &["objects"])?, OBJECT_KEY_PREFIX)
                    .await?
            }
            Target::Actor { sessions } => {
                let response = self.send(self.client.get(sessions.clone())).await?;
                if !response.status().is_success() {
                    return Err(self.status_error(response).await);
                }
                response.json::<Vec<SessionMetadata>>().await.map_err(|e| {
                    StorageError::unavailable(&self.label, format!("malformed session index: {e}"))
                })?
            }
        };

        Ok(filter.apply(items))
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        check_id(id)?;
        let request = match &self.target {
            // KV has no HEAD; the metadata endpoint answers 404 for absent keys.
            Target::Kv { namespace } => self
                .client
                .get(join(namespace, &["metadata", &self.key(id)])?),
            Target::Object { .. } | Target::Actor { .. } => self.client.head(self.value_url(id)?),
        };

        let response = self.send(request).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(self.status_error(response).await),
        }
    }
}

fn required<'a>(value: &'a str, field: &str) -> StorageResult<&'a str> {
    if value.trim().is_empty() {
        return Err(StorageError::validation(format!("edge storage requires '{field}'")));
    }
    Ok(value)
}

fn required_opt<'a>(value: Option<&'a str>, field: &str) -> StorageResult<&'a str> {
    required(value.unwrap_or_default(), field)
}

fn parse_base(raw: &str) -> StorageResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| StorageError::validation(format!("invalid edge URL '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(StorageError::validation(format!(
            "edge URL '{raw}' cannot be used as a base"
        )));
    }
    Ok(url)
}

/// Appends percent-encoded path segments to `base`.
fn join(base: &Url, segments: &[&str]) -> StorageResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| StorageError::validation(format!("edge URL '{base}' cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
