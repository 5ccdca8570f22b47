//! Session record types shared by every storage backend.
//!
//! A [`StoredSession`] pairs identity and descriptive metadata with the
//! captured browser state. The state is opaque to the storage layer: nothing
//! here inspects cookie or storage values, it only moves them around.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Current schema version written into freshly captured state.
pub const STATE_SCHEMA_VERSION: &str = "1.0.0";

/// Key/value entries stored for one origin.
pub type StorageEntries = HashMap<String, String>;

/// Origin-keyed storage area (`localStorage` / `sessionStorage`).
///
/// Keys are unique within an origin; the origin set is unordered.
pub type OriginStorage = HashMap<String, StorageEntries>;

/// Milliseconds since the Unix epoch, read from the wall clock.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Identity and descriptive fields of a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Opaque unique identifier, immutable after creation.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Capture adapter that produced the session (e.g. `playwright`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Creation time in milliseconds since epoch.
    pub created_at: i64,
    /// Last mutation time in milliseconds since epoch.
    ///
    /// This is the only signal used to resolve conflicts between backends.
    pub updated_at: i64,
}

impl SessionMetadata {
    /// Creates metadata with a random (v4) id and both timestamps set to now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            adapter: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Bumps `updated_at` to now without ever moving it backwards.
    pub fn touch(&mut self) {
        self.touch_at(now_millis());
    }

    /// Bumps `updated_at` to `at`, keeping it non-decreasing.
    pub fn touch_at(&mut self, at: i64) {
        self.updated_at = self.updated_at.max(at);
    }

    /// Returns true if every tag in `required` is present.
    #[must_use]
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag))
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
    /// Sent only for same-site requests.
    Strict,
    /// Sent for same-site requests and top-level navigations.
    #[default]
    Lax,
    /// Sent for all requests.
    None,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// A captured cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie is scoped to.
    #[serde(default)]
    pub domain: String,
    /// Path the cookie is scoped to.
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Expiry in seconds since epoch; absent for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    /// Not readable from scripts.
    #[serde(default)]
    pub http_only: bool,
    /// Sent over HTTPS only.
    #[serde(default)]
    pub secure: bool,
    /// `SameSite` policy.
    #[serde(default)]
    pub same_site: SameSite,
}

/// Cookies plus origin-keyed web storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
    /// Cookies in capture order.
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// `localStorage` contents per origin.
    #[serde(default)]
    pub local_storage: OriginStorage,
    /// `sessionStorage` contents per origin.
    #[serde(default)]
    pub session_storage: OriginStorage,
}

/// One entry in the navigation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Page URL.
    pub url: String,
    /// Page title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Visit time in milliseconds since epoch.
    pub timestamp: i64,
}

/// Navigation history at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    /// URL that was active when the state was captured.
    pub current_url: String,
    /// History entries, oldest first.
    #[serde(default)]
    pub entries: Vec<HistoryEntry>,
    /// Index of the active entry.
    #[serde(default)]
    pub current_index: usize,
}

/// Browser viewport dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
    /// Device pixel ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_scale_factor: Option<f64>,
}

/// One response held in a Cache Storage cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,
    /// Response status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Response headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Response body, encoded by the capture layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Captured browser state. Opaque to the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionState {
    /// Schema version of the captured state.
    pub version: String,
    /// Capture time in milliseconds since epoch.
    pub timestamp: i64,
    /// Web origin the state applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Cookies and web storage.
    #[serde(default)]
    pub storage: StorageSnapshot,
    /// Navigation history. Older captures wrote this under `history`.
    #[serde(default, alias = "history", skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationState>,
    /// Viewport at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// Cache Storage contents, keyed by cache name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_storage: Option<HashMap<String, Vec<CacheEntry>>>,
    /// Adapter-specific payloads (screenshots, vision state, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl BrowserSessionState {
    /// Creates an empty state stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION.to_string(),
            timestamp: now_millis(),
            origin: None,
            storage: StorageSnapshot::default(),
            navigation: None,
            viewport: None,
            cache_storage: None,
            extensions: Map::new(),
        }
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

impl Default for BrowserSessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// The unit of storage: metadata plus state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Identity and descriptive metadata.
    pub metadata: SessionMetadata,
    /// Captured browser state.
    pub state: BrowserSessionState,
}

impl StoredSession {
    /// Pairs metadata with state.
    #[must_use]
    pub const fn new(metadata: SessionMetadata, state: BrowserSessionState) -> Self {
        Self { metadata, state }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Last mutation time.
    #[must_use]
    pub const fn updated_at(&self) -> i64 {
        self.metadata.updated_at
    }
}
