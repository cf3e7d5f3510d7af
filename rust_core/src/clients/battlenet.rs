//! Battle.net Game Data API client
//!
//! Reads connected-realm auction house listings for the polling core and
//! supports the realm/item lookups used when notifications are registered.
//!
//! Authentication uses the OAuth2 client-credentials flow. The access token is
//! shared by every concurrent caller: refreshes are serialized, and a 401 only
//! discards the token if it is still the one that was rejected, so two
//! partitions noticing an expired token at once both end up with a valid one.
//!
//! Includes circuit breaker for API resilience.

use crate::circuit_breaker::{ApiCircuitBreaker, ApiCircuitBreakerConfig};
use crate::models::{ConnectedRealm, Fingerprint, Item, ItemId, Lot, Snapshot};
use crate::providers::{MarketDataProvider, ProviderError};
use async_trait::async_trait;
use reqwest::header::LAST_MODIFIED;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const TOKEN_URL: &str = "https://oauth.battle.net/token";
const API_BASE_TEMPLATE: &str = "https://{region}.api.blizzard.com";
const LOCALE: &str = "en_US";

/// Refresh tokens this long before the upstream expiry
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct AuctionsResponse {
    #[serde(default)]
    auctions: Vec<AuctionEntry>,
}

#[derive(Debug, Deserialize)]
struct AuctionEntry {
    item: AuctionItem,
    quantity: u64,
    #[serde(default)]
    unit_price: Option<u64>,
    #[serde(default)]
    buyout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AuctionItem {
    id: ItemId,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<SearchResult<T>>,
}

#[derive(Debug, Deserialize)]
struct SearchResult<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ConnectedRealmData {
    id: i64,
    #[serde(default)]
    realms: Vec<RealmData>,
}

#[derive(Debug, Deserialize)]
struct RealmData {
    name: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ItemData {
    id: ItemId,
    name: serde_json::Value,
}

/// Battle.net client shared across all partition workers
pub struct BattleNetClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base_template: String,
    token: RwLock<Option<AccessToken>>,
    refresh_lock: Mutex<()>,
    circuit_breaker: Arc<ApiCircuitBreaker>,
}

impl std::fmt::Debug for BattleNetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleNetClient")
            .field("token_url", &self.token_url)
            .field("api_base_template", &self.api_base_template)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl BattleNetClient {
    pub fn new(client_id: String, client_secret: String) -> anyhow::Result<Self> {
        Self::with_endpoints(
            client_id,
            client_secret,
            TOKEN_URL.to_string(),
            API_BASE_TEMPLATE.to_string(),
        )
    }

    /// Client against custom endpoints; `api_base_template` may contain a
    /// `{region}` placeholder
    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        token_url: String,
        api_base_template: String,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("AuctionWatch/1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client for Battle.net: {}", e))?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            token_url,
            api_base_template,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            circuit_breaker: Arc::new(ApiCircuitBreaker::new(
                "battlenet",
                ApiCircuitBreakerConfig::default(),
            )),
        })
    }

    fn api_base(&self, region: &str) -> String {
        self.api_base_template.replace("{region}", &region.to_lowercase())
    }

    async fn cached_token(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_fresh())
            .map(|t| t.value.clone())
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *self.token.write().await = Some(fresh);
        info!("Battle.net access token refreshed");
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken, ProviderError> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!("token endpoint returned {}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        let value = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Auth("access token missing from response".to_string()))?;

        Ok(AccessToken {
            value,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    /// Drop the cached token, unless someone already replaced it
    async fn invalidate_token(&self, rejected: &str) {
        let mut token = self.token.write().await;
        if token.as_ref().map(|t| t.value == rejected).unwrap_or(false) {
            *token = None;
        }
    }

    /// Send an authenticated request, mapping status codes to provider errors
    async fn send(&self, build: impl Fn(&str) -> RequestBuilder) -> Result<Response, ProviderError> {
        if !self.circuit_breaker.is_available() {
            return Err(ProviderError::CircuitOpen(self.circuit_breaker.name().to_string()));
        }

        let token = self.access_token().await?;
        let response = match build(&token).send().await {
            Ok(r) => r,
            Err(e) => {
                self.circuit_breaker.record_failure();
                return Err(e.into());
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            debug!("Battle.net rejected access token, discarding it");
            self.invalidate_token(&token).await;
            return Err(ProviderError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if status.is_server_error() {
            self.circuit_breaker.record_failure();
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        self.circuit_breaker.record_success();
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        region: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ProviderError> {
        let url = format!("{}{}", self.api_base(region), path);
        let result = self
            .send(|token| self.client.get(&url).bearer_auth(token).query(query))
            .await;

        match result {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(ProviderError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn auctions_path(realm: &ConnectedRealm) -> String {
        format!("/data/wow/connected-realm/{}/auctions", realm.id)
    }

    fn dynamic_namespace(region: &str) -> String {
        format!("dynamic-{}", region.to_lowercase())
    }

    fn static_namespace(region: &str) -> String {
        format!("static-{}", region.to_lowercase())
    }

    /// Find the connected realm a realm slug belongs to
    pub async fn search_connected_realm(
        &self,
        region: &str,
        slug: &str,
    ) -> Result<Option<ConnectedRealm>, ProviderError> {
        let query = [
            ("namespace", Self::dynamic_namespace(region)),
            ("realms.slug", slug.to_string()),
        ];
        let response: Option<SearchResponse<ConnectedRealmData>> = self
            .get_json(region, "/data/wow/search/connected-realm", &query)
            .await?;

        let realm = response.and_then(|r| parse_connected_realm(r, region, slug));
        if realm.is_none() {
            info!("No connected realm found for {}-{}", region, slug);
        }
        Ok(realm)
    }

    /// Item by id; `None` when Battle.net does not know it
    pub async fn item_by_id(&self, region: &str, item_id: ItemId) -> Result<Option<Item>, ProviderError> {
        let query = [
            ("namespace", Self::static_namespace(region)),
            ("locale", LOCALE.to_string()),
        ];
        let data: Option<ItemData> = self
            .get_json(region, &format!("/data/wow/item/{}", item_id), &query)
            .await?;
        Ok(data.map(parse_item))
    }

    /// Items whose English name matches `name`
    pub async fn search_items(
        &self,
        region: &str,
        name: &str,
        max_results: u32,
    ) -> Result<Vec<Item>, ProviderError> {
        let name_key = format!("name.{}", LOCALE);
        let query = [
            ("namespace", Self::static_namespace(region)),
            (name_key.as_str(), name.to_string()),
            ("_pageSize", max_results.to_string()),
        ];
        let response: Option<SearchResponse<ItemData>> = self
            .get_json(region, "/data/wow/search/item", &query)
            .await?;
        Ok(response.map(parse_items).unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataProvider for BattleNetClient {
    async fn fetch_snapshot(
        &self,
        realm: &ConnectedRealm,
        item_ids: &[ItemId],
    ) -> Result<Snapshot, ProviderError> {
        let query = [
            ("namespace", Self::dynamic_namespace(&realm.region)),
            ("locale", LOCALE.to_string()),
        ];
        let response: Option<AuctionsResponse> = self
            .get_json(&realm.region, &Self::auctions_path(realm), &query)
            .await?;

        let snapshot = snapshot_from_auctions(require_auctions(response, realm)?, item_ids);
        debug!(
            "Fetched auctions for realm {}: {} of {} requested items listed",
            realm.id,
            snapshot.item_count(),
            item_ids.len()
        );
        Ok(snapshot)
    }

    async fn fetch_fingerprint(
        &self,
        realm: &ConnectedRealm,
    ) -> Result<Option<Fingerprint>, ProviderError> {
        let url = format!("{}{}", self.api_base(&realm.region), Self::auctions_path(realm));
        let namespace = Self::dynamic_namespace(&realm.region);
        let response = self
            .send(|token| {
                self.client
                    .head(&url)
                    .bearer_auth(token)
                    .query(&[("namespace", namespace.as_str())])
            })
            .await?;

        Ok(response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| Fingerprint(v.to_string())))
    }

    fn provider_name(&self) -> &str {
        "battlenet"
    }
}

/// Keep requested items only; lots without any price are dropped
fn snapshot_from_auctions(response: AuctionsResponse, item_ids: &[ItemId]) -> Snapshot {
    let wanted: HashSet<ItemId> = item_ids.iter().copied().collect();
    Snapshot::from_lots(response.auctions.into_iter().filter_map(|auction| {
        if !wanted.contains(&auction.item.id) || auction.quantity == 0 {
            return None;
        }
        let price = auction.unit_price.or(auction.buyout).filter(|p| *p > 0)?;
        Some((auction.item.id, Lot::new(price, auction.quantity)))
    }))
}

/// A missing auctions resource means the realm id is stale, not that nothing is listed
fn require_auctions(
    response: Option<AuctionsResponse>,
    realm: &ConnectedRealm,
) -> Result<AuctionsResponse, ProviderError> {
    response.ok_or_else(|| {
        warn!("No auction data for connected realm {}", realm.id);
        ProviderError::Http {
            status: 404,
            body: format!("no auctions resource for connected realm {}", realm.id),
        }
    })
}

fn parse_connected_realm(
    response: SearchResponse<ConnectedRealmData>,
    region: &str,
    slug: &str,
) -> Option<ConnectedRealm> {
    let data = response.results.into_iter().next()?.data;
    let name = data
        .realms
        .first()
        .and_then(|r| localized(&r.name))
        .unwrap_or_else(|| slug.to_string());
    Some(ConnectedRealm {
        id: data.id,
        region: region.to_lowercase(),
        slug: slug.to_string(),
        name,
    })
}

fn parse_items(response: SearchResponse<ItemData>) -> Vec<Item> {
    response.results.into_iter().map(|r| parse_item(r.data)).collect()
}

/// Unnamed items fall back to their id
fn parse_item(data: ItemData) -> Item {
    let name = localized(&data.name).unwrap_or_else(|| data.id.to_string());
    Item { id: data.id, name }
}

/// Names come either as a plain string or as a locale map
fn localized(name: &serde_json::Value) -> Option<String> {
    match name {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map.get(LOCALE).and_then(|v| v.as_str()).map(String::from),
        _ => None,
    }
}
