//! HTTP client for the Square catalog, locations and orders endpoints.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use saleslens_core::config::CommerceConfig;
use saleslens_core::sync::wire::CatalogPage;
use saleslens_core::sync::{
    CatalogObject, CommercePlatform, Location, OrderPage, OrderQuery, PlatformError,
};

pub const CATALOG_OBJECT_TYPES: &str = "ITEM,ITEM_VARIATION";

/// Upper bound on error body text carried into [`PlatformError::Status`].
const ERROR_BODY_LIMIT: usize = 512;

pub struct SquareClient {
    http: Client,
    base_url: String,
    api_version: String,
}

impl SquareClient {
    pub fn new(
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| PlatformError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
        })
    }

    pub fn from_config(config: &CommerceConfig) -> Result<Self, PlatformError> {
        Self::new(&config.base_url, &config.api_version, Duration::from_secs(config.timeout_secs))
    }

    fn authorized(&self, request: RequestBuilder, access_token: &SecretString) -> RequestBuilder {
        request
            .bearer_auth(access_token.expose_secret())
            .header("Square-Version", &self.api_version)
            .header("Accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, PlatformError> {
        let response =
            request.send().await.map_err(|error| PlatformError::Transport(error.to_string()))?;
        let status = response.status();
        debug!(
            event_name = "commerce.request.completed",
            endpoint,
            status = status.as_u16(),
            "commerce api responded"
        );

        if status == StatusCode::UNAUTHORIZED {
            return Err(PlatformError::Unauthorized);
        }
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(PlatformError::Status { status: status.as_u16(), body });
        }

        let bytes =
            response.bytes().await.map_err(|error| PlatformError::Transport(error.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|error| PlatformError::Decode(format!("{endpoint}: {error}")))
    }
}

#[derive(Debug, Default, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    locations: Vec<Location>,
}

#[derive(Debug, Serialize)]
struct SearchOrdersBody<'a> {
    location_ids: &'a [String],
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
    query: SearchQuery,
}

#[derive(Debug, Serialize)]
struct SearchQuery {
    filter: SearchFilter,
    sort: SearchSort,
}

#[derive(Debug, Serialize)]
struct SearchFilter {
    date_time_filter: DateTimeFilter,
}

#[derive(Debug, Serialize)]
struct DateTimeFilter {
    created_at: TimeRange,
}

#[derive(Debug, Serialize)]
struct TimeRange {
    start_at: String,
    end_at: String,
}

#[derive(Debug, Serialize)]
struct SearchSort {
    sort_field: &'static str,
    sort_order: &'static str,
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl<'a> SearchOrdersBody<'a> {
    fn from_query(query: &'a OrderQuery) -> Self {
        Self {
            location_ids: &query.location_ids,
            limit: query.limit,
            cursor: query.cursor.as_deref(),
            query: SearchQuery {
                filter: SearchFilter {
                    date_time_filter: DateTimeFilter {
                        created_at: TimeRange {
                            start_at: timestamp(query.created_from),
                            end_at: timestamp(query.created_to),
                        },
                    },
                },
                sort: SearchSort { sort_field: "CREATED_AT", sort_order: "ASC" },
            },
        }
    }
}

#[async_trait]
impl CommercePlatform for SquareClient {
    async fn list_locations(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<Location>, PlatformError> {
        let request = self.http.get(format!("{}/v2/locations", self.base_url));
        let response: LocationsResponse =
            self.send(self.authorized(request, access_token), "locations").await?;
        Ok(response.locations)
    }

    async fn list_catalog(
        &self,
        access_token: &SecretString,
    ) -> Result<Vec<CatalogObject>, PlatformError> {
        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(format!("{}/v2/catalog/list", self.base_url))
                .query(&[("types", CATALOG_OBJECT_TYPES)]);
            if let Some(cursor) = cursor.as_deref() {
                request = request.query(&[("cursor", cursor)]);
            }
            let page: CatalogPage =
                self.send(self.authorized(request, access_token), "catalog.list").await?;
            objects.extend(page.objects);

            match page.cursor.filter(|next| !next.is_empty()) {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(objects)
    }

    async fn search_orders(
        &self,
        access_token: &SecretString,
        query: &OrderQuery,
    ) -> Result<OrderPage, PlatformError> {
        let request = self
            .http
            .post(format!("{}/v2/orders/search", self.base_url))
            .json(&SearchOrdersBody::from_query(query));
        self.send(self.authorized(request, access_token), "orders.search").await
    }
}
