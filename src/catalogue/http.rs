//! REST transport for the service catalogue.
//!
//! Speaks the Strapi-style API the catalogue exposes: collections live under
//! `/v1/{collection}`, payloads travel in a `{"data": ...}` envelope, list
//! responses carry `meta.pagination`, and lookups use
//! `filters[field][$eq]=value`.

use super::{CatalogueClient, CatalogueEntry, Collection};
use crate::config::CatalogueOptions;
use crate::error::Result;
use crate::types::RecordId;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Retry behavior for transient failures.
///
/// GET, PUT and DELETE are retried on 5xx, 429, timeouts and connect errors.
/// POST is not idempotent and is only retried when the request never reached
/// the server (connect errors) or was rejected with 429.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

/// Catalogue client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalogue {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    filter: Vec<(String, String)>,
    page_size: u32,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Debug, Deserialize)]
struct ListMeta {
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u32,
    page_count: u32,
}

#[derive(Debug, Deserialize)]
struct SingleResponse {
    data: Value,
}

impl HttpCatalogue {
    /// Build a client from the catalogue configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is configured, the URL does not parse, or
    /// the HTTP client cannot be built.
    pub fn new(options: &CatalogueOptions) -> Result<Self> {
        let raw_url = options
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| crate::err!(ConfigMissing { key: "catalogue.url".to_string() }))?;
        let parsed = Url::parse(raw_url).map_err(|e| {
            crate::err!(ConfigValue {
                key: "catalogue.url".to_string(),
                message: e.to_string(),
            })
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .user_agent(concat!("nsdiscovery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::DiscoveryError::internal(format!("Failed to create HTTP client: {e}"), file!(), line!()))?;

        let filter = options
            .filter
            .as_deref()
            .map(|f| {
                url::form_urlencoded::parse(f.trim_start_matches(['&', '?']).as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_key: options.api_key.clone().filter(|k| !k.is_empty()),
            filter,
            page_size: options.page_size,
            retry: RetryPolicy {
                max_retries: options.max_retries,
                ..RetryPolicy::default()
            },
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, collection: Collection, id: Option<&RecordId>) -> String {
        match id {
            Some(id) => format!("{}/v1/{}/{id}", self.base_url, collection.path()),
            None => format!("{}/v1/{}", self.base_url, collection.path()),
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn send(
        &self,
        operation: &'static str,
        collection: Collection,
        method: Method,
        build: impl Fn(Method) -> RequestBuilder + Send + Sync,
    ) -> Result<Response> {
        let idempotent = method != Method::POST;
        let mut attempts = 0;
        let mut delay = self.retry.delay_ms;

        loop {
            attempts += 1;
            let outcome = match build(method.clone()).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                outcome => outcome,
            };

            let retryable = match &outcome {
                Ok(response) => {
                    response.status() == StatusCode::TOO_MANY_REQUESTS
                        || (idempotent && response.status().is_server_error())
                }
                Err(e) => e.is_connect() || (idempotent && e.is_timeout()),
            };

            if retryable && attempts <= self.retry.max_retries {
                tracing::warn!(
                    operation,
                    collection = %collection,
                    attempt = attempts,
                    max_retries = self.retry.max_retries,
                    delay_ms = delay,
                    "Catalogue request failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay = (delay as f64 * self.retry.backoff_multiplier) as u64;
                continue;
            }

            return Err(match outcome {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    crate::err!(Catalogue {
                        operation,
                        collection: collection.to_string(),
                        message: format!("status {status}: {}", body.chars().take(200).collect::<String>()),
                        status_code: Some(status.as_u16()),
                    })
                }
                Err(e) => crate::err!(Catalogue {
                    operation,
                    collection: collection.to_string(),
                    message: e.to_string(),
                    status_code: e.status().map(|s| s.as_u16()),
                }),
            });
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        operation: &'static str,
        collection: Collection,
        response: Response,
    ) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            crate::err!(Catalogue {
                operation,
                collection: collection.to_string(),
                message: format!("invalid response body: {e}"),
                status_code: None,
            })
        })
    }

    async fn list(&self, collection: Collection, extra: &[(String, String)]) -> Result<Vec<CatalogueEntry>> {
        let url = self.endpoint(collection, None);
        let mut entries = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query = vec![
                ("pagination[page]".to_string(), page.to_string()),
                ("pagination[pageSize]".to_string(), self.page_size.to_string()),
            ];
            if let Some(populate) = collection.populate() {
                query.push(("populate".to_string(), populate.to_string()));
            }
            query.extend_from_slice(extra);

            let response = self
                .send("get", collection, Method::GET, |m| self.request(m, &url).query(&query))
                .await?;
            let body: ListResponse = Self::decode("get", collection, response).await?;
            let received = body.data.len();

            entries.extend(body.data.into_iter().filter_map(|value| {
                let entry = CatalogueEntry::from_value(value);
                if entry.is_none() {
                    tracing::warn!(collection = %collection, "Ignoring catalogue record without id");
                }
                entry
            }));

            let page_count = body
                .meta
                .and_then(|m| m.pagination)
                .map_or(page, |p| p.page_count.max(p.page));
            if received == 0 || page >= page_count {
                break;
            }
            page += 1;
        }

        tracing::debug!(collection = %collection, count = entries.len(), "Listed catalogue records");
        Ok(entries)
    }
}

#[async_trait]
impl CatalogueClient for HttpCatalogue {
    async fn ping(&self) -> Result<()> {
        let url = format!("{}/_health", self.base_url);
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| crate::err!(CatalogueUnavailable {
                url: self.base_url.clone(),
                message: e.to_string(),
            }))?;

        if !response.status().is_success() {
            return Err(crate::err!(CatalogueUnavailable {
                url: self.base_url.clone(),
                message: format!("health check returned {}", response.status()),
            }));
        }
        Ok(())
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<CatalogueEntry>> {
        let extra = if collection == Collection::Components {
            self.filter.clone()
        } else {
            Vec::new()
        };
        self.list(collection, &extra).await
    }

    async fn find_one(&self, collection: Collection, field: &str, value: &str) -> Result<Option<CatalogueEntry>> {
        let filter = vec![(format!("filters[{field}][$eq]"), value.to_string())];
        Ok(self.list(collection, &filter).await?.into_iter().next())
    }

    async fn create(&self, collection: Collection, data: &Value) -> Result<RecordId> {
        let url = self.endpoint(collection, None);
        let payload = json!({ "data": data });
        let response = self
            .send("create", collection, Method::POST, |m| self.request(m, &url).json(&payload))
            .await?;
        let body: SingleResponse = Self::decode("create", collection, response).await?;

        CatalogueEntry::from_value(body.data).map(|entry| entry.id).ok_or_else(|| {
            crate::err!(Catalogue {
                operation: "create",
                collection: collection.to_string(),
                message: "response did not include an id".to_string(),
                status_code: None,
            })
        })
    }

    async fn update(&self, collection: Collection, id: &RecordId, data: &Value) -> Result<()> {
        let url = self.endpoint(collection, Some(id));
        let payload = json!({ "data": data });
        self.send("update", collection, Method::PUT, |m| self.request(m, &url).json(&payload))
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<()> {
        let url = self.endpoint(collection, Some(id));
        self.send("delete", collection, Method::DELETE, |m| self.request(m, &url))
            .await?;
        Ok(())
    }
}
