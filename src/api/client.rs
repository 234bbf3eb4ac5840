//! Control plane API client implementation.
//!
//! This module provides the HTTP client for the control plane's REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{ApiError, ProviderError, Result};
use crate::wait::CallContext;

use super::types::{AppInstallation, Order, OrderReceipt, OrderRequest, StackPatch, StackSnapshot};
use super::{AppInstallationApi, OrderApi, StackApi};

/// Default control plane API base URL.
pub const DEFAULT_API_URL: &str = "https://api.hostplane.example/v2";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Header carrying a per-request identifier.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Control plane API client.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    /// HTTP client.
    client: Client,
    /// API base URL without trailing slash.
    base_url: String,
    /// API token.
    api_token: String,
}

/// Body of a version change request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppVersionRequest<'a> {
    app_version_id: &'a str,
}

impl ControlPlaneClient {
    /// Creates a new client against the default API URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_token: &str) -> Result<Self> {
        Self::with_options(DEFAULT_API_URL, api_token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom base URL and request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_options(base_url: &str, api_token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// The API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request_id = Uuid::new_v4();
        trace!("{method} {path} (request {request_id})");

        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_token))
            .header(header::ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, request_id.to_string())
    }

    /// Sends a request bound to `ctx` and maps error statuses.
    async fn send(
        &self,
        ctx: &CallContext,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = ctx
            .run(operation, async {
                request.send().await.map_err(|e| {
                    ProviderError::from(ApiError::network(format!("Request failed: {e}")))
                })
            })
            .await?;

        let status = response.status();
        debug!("{operation} {resource}: {status}");

        if status.is_success() {
            return Ok(response);
        }

        Err(match status {
            StatusCode::NOT_FOUND => ApiError::not_found(resource),
            StatusCode::FORBIDDEN => ApiError::PermissionDenied {
                message: response.text().await.unwrap_or_default(),
            },
            StatusCode::UNAUTHORIZED => ApiError::AuthenticationFailed {
                message: String::from("Invalid API token"),
            },
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default();
                let retry_after = if retry_after == 0 { 60 } else { retry_after };
                ApiError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                ApiError::api_error(status.as_u16(), body)
            }
        }
        .into())
    }

    async fn json<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self.send(ctx, operation, resource, request).await?;
        ctx.run(operation, async {
            response.json::<T>().await.map_err(|e| {
                ProviderError::from(ApiError::InvalidResponse {
                    message: format!("Failed to parse {resource}: {e}"),
                })
            })
        })
        .await
    }
}

#[async_trait]
impl StackApi for ControlPlaneClient {
    async fn get_stack(&self, ctx: &CallContext, stack_id: &str) -> Result<StackSnapshot> {
        let resource = format!("stack {stack_id}");
        let request = self.request(Method::GET, &format!("/stacks/{stack_id}"));
        self.json(ctx, "get stack", &resource, request).await
    }

    async fn update_stack(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        patch: &StackPatch,
    ) -> Result<StackSnapshot> {
        let resource = format!("stack {stack_id}");
        let request = self
            .request(Method::PATCH, &format!("/stacks/{stack_id}"))
            .json(patch);
        self.json(ctx, "update stack", &resource, request).await
    }

    async fn recreate_service(
        &self,
        ctx: &CallContext,
        stack_id: &str,
        service_id: &str,
    ) -> Result<()> {
        let resource = format!("service {service_id}");
        let request = self.request(
            Method::POST,
            &format!("/stacks/{stack_id}/services/{service_id}/actions/recreate"),
        );
        self.send(ctx, "recreate service", &resource, request)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl AppInstallationApi for ControlPlaneClient {
    async fn get_app_installation(
        &self,
        ctx: &CallContext,
        installation_id: &str,
    ) -> Result<AppInstallation> {
        let resource = format!("app installation {installation_id}");
        let request = self.request(
            Method::GET,
            &format!("/app-installations/{installation_id}"),
        );
        self.json(ctx, "get app installation", &resource, request)
            .await
    }

    async fn request_app_version(
        &self,
        ctx: &CallContext,
        installation_id: &str,
        version: &str,
    ) -> Result<()> {
        let resource = format!("app installation {installation_id}");
        let request = self
            .request(
                Method::PATCH,
                &format!("/app-installations/{installation_id}"),
            )
            .json(&AppVersionRequest {
                app_version_id: version,
            });
        self.send(ctx, "update app installation", &resource, request)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl OrderApi for ControlPlaneClient {
    async fn create_order(&self, ctx: &CallContext, request: &OrderRequest) -> Result<OrderReceipt> {
        let resource = format!("{} order", request.order_type);
        let http = self.request(Method::POST, "/orders").json(request);
        self.json(ctx, "create order", &resource, http).await
    }

    async fn get_order(&self, ctx: &CallContext, order_id: &str) -> Result<Order> {
        let resource = format!("order {order_id}");
        let request = self.request(Method::GET, &format!("/orders/{order_id}"));
        self.json(ctx, "get order", &resource, request).await
    }
}
