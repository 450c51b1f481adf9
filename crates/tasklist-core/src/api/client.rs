//! The request executor.
//!
//! Builds URLs from the configured base, attaches the current access
//! credential, decodes responses and turns non-2xx statuses into
//! [`RequestError`]s. [`ApiClient::request`] adds the session refresh: a 401
//! while a refresh credential is held triggers one coalesced refresh and a
//! single retry of the original request.

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tasklist_types::{RefreshRequest, TokenResponse};
use tracing::{debug, info, warn};
use url::{Url, form_urlencoded};

use super::body::{RequestBody, RequestOptions, ResponseBody};
use super::credentials::{CredentialKind, CredentialStore};
use super::error::{ApiError, RequestError};
use super::query::Query;
use super::refresh::RefreshCoordinator;

pub const REFRESH_PATH: &str = "/auth/refresh";

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

/// Cheap to clone; clones share the HTTP connection pool, cookie jar,
/// credentials and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    refresh: RefreshCoordinator<(), Arc<ApiError>>,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if `base_url` is not an absolute URL or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, credentials: Arc<CredentialStore>) -> Result<Self, ApiError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|source| ApiError::InvalidBaseUrl {
            url: base_url.clone(),
            source,
        })?;

        // Cookies are kept so servers that use a refresh cookie keep working.
        let http = reqwest::Client::builder().cookie_store(true).build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                credentials,
                refresh: RefreshCoordinator::new(),
            }),
        })
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.inner.credentials
    }

    /// Sends one request without any refresh handling.
    ///
    /// # Errors
    /// Returns [`ApiError::Network`] on transport failure and
    /// [`ApiError::Request`] for non-2xx responses.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        let url = format!(
            "{}{}{}",
            self.inner.base_url,
            path,
            options.query.to_query_string()
        );

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));
        headers.extend(options.headers.clone());

        let mut builder = self.inner.http.request(method.clone(), &url);
        match &options.body {
            Some(RequestBody::Json(value)) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
                builder = builder.body(serde_json::to_vec(value)?);
            }
            Some(RequestBody::Form(pairs)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM));
                }
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                builder = builder.body(encoded);
            }
            None => {}
        }

        if let Some(access) = self.inner.credentials.get(CredentialKind::Access) {
            headers.insert(AUTHORIZATION, access.header_value()?);
        }

        debug!(%method, path, "sending request");
        let response = builder.headers(headers).send().await?;
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains(JSON));
        let bytes = response.bytes().await?;

        let body = if is_json {
            ResponseBody::Json(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
        } else {
            ResponseBody::Text(String::from_utf8_lossy(&bytes).into_owned())
        };

        if !status.is_success() {
            debug!(%method, path, status = status.as_u16(), "request rejected");
            return Err(RequestError::new(status, body).into());
        }
        Ok(body)
    }

    /// Sends a request, refreshing the session once if the access credential
    /// is rejected.
    ///
    /// Without a refresh credential a 401 is returned as is. If the refresh
    /// fails, both credentials are cleared and [`ApiError::AuthExpired`] is
    /// returned. Otherwise the request is retried exactly once and the
    /// retry's outcome is returned.
    ///
    /// # Errors
    /// See above and [`ApiClient::execute`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<ResponseBody, ApiError> {
        match self.execute(method.clone(), path, options).await {
            Err(err) if err.is_unauthorized() && self.has_refresh_credential() => {
                debug!(%method, path, error = %err, "access credential rejected");
            }
            other => return other,
        }

        if let Err(cause) = self.refresh_session().await {
            self.inner.credentials.clear();
            return Err(ApiError::AuthExpired(cause));
        }

        let retried = self.execute(method.clone(), path, options).await;
        if let Err(err) = &retried
            && err.is_unauthorized()
        {
            warn!(%method, path, "refreshed credential was rejected; clearing session");
            self.inner.credentials.clear();
        }
        retried
    }

    fn has_refresh_credential(&self) -> bool {
        self.inner.credentials.has(CredentialKind::Refresh)
    }

    /// # Errors
    /// See [`ApiClient::request`]; also fails if the response does not decode.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: Query) -> Result<T, ApiError> {
        let body = self
            .request(Method::GET, path, &RequestOptions::with_query(query))
            .await?;
        Ok(body.into_typed()?)
    }

    /// # Errors
    /// See [`ApiClient::request`]; also fails if the response does not decode.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(Method::POST, path, body).await
    }

    /// # Errors
    /// See [`ApiClient::request`]; also fails if the response does not decode.
    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(Method::PATCH, path, body).await
    }

    /// # Errors
    /// See [`ApiClient::request`].
    pub async fn delete(&self, path: &str) -> Result<ResponseBody, ApiError> {
        self.request(Method::DELETE, path, &RequestOptions::default())
            .await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let options = RequestOptions::json(serde_json::to_value(body)?);
        let body = self.request(method, path, &options).await?;
        Ok(body.into_typed()?)
    }

    /// Runs (or joins) the refresh exchange.
    async fn refresh_session(&self) -> Result<(), Arc<ApiError>> {
        let client = self.clone();
        self.inner
            .refresh
            .run(move || async move {
                info!("refreshing session");
                client.exchange_refresh_credential().await.map_err(|err| {
                    warn!(error = %err, "session refresh failed");
                    Arc::new(err)
                })
            })
            .await
    }

    async fn exchange_refresh_credential(&self) -> Result<(), ApiError> {
        let Some(refresh) = self.inner.credentials.get(CredentialKind::Refresh) else {
            return Err(ApiError::MissingRefreshCredential);
        };

        let payload = RefreshRequest {
            refresh_token: refresh.as_str().to_string(),
        };
        let options = RequestOptions::json(serde_json::to_value(&payload)?);
        let tokens: TokenResponse = self
            .execute(Method::POST, REFRESH_PATH, &options)
            .await?
            .into_typed()?;

        self.inner.credentials.apply_tokens(&tokens)?;
        Ok(())
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url)
            .field("refresh", &self.inner.refresh)
            .finish_non_exhaustive()
    }
}
