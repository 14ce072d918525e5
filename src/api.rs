use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{MurError, codes};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of an API call that reached the server.
///
/// `data` is only set for a 200 response whose body parsed as `T`; `error`
/// carries the body text (or the parse failure) otherwise.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: Option<T>,
    pub raw_data: JsonValue,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    pub fn post_json<P, T>(
        &self,
        endpoint: &str,
        payload: &P,
        bearer: Option<&str>,
    ) -> Result<ApiResponse<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.http.post(self.url(endpoint)).json(payload);
        self.send(endpoint, with_bearer(builder, bearer))
    }

    pub fn post_form<P, T>(&self, endpoint: &str, payload: &P) -> Result<ApiResponse<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.http.post(self.url(endpoint)).form(payload);
        self.send(endpoint, builder)
    }

    fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        builder: RequestBuilder,
    ) -> Result<ApiResponse<T>> {
        let response = builder
            .send()
            .map_err(|err| transport_error(&self.base_url, endpoint, err))?;
        let status_code = response.status().as_u16();
        tracing::debug!(endpoint, status_code, "api response");

        let text = response.text().map_err(|err| {
            MurError::new(codes::API_REQUEST, "Failed to read API response")
                .with_detail(format!("Response from {endpoint} could not be read"))
                .with_source(err)
        })?;
        let raw_data: JsonValue = serde_json::from_str(&text).unwrap_or(JsonValue::Null);

        if status_code == 200 {
            return Ok(match serde_json::from_value::<T>(raw_data.clone()) {
                Ok(data) => ApiResponse {
                    status_code,
                    data: Some(data),
                    raw_data,
                    error: None,
                },
                Err(err) => {
                    tracing::debug!(%err, "failed to parse response data");
                    ApiResponse {
                        status_code,
                        data: None,
                        raw_data,
                        error: Some(format!("Failed to parse response: {err}")),
                    }
                }
            });
        }

        Ok(ApiResponse {
            status_code,
            data: None,
            raw_data,
            error: Some(text),
        })
    }
}

fn with_bearer(builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
    match bearer {
        Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

/// Maps a failure to reach the server onto a coded error.
pub fn transport_error(base_url: &str, endpoint: &str, err: reqwest::Error) -> MurError {
    let rendered = format!("{err:?}");
    if err.is_timeout() {
        return MurError::new(codes::CONNECTION_FAILED, "Request to server timed out")
            .with_detail(format!("{base_url} did not answer in time."))
            .with_source(err);
    }
    if rendered.contains("dns error") || rendered.contains("failed to lookup address") {
        return MurError::new(codes::CONNECTION_FAILED, "Failed to resolve server hostname")
            .with_detail(format!(
                "{base_url}. Please check your network connection and DNS settings."
            ))
            .with_source(err);
    }
    if err.is_connect() {
        return MurError::new(codes::CONNECTION_FAILED, "Failed to connect to server")
            .with_detail(format!("Connection refused. Is the server running at {base_url}?"))
            .with_source(err);
    }
    MurError::new(codes::CONNECTION_ERROR, format!("Connection error: {err}"))
        .with_detail(format!("Request to {endpoint} failed"))
        .with_source(err)
}
