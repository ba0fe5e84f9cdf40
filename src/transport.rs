//! HTTP transport for the SMS gateway protocol
//!
//! Every call is a form-encoded POST to the gateway root with `format=json`.
//! The JSON envelope is `{response: {msg: {err_code}, data: {...}}}`; a
//! nonzero `err_code` becomes a typed [`GatewayError::Api`].

use crate::errors::GatewayError;
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Parameters of one gateway call
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayRequest {
    params: Vec<(String, String)>,
}

impl GatewayRequest {
    pub fn new(method: &str) -> Self {
        Self {
            params: vec![("method".to_string(), method.to_string())],
        }
    }

    /// Set a parameter, replacing an earlier value under the same key
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();

        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn method(&self) -> &str {
        self.get("method").unwrap_or_default()
    }

    fn form(&self) -> Vec<(&str, &str)> {
        let mut form: Vec<(&str, &str)> = self
            .params
            .iter()
            .filter(|(k, _)| k != "format")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        form.push(("format", "json"));
        form
    }
}

#[derive(Debug, Clone)]
pub struct GatewayTransport {
    client: Client,
    base_url: String,
}

impl GatewayTransport {
    /// Create a transport for `host`, over HTTPS when `secure`
    pub fn new(host: &str, secure: bool, verify_tls: bool, http_timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(http_timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .user_agent(format!("site_watcher/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let scheme = if secure { "https" } else { "http" };

        Ok(Self {
            client,
            base_url: format!("{}://{}/", scheme, host),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute one call and return the `data` object of a successful response
    pub async fn execute(&self, request: &GatewayRequest, cookie: Option<&str>) -> Result<Value, GatewayError> {
        debug!("Gateway call {} to {}", request.method(), self.base_url);

        let mut builder = self.client.post(&self.base_url).form(&request.form());
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status != StatusCode::OK {
            return Err(GatewayError::Interface(format!(
                "gateway answered {} to {}",
                status,
                request.method()
            )));
        }

        let body = response.text().await?;
        let json: Value = serde_json::from_str(&body).unwrap_or_else(|e| {
            debug!("Unparseable gateway body for {}: {}", request.method(), e);
            Value::Null
        });

        parse_envelope(json)
    }
}

fn error_code(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Validate the response envelope and translate its error code
pub fn parse_envelope(json: Value) -> Result<Value, GatewayError> {
    let code = json
        .pointer("/response/msg/err_code")
        .and_then(error_code)
        .ok_or_else(|| {
            GatewayError::Interface("response is missing response.msg.err_code".to_string())
        })?;

    if let Some(err) = GatewayError::from_code(code) {
        return Err(err);
    }

    Ok(json.pointer("/response/data").cloned().unwrap_or(Value::Null))
}
