//! Redfish HTTP transport.
//!
//! Thin JSON-over-HTTPS helper shared by the adapters: basic auth on every
//! request, non-2xx answers mapped to `BmcError::Vendor` with the raw body.

use reqwest::{RequestBuilder, Response};
use serde_json::Value;

use crate::error::{BmcError, Result};
use crate::types::ActionAck;

/// Root path of every Redfish service.
pub const SERVICE_ROOT: &str = "/redfish/v1";

/// Build a base URL from a host or URL.
///
/// Plain hosts are reached over HTTPS; values that already carry a scheme are
/// used as-is.
#[must_use]
pub fn base_url_for(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Authenticated Redfish transport for one BMC.
#[derive(Clone)]
pub struct RedfishHttp {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl RedfishHttp {
    /// Create a transport for `base_url` with basic-auth credentials.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// The base URL of the BMC.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let payload = Self::read_body(response).await.unwrap_or(Value::Null);
        tracing::debug!(
            base_url = %self.base_url,
            status = status.as_u16(),
            "BMC request rejected"
        );
        Err(BmcError::Vendor {
            status: status.as_u16(),
            payload,
        })
    }

    async fn read_body(response: Response) -> Result<Value> {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }

    fn ack(response: &Response) -> ActionAck {
        ActionAck {
            status: response.status().as_u16(),
            location: response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        }
    }

    /// GET a resource.
    ///
    /// # Errors
    ///
    /// Returns a transport or vendor error.
    pub async fn get(&self, path: &str) -> Result<Value> {
        let response = self.send(self.client.get(self.url(path))).await?;
        Self::read_body(response).await
    }

    /// POST an action body and return the acknowledgement and response body.
    ///
    /// # Errors
    ///
    /// Returns a transport or vendor error.
    pub async fn post(&self, path: &str, body: &Value) -> Result<(ActionAck, Value)> {
        let response = self
            .send(self.client.post(self.url(path)).json(body))
            .await?;
        let ack = Self::ack(&response);
        Ok((ack, Self::read_body(response).await?))
    }

    /// PATCH a resource.
    ///
    /// # Errors
    ///
    /// Returns a transport or vendor error.
    pub async fn patch(&self, path: &str, body: &Value) -> Result<ActionAck> {
        let response = self
            .send(self.client.patch(self.url(path)).json(body))
            .await?;
        Ok(Self::ack(&response))
    }

    /// DELETE a resource.
    ///
    /// # Errors
    ///
    /// Returns a transport or vendor error.
    pub async fn delete(&self, path: &str) -> Result<ActionAck> {
        let response = self.send(self.client.delete(self.url(path))).await?;
        Ok(Self::ack(&response))
    }

    /// GET a collection and return its members, expanding bare links.
    ///
    /// # Errors
    ///
    /// Returns a transport or vendor error.
    pub async fn get_members(&self, path: &str) -> Result<Vec<Value>> {
        let collection = self.get(path).await?;
        let members = collection
            .get("Members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut expanded = Vec::with_capacity(members.len());
        for member in members {
            match member.as_object() {
                Some(obj) if obj.len() == 1 => {
                    if let Some(link) = obj.get("@odata.id").and_then(Value::as_str) {
                        expanded.push(self.get(link).await?);
                    }
                }
                _ => expanded.push(member),
            }
        }
        Ok(expanded)
    }

    /// The `@odata.id` of the first member of a collection.
    ///
    /// # Errors
    ///
    /// Returns `BmcError::InvalidResponse` if the collection is empty.
    pub async fn first_member(&self, path: &str) -> Result<String> {
        let collection = self.get(path).await?;
        collection
            .pointer("/Members/0/@odata.id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| BmcError::InvalidResponse(format!("no members in {path}")))
    }
}
