//! Authenticated REST access to an SQVD host.
//!
//! One login per run: the token pair returned by the `login` endpoint is
//! attached as default headers to a shared blocking HTTP client, which is
//! then used for every call until `logout`. The client is not synchronized;
//! it assumes exclusive ownership by one sequential pipeline.

use crate::resource::{safe_keys, Resource};
use crate::upload::FileType;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

/// Errors surfaced by the remote API. Transport failures and non-success
/// statuses are reported as-is and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("SQVD request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQVD API error (HTTP {status}): {body}")]
    Status { status: u16, body: String },

    #[error("unexpected SQVD response: {0}")]
    Shape(String),

    #[error("invalid SQVD URL: {0}")]
    Url(#[from] url::ParseError),
}

/// The contract boundary of the remote resource client: generic find/create
/// (plus delete and file attachment) over the closed [`Resource`] set.
/// Implemented over HTTP by [`SqvdClient`] and in memory by test fakes.
pub trait ResourceApi {
    /// List documents matching a set of key/value equality constraints.
    fn find(&self, resource: Resource, filter: &[(&str, String)]) -> Result<Vec<Value>, ApiError>;

    /// Create a document and return it as stored.
    fn create(&self, resource: Resource, body: Value) -> Result<Value, ApiError>;

    /// Delete a document by id and return the server response data.
    fn delete(&self, resource: Resource, id: &str) -> Result<Value, ApiError>;

    /// Attach file bytes to a study under a per-type endpoint.
    fn attach(
        &self,
        study_id: &str,
        file_type: FileType,
        filename: &str,
        bytes: Vec<u8>,
        import: bool,
    ) -> Result<Value, ApiError>;

    /// The id of the authenticated user, stamped into created documents.
    fn user_id(&self) -> &str;
}

/// An authenticated session against one SQVD host.
pub struct SqvdClient {
    base: Url,
    http: Client,
    user_id: String,
}

impl SqvdClient {
    /// Log in to `host` (which may carry a path prefix, e.g.
    /// `localhost:3000/sqvd`) and return an authenticated client. The
    /// password is sent as its SHA-256 hex digest with `hashed: true`.
    pub fn login(host: &str, username: &str, password: &str) -> Result<Self, ApiError> {
        let base = Url::parse(&format!("http://{}/api/v1/", host.trim_end_matches('/')))?;
        let digest = format!("{:x}", Sha256::digest(password.as_bytes()));

        let response = Client::new()
            .post(base.join("login")?)
            .form(&[
                ("username", username),
                ("password", digest.as_str()),
                ("hashed", "true"),
            ])
            .send()?;
        let body = check_response(response)?;

        let auth = &body["data"];
        let token = expect_str(auth, "authToken")?;
        let user_id = expect_str(auth, "userId")?;

        let mut headers = HeaderMap::new();
        headers.insert("X-Auth-Token", header_value(token)?);
        headers.insert("X-User-Id", header_value(user_id)?);
        let http = Client::builder().default_headers(headers).build()?;

        Ok(SqvdClient {
            base,
            http,
            user_id: user_id.to_string(),
        })
    }

    /// Invalidate the session. Consumes the client; nothing can be sent
    /// after logout.
    pub fn logout(self) -> Result<(), ApiError> {
        let response = self.http.post(self.base.join("logout")?).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Fetch a single document by id.
    pub fn get(&self, resource: Resource, id: &str) -> Result<Value, ApiError> {
        let url = self.base.join(&format!("{}/{id}", resource.collection()))?;
        let body = check_response(self.http.get(url).send()?)?;
        data_field(body, resource)
    }
}

impl ResourceApi for SqvdClient {
    fn find(&self, resource: Resource, filter: &[(&str, String)]) -> Result<Vec<Value>, ApiError> {
        let mut url = self.base.join(resource.collection())?;
        if !filter.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(filter.iter().map(|(key, value)| (*key, value.as_str())));
        }
        let body = check_response(self.http.get(url).send()?)?;
        match data_field(body, resource)? {
            Value::Array(items) => Ok(items),
            other => Err(ApiError::Shape(format!(
                "expected an array of {resource} documents, got {other}"
            ))),
        }
    }

    fn create(&self, resource: Resource, body: Value) -> Result<Value, ApiError> {
        let url = self.base.join(resource.collection())?;
        let response = self.http.post(url).json(&safe_keys(body)).send()?;
        data_field(check_response(response)?, resource)
    }

    fn delete(&self, resource: Resource, id: &str) -> Result<Value, ApiError> {
        let url = self.base.join(&format!("{}/{id}", resource.collection()))?;
        data_field(check_response(self.http.delete(url).send()?)?, resource)
    }

    fn attach(
        &self,
        study_id: &str,
        file_type: FileType,
        filename: &str,
        bytes: Vec<u8>,
        import: bool,
    ) -> Result<Value, ApiError> {
        let mut url = self.base.join(&format!("study/{study_id}/{file_type}"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("filename", filename);
            if import {
                query.append_pair("import", "true");
            }
        }
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()?;
        check_response(response)
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }
}

fn check_response(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: response.text().unwrap_or_default(),
        });
    }
    Ok(response.json()?)
}

fn data_field(body: Value, resource: Resource) -> Result<Value, ApiError> {
    match body {
        Value::Object(mut map) => map
            .remove("data")
            .ok_or_else(|| ApiError::Shape(format!("{resource} response has no data field"))),
        other => Err(ApiError::Shape(format!(
            "expected a {resource} response object, got {other}"
        ))),
    }
}

fn expect_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    value[field]
        .as_str()
        .ok_or_else(|| ApiError::Shape(format!("login response has no {field}")))
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|_| ApiError::Shape(format!("'{value}' is not a valid header value")))
}
