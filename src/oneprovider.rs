#![doc = "Oneprovider REST client: implements XattrApi against one endpoint of the Onedata cluster."]
//
//! # Oneprovider client
//!
//! Bridges the [`XattrApi`] trait to the oneprovider REST API. One
//! [`OneproviderClient`] talks to one endpoint; clients for different endpoints
//! share a single [`reqwest::Client`] and therefore one connection pool.
//!
//! Every call builds a fresh request (method, URL, headers, body) and performs a
//! single attempt; retrying is the engine's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::contract::{FileId, XattrApi};
use crate::error::PhaseError;

pub const AUTH_HEADER: &str = "X-Auth-Token";
pub const CDMI_VERSION_HEADER: &str = "X-CDMI-Specification-Version";
pub const CDMI_VERSION: &str = "1.1.1";
pub const MD5_XATTR: &str = "s3.content.md5";

const JSON: &str = "application/json";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(rename = "fileId")]
    file_id: String,
}

/// The md5 extended attribute as sent and returned by the xattrs endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Md5Xattr {
    #[serde(rename = "s3.content.md5")]
    pub md5: String,
}

/// Builds the HTTP client shared by all workers. The idle pool per host is
/// sized to the worker count.
pub fn build_http_client(
    workers: usize,
    connect_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(workers)
        .build()
}

#[derive(Clone)]
pub struct OneproviderClient {
    http: Client,
    base_url: String,
    token: String,
    request_timeout: Duration,
}

impl OneproviderClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!(base_url = %base_url, "Initialized oneprovider client");
        Self {
            http,
            base_url,
            token: token.into(),
            request_timeout,
        }
    }

    pub fn lookup_url(&self, encoded_path: &str) -> String {
        format!(
            "{}/api/v3/oneprovider/lookup-file-id/{}",
            self.base_url, encoded_path
        )
    }

    pub fn xattrs_url(&self, file_id: &FileId) -> String {
        format!(
            "{}/api/v3/oneprovider/data/{}/metadata/xattrs",
            self.base_url, file_id
        )
    }

    pub fn md5_query_url(&self, file_id: &FileId) -> String {
        format!("{}?attribute={}", self.xattrs_url(file_id), MD5_XATTR)
    }
}

/// Checks status and content type; the body is left untouched.
fn check_response(response: &Response, expected: StatusCode) -> Result<(), PhaseError> {
    let status = response.status();
    if status != expected {
        return Err(PhaseError::UnexpectedStatus {
            expected: expected.as_u16(),
            actual: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    if !content_type.starts_with(JSON) {
        return Err(PhaseError::UnexpectedContentType(content_type));
    }
    Ok(())
}

async fn json_body<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, PhaseError> {
    let body = response.bytes().await?;
    if body.is_empty() {
        return Err(PhaseError::EmptyBody);
    }
    serde_json::from_slice(&body).map_err(|e| PhaseError::MalformedBody(e.to_string()))
}

#[async_trait]
impl XattrApi for OneproviderClient {
    fn endpoint(&self) -> String {
        self.base_url.clone()
    }

    async fn lookup_file_id(&self, encoded_path: &str) -> Result<FileId, PhaseError> {
        let response = self
            .http
            .post(self.lookup_url(encoded_path))
            .header(AUTH_HEADER, &self.token)
            .timeout(self.request_timeout)
            .send()
            .await?;

        check_response(&response, StatusCode::OK)?;
        let lookup: LookupResponse = json_body(response).await?;
        Ok(FileId(lookup.file_id))
    }

    async fn write_checksum(&self, file_id: &FileId, checksum: &str) -> Result<(), PhaseError> {
        let body = Md5Xattr {
            md5: checksum.to_string(),
        };
        let response = self
            .http
            .put(self.xattrs_url(file_id))
            .header(AUTH_HEADER, &self.token)
            .header(CDMI_VERSION_HEADER, CDMI_VERSION)
            .json(&body)
            .timeout(self.request_timeout)
            .send()
            .await?;

        check_response(&response, StatusCode::NO_CONTENT)
    }

    async fn read_checksum(&self, file_id: &FileId) -> Result<String, PhaseError> {
        let response = self
            .http
            .get(self.md5_query_url(file_id))
            .header(AUTH_HEADER, &self.token)
            .timeout(self.request_timeout)
            .send()
            .await?;

        check_response(&response, StatusCode::OK)?;
        let xattr: Md5Xattr = json_body(response).await?;
        Ok(xattr.md5)
    }
}
