// src/services/client.rs

//! HTTP implementation of the harvesting capability.
//!
//! Talks to a JSON API rooted at `http.base_url`:
//!
//! ```text
//! GET {base}/timeline?subject=..&cursor=..&count=..  -> TimelinePage
//! GET {base}/threads/{conversation_id}               -> RawRecord (with thread)
//! ```
//!
//! The active credential travels as `auth_token`/`ct0` cookies plus an
//! `x-csrf-token` header.

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Credential, HttpConfig, RawRecord, TimelinePage};
use crate::services::HarvestSource;
use crate::utils::{egress_host, http};

/// Platform API client with a swappable active identity.
pub struct ApiClient {
    client: Client,
    config: HttpConfig,
    base: Url,
    active: Option<Credential>,
    proxy: Option<String>,
}

impl ApiClient {
    /// Create a client without a proxy.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(AppError::config(format!(
                "http.base_url cannot be a base: {}",
                config.base_url
            )));
        }

        Ok(Self {
            client: http::create_client(config, None)?,
            config: config.clone(),
            base,
            active: None,
            proxy: None,
        })
    }

    /// Route every subsequent request through `address` (or directly when
    /// `None`). Rebuilds the underlying transport.
    pub fn set_proxy(&mut self, address: Option<&str>) -> Result<()> {
        self.client = http::create_client(&self.config, address)?;
        self.proxy = address.map(str::to_string);
        Ok(())
    }

    pub fn has_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Confirm that requests leave through the expected IP.
    ///
    /// `endpoint` must answer with the caller's public IP as plain text.
    pub async fn verify_proxy(&self, endpoint: &str, expected_ip: &str) -> Result<()> {
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| AppError::egress(format!("failed to get IP: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::egress(format!(
                "IP endpoint answered HTTP {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| AppError::egress(format!("failed to read IP: {e}")))?;

        check_egress(&body, expected_ip)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::config("http.base_url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn session_label(&self) -> String {
        self.active
            .as_ref()
            .map(Credential::fingerprint)
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn auth_headers(credential: &Credential) -> Result<HeaderMap> {
        let invalid = |_| AppError::config("Credential contains characters not allowed in headers");

        let mut headers = HeaderMap::new();
        let cookie = format!(
            "auth_token={}; ct0={}",
            credential.auth_token, credential.csrf_token
        );
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).map_err(invalid)?);
        headers.insert(
            "x-csrf-token",
            HeaderValue::from_str(&credential.csrf_token).map_err(invalid)?,
        );
        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, context: &str) -> Result<T> {
        let credential = self
            .active
            .as_ref()
            .ok_or_else(|| AppError::authentication("anonymous", "no session authenticated"))?;

        let response = self
            .client
            .get(url)
            .headers(Self::auth_headers(credential)?)
            .send()
            .await
            .map_err(|e| AppError::fetch(context, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, context, &self.session_label(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::fetch(context, format!("undecodable body: {e}")))
    }
}

#[async_trait]
impl HarvestSource for ApiClient {
    fn authenticate(&mut self, credential: &Credential) -> Result<()> {
        // Fail early on tokens that can never form a header
        Self::auth_headers(credential)?;
        self.active = Some(credential.clone());
        Ok(())
    }

    async fn timeline_page(
        &self,
        subject: &str,
        cursor: &str,
        count: usize,
    ) -> Result<TimelinePage> {
        let mut url = self.endpoint(&["timeline"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("subject", subject);
            query.append_pair("count", &count.to_string());
            if !cursor.is_empty() {
                query.append_pair("cursor", cursor);
            }
        }
        self.get_json(url, &format!("timeline of {subject}")).await
    }

    async fn thread_detail(&self, conversation_id: &str) -> Result<RawRecord> {
        let url = self.endpoint(&["threads", conversation_id])?;
        self.get_json(url, &format!("thread {conversation_id}"))
            .await
    }
}

/// Map a non-success status onto the error taxonomy.
fn classify_status(status: StatusCode, context: &str, session: &str, body: &str) -> AppError {
    let snippet: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::authentication(session, format!("HTTP {status}: {snippet}"))
        }
        _ => AppError::fetch(context, format!("HTTP {status}: {snippet}")),
    }
}

/// Compare the echoed public IP against the expected egress.
fn check_egress(body: &str, expected: &str) -> Result<()> {
    let actual = body.trim();
    let expected = egress_host(expected);
    if actual != expected {
        return Err(AppError::egress(format!(
            "not using proxy IP! Expected: {expected}, Got: {actual}"
        )));
    }
    Ok(())
}
