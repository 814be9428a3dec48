//! CRM REST client
//!
//! Form-encoded posts to the CRM endpoint: `action=login` for a session token,
//! `action=insert` for new leads.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FieldId, RestFailure};
use leadflow_common::config::CrmConfig;
use leadflow_common::{Error, Result};

/// Longest response excerpt kept in errors and logs
const BODY_EXCERPT_LEN: usize = 200;

/// Credential attached to an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmAuth {
    /// Session token from `action=login`
    Token(String),
    /// Static API key
    Key(String),
    Anonymous,
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// Interpret the CRM's answer to an insert
///
/// 2xx with a JSON body whose `status` is not `"error"` is success; the lead id
/// is read from `data.id` (or top-level `id`) when present.
pub fn interpret_insert_response(status: u16, body: &str) -> std::result::Result<Option<i64>, RestFailure> {
    match status {
        200..=299 => {}
        400..=499 => {
            return Err(RestFailure::Rejected {
                status,
                body: excerpt(body),
            })
        }
        _ => {
            return Err(RestFailure::Server {
                status,
                body: excerpt(body),
            })
        }
    }

    let json: Value = serde_json::from_str(body)
        .map_err(|e| RestFailure::UnusableBody(format!("not JSON ({}): {}", e, excerpt(body))))?;

    let Some(object) = json.as_object() else {
        return Err(RestFailure::UnusableBody(format!("not an object: {}", excerpt(body))));
    };

    if object.get("status").and_then(Value::as_str) == Some("error") {
        let message = object
            .get("error_message")
            .or_else(|| object.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unspecified");
        return Err(RestFailure::UnusableBody(format!("status error: {}", message)));
    }

    let id = object
        .get("data")
        .and_then(|d| d.get("id"))
        .or_else(|| object.get("id"))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

    Ok(id)
}

/// REST client for the CRM
pub struct CrmRestClient {
    auth_client: Client,
    insert_client: Client,
    api_url: String,
    entity_id: u32,
    api_key: Option<String>,
    credentials: Option<(String, String)>,
}

impl CrmRestClient {
    pub fn new(config: &CrmConfig) -> Result<Self> {
        let api_url = config
            .api_url()
            .ok_or_else(|| Error::Config("crm.api_url is not set".to_string()))?
            .to_string();

        let build = |connect: u64, total: u64| {
            Client::builder()
                .connect_timeout(Duration::from_secs(connect))
                .timeout(Duration::from_secs(total))
                .build()
                .map_err(|e| Error::Internal(format!("HTTP client build failed: {}", e)))
        };

        Ok(Self {
            auth_client: build(config.auth_connect_timeout_secs, config.auth_timeout_secs)?,
            insert_client: build(config.connect_timeout_secs, config.timeout_secs)?,
            api_url,
            entity_id: config.leads_entity_id,
            api_key: config.api_key().map(str::to_string),
            credentials: config
                .credentials()
                .map(|(u, p)| (u.to_string(), p.to_string())),
        })
    }

    /// Obtain the credential for the next insert
    ///
    /// Login is tried first when a username and password are configured; the
    /// static key is used when login fails or is not configured.
    pub async fn authenticate(&self) -> CrmAuth {
        if let Some((username, password)) = &self.credentials {
            match self.login(username, password).await {
                Some(token) => return CrmAuth::Token(token),
                None => warn!("CRM login failed, trying static API key"),
            }
        }

        match &self.api_key {
            Some(key) => CrmAuth::Key(key.clone()),
            None => CrmAuth::Anonymous,
        }
    }

    async fn login(&self, username: &str, password: &str) -> Option<String> {
        let params = [
            ("action", "login"),
            ("username", username),
            ("password", password),
        ];

        let response = match self.auth_client.post(&self.api_url).form(&params).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "CRM login request failed");
                return None;
            }
        };

        if response.status().as_u16() != 200 {
            debug!(status = response.status().as_u16(), "CRM login rejected");
            return None;
        }

        let body: Value = response.json().await.ok()?;
        body.get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    /// Post an insert with the given mapped field values
    pub async fn insert(
        &self,
        auth: &CrmAuth,
        fields: &[(FieldId, String)],
    ) -> std::result::Result<Option<i64>, RestFailure> {
        let mut params: Vec<(String, String)> = vec![
            ("action".to_string(), "insert".to_string()),
            ("entity_id".to_string(), self.entity_id.to_string()),
        ];

        match auth {
            CrmAuth::Token(token) => params.push(("token".to_string(), token.clone())),
            CrmAuth::Key(key) => params.push(("key".to_string(), key.clone())),
            CrmAuth::Anonymous => {}
        }

        for (id, value) in fields {
            params.push((format!("fields[{}]", id.column()), value.clone()));
        }

        let response = self
            .insert_client
            .post(&self.api_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| RestFailure::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RestFailure::Transport(format!("reading body: {}", e)))?;

        interpret_insert_response(status, &body)
    }
}
