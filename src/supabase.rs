//! Supabase (PostgREST + GoTrue) client.
//!
//! Implements [`ExportBackend`] over `/rest/v1` and [`AdminGate`] over
//! `/auth/v1/user` plus the `profiles` table. Requests carry the project
//! anon key as `apikey`; the `Authorization` bearer is the caller's access
//! token once the client is scoped to a caller, the anon key otherwise.

use chrono::SecondsFormat;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::auth::{check_profile, AdminGate, AdminIdentity, Profile};
use crate::backend::{AuditEntry, ExportBackend};
use crate::config::ExportConfig;
use crate::error::AuthError;
use crate::export::{DateRange, ExportTable};
use crate::tabular::RowSet;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const AUDIT_TABLE: &str = "backup_audit_log";
const PROFILES_TABLE: &str = "profiles";

#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: Zeroizing<String>,
    access_token: Option<Zeroizing<String>>,
    max_rows: usize,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str, max_rows: usize) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| format!("HTTP client error: {e}"))?;
        Ok(Self {
            http,
            base_url: crate::config::normalize_supabase_url(base_url),
            anon_key: Zeroizing::new(anon_key.to_string()),
            access_token: None,
            max_rows,
        })
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self, String> {
        Self::new(&config.supabase_url, &config.supabase_anon_key, config.max_rows)
    }

    /// Copy of this client that authenticates as the caller holding `token`.
    pub fn with_access_token(&self, token: &str) -> Self {
        Self {
            access_token: Some(Zeroizing::new(token.to_string())),
            ..self.clone()
        }
    }

    fn bearer(&self) -> &str {
        match &self.access_token {
            Some(token) => token.as_str(),
            None => self.anon_key.as_str(),
        }
    }

    /// `GET` URL for the rows of `table`, restricted to `range` when given.
    pub fn rows_url(&self, table: ExportTable, range: Option<&DateRange>) -> Result<Url, String> {
        let mut url = Url::parse(&format!("{}/rest/v1/{}", self.base_url, table.as_str()))
            .map_err(|e| format!("Invalid Supabase URL: {e}"))?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("select", "*");
            qp.append_pair("limit", &self.max_rows.to_string());
            if let Some(range) = range {
                let column = table.date_column();
                let start = range.start.to_rfc3339_opts(SecondsFormat::Millis, true);
                let end = range.end.to_rfc3339_opts(SecondsFormat::Millis, true);
                qp.append_pair(column, &format!("gte.{start}"));
                qp.append_pair(column, &format!("lte.{end}"));
            }
        }
        Ok(url)
    }

    fn rest_url(&self, path: &str) -> Result<Url, String> {
        Url::parse(&format!("{}/rest/v1/{path}", self.base_url))
            .map_err(|e| format!("Invalid Supabase URL: {e}"))
    }

    async fn get_json(&self, url: Url, bearer: &str) -> Result<Value, (Option<StatusCode>, String)> {
        let resp = self
            .http
            .get(url)
            .header("apikey", self.anon_key.as_str())
            .header("Authorization", format!("Bearer {bearer}"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| (None, format!("Supabase request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err((Some(status), format!("Supabase error ({status}): {body}")));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| (Some(status), format!("Supabase JSON parse error: {e}")))
    }

    async fn current_user(&self, token: &str) -> Result<AuthUser, AuthError> {
        let url = Url::parse(&format!("{}/auth/v1/user", self.base_url))
            .map_err(|e| AuthError::Upstream(format!("Invalid Supabase URL: {e}")))?;
        match self.get_json(url, token).await {
            Ok(body) => serde_json::from_value::<AuthUser>(body)
                .map_err(|e| AuthError::Upstream(format!("unexpected user payload: {e}"))),
            Err((Some(status), message)) if status.is_client_error() => {
                debug!(%status, error = %message, "token rejected");
                Err(AuthError::Unauthenticated)
            }
            Err((_, message)) => Err(AuthError::Upstream(message)),
        }
    }

    async fn profile(&self, user_id: &str, token: &str) -> Result<Option<Profile>, AuthError> {
        let mut url = self.rest_url(PROFILES_TABLE).map_err(AuthError::Upstream)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{user_id}"))
            .append_pair("select", "role,approved");
        let body = self
            .get_json(url, token)
            .await
            .map_err(|(_, message)| AuthError::Upstream(message))?;
        parse_profile_rows(body).map_err(AuthError::Upstream)
    }
}

/// First profile row of a PostgREST array response.
fn parse_profile_rows(body: Value) -> Result<Option<Profile>, String> {
    let rows = serde_json::from_value::<Vec<Profile>>(body)
        .map_err(|e| format!("unexpected profile payload: {e}"))?;
    Ok(rows.into_iter().next())
}

/// Rows of a PostgREST response body; anything but a JSON array is an error.
fn into_row_set(body: Value) -> Result<RowSet, String> {
    match body {
        Value::Array(rows) => Ok(rows),
        other => Err(format!(
            "Supabase returned a non-array payload: {}",
            truncate(&other.to_string(), 200)
        )),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

impl ExportBackend for SupabaseClient {
    async fn fetch_rows(
        &self,
        table: ExportTable,
        range: Option<DateRange>,
    ) -> Result<RowSet, String> {
        let url = self.rows_url(table, range.as_ref())?;
        debug!(table = %table, "fetching rows");
        let body = self
            .get_json(url, self.bearer())
            .await
            .map_err(|(_, message)| message)?;
        let rows = into_row_set(body)?;
        if rows.len() >= self.max_rows {
            warn!(table = %table, max_rows = self.max_rows, "row cap reached; export may be truncated");
        }
        Ok(rows)
    }

    fn scoped(self: &Arc<Self>, caller: &AdminIdentity) -> Arc<Self> {
        Arc::new(self.with_access_token(&caller.access_token))
    }

    async fn record_export(&self, entry: AuditEntry) -> Result<(), String> {
        let url = self.rest_url(AUDIT_TABLE)?;
        let resp = self
            .http
            .post(url)
            .header("apikey", self.anon_key.as_str())
            .header("Authorization", format!("Bearer {}", self.bearer()))
            .header("Prefer", "return=minimal")
            .json(&entry)
            .send()
            .await
            .map_err(|e| format!("Supabase request failed: {e}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Supabase error ({status}): {body}"));
        }
        Ok(())
    }
}

impl AdminGate for SupabaseClient {
    async fn authorize(&self, bearer: Option<&str>) -> Result<AdminIdentity, AuthError> {
        let token = bearer.ok_or(AuthError::Unauthenticated)?;
        let user = self.current_user(token).await?;
        let profile = self.profile(&user.id, token).await?;
        check_profile(profile.as_ref())?;
        Ok(AdminIdentity::new(user.id, token))
    }
}
