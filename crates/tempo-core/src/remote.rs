use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::model::AuthUser;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Failures at the remote boundary. Nothing is retried; every failure
/// degrades to a reverted or stale local view.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("write denied by row policy: {0}")]
    PolicyDenied(String),
    #[error("no matching row")]
    NotFound,
    #[error("conflicts with an existing row: {0}")]
    Conflict(String),
    #[error("remote call failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("failed decoding remote payload: {0}")]
    Decode(String),
}

fn map_status(status: u16, body: String) -> RemoteError {
    match status {
        400 | 401 => RemoteError::Auth(body),
        403 => RemoteError::PolicyDenied(body),
        404 | 406 => RemoteError::NotFound,
        409 => RemoteError::Conflict(body),
        _ => RemoteError::Status { status, body },
    }
}

fn map_ureq(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            map_status(status, body)
        }
        ureq::Error::Transport(transport) => RemoteError::Transport(transport.to_string()),
    }
}

fn decode<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, RemoteError> {
    resp.into_json::<T>()
        .map_err(|err| RemoteError::Decode(err.to_string()))
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Client for the hosted backend: auth endpoints plus a row query builder
/// over its REST surface.
pub struct Remote {
    agent: ureq::Agent,
    base_url: String,
    anon_key: String,
}

impl Remote {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = cfg.require("backend.url")?;
        let anon_key = cfg.require("backend.anon_key")?;
        Ok(Self::new(&base_url, &anon_key))
    }

    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    fn auth_post(&self, path: &str, token: Option<&str>) -> ureq::Request {
        let bearer = token.unwrap_or(&self.anon_key);
        self.agent
            .post(&format!("{}/auth/v1/{path}", self.base_url))
            .set("apikey", &self.anon_key)
            .set("Authorization", &format!("Bearer {bearer}"))
    }

    #[instrument(skip(self, password))]
    pub fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, RemoteError> {
        let resp = self
            .auth_post("signup", None)
            .send_json(json!({ "email": email, "password": password }))
            .map_err(map_ureq)?;
        decode(resp)
    }

    #[instrument(skip(self, password))]
    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthTokens, RemoteError> {
        let resp = self
            .auth_post("token?grant_type=password", None)
            .send_json(json!({ "email": email, "password": password }))
            .map_err(map_ureq)?;
        decode(resp)
    }

    #[instrument(skip(self, token))]
    pub fn sign_out(&self, token: &str) -> Result<(), RemoteError> {
        self.auth_post("logout", Some(token))
            .call()
            .map_err(map_ureq)?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    pub fn current_user(&self, token: &str) -> Result<AuthUser, RemoteError> {
        let resp = self
            .agent
            .get(&format!("{}/auth/v1/user", self.base_url))
            .set("apikey", &self.anon_key)
            .set("Authorization", &format!("Bearer {token}"))
            .call()
            .map_err(map_ureq)?;
        decode(resp)
    }

    #[instrument(skip(self))]
    pub fn resend_confirmation(&self, email: &str) -> Result<(), RemoteError> {
        self.auth_post("resend", None)
            .send_json(json!({ "type": "signup", "email": email }))
            .map_err(map_ureq)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), RemoteError> {
        let mut path = "recover".to_string();
        if let Some(target) = redirect_to {
            path = format!("recover?redirect_to={target}");
        }
        self.auth_post(&path, None)
            .send_json(json!({ "email": email }))
            .map_err(map_ureq)?;
        Ok(())
    }

    /// Start a row query against a named collection, authorized as `token`.
    pub fn rows<'a>(&'a self, token: &'a str, table: &'a str) -> RowQuery<'a> {
        RowQuery {
            remote: self,
            token,
            table,
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }
}

/// Builder for scoped select/insert/update/delete against one collection.
pub struct RowQuery<'a> {
    remote: &'a Remote,
    token: &'a str,
    table: &'a str,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Option<String>,
    limit: Option<usize>,
}

impl RowQuery<'_> {
    pub fn select(mut self, columns: &str) -> Self {
        self.select = Some(columns.to_string());
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    pub fn eq_owner(self, user_id: Uuid) -> Self {
        self.eq("user_id", user_id)
    }

    pub fn gte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("gte.{}", value.to_string())));
        self
    }

    pub fn lte(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("lte.{}", value.to_string())));
        self
    }

    pub fn lt(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("lt.{}", value.to_string())));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.order = Some(format!("{column}.{direction}"));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn url(&self) -> String {
        format!("{}/rest/v1/{}", self.remote.base_url, self.table)
    }

    fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(select) = &self.select {
            params.push(("select".to_string(), select.clone()));
        }
        for (column, predicate) in &self.filters {
            params.push((column.clone(), predicate.clone()));
        }
        if let Some(order) = &self.order {
            params.push(("order".to_string(), order.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    fn request(&self, method: &str) -> ureq::Request {
        let mut req = self
            .remote
            .agent
            .request(method, &self.url())
            .set("apikey", &self.remote.anon_key)
            .set("Authorization", &format!("Bearer {}", self.token));
        for (key, value) in self.query_params() {
            req = req.query(&key, &value);
        }
        req
    }

    #[instrument(skip(self), fields(table = self.table))]
    pub fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, RemoteError> {
        debug!(filters = ?self.filters, "fetching rows");
        let resp = self.request("GET").call().map_err(map_ureq)?;
        decode(resp)
    }

    /// Single-row mode; a miss maps to `RemoteError::NotFound`.
    #[instrument(skip(self), fields(table = self.table))]
    pub fn fetch_one<T: DeserializeOwned>(self) -> Result<T, RemoteError> {
        let resp = self
            .request("GET")
            .set("Accept", "application/vnd.pgrst.object+json")
            .call()
            .map_err(map_ureq)?;
        decode(resp)
    }

    /// Exact count mode: no rows transferred, only the total.
    #[instrument(skip(self), fields(table = self.table))]
    pub fn count(self) -> Result<u64, RemoteError> {
        let resp = self
            .request("HEAD")
            .set("Prefer", "count=exact")
            .call()
            .map_err(map_ureq)?;

        let range = resp.header("content-range").unwrap_or_default();
        parse_content_range_total(range)
            .ok_or_else(|| RemoteError::Decode(format!("unparseable content-range: {range}")))
    }

    /// Insert one row and return the server representation (with the
    /// server-assigned identifier).
    #[instrument(skip(self, body), fields(table = self.table))]
    pub fn insert<B: Serialize, T: DeserializeOwned>(self, body: &B) -> Result<T, RemoteError> {
        let resp = self
            .request("POST")
            .set("Prefer", "return=representation")
            .send_json(serde_json::to_value(body).map_err(|e| RemoteError::Decode(e.to_string()))?)
            .map_err(map_ureq)?;

        let mut rows: Vec<T> = decode(resp)?;
        if rows.is_empty() {
            return Err(RemoteError::Decode(
                "insert returned an empty representation".to_string(),
            ));
        }
        Ok(rows.remove(0))
    }

    #[instrument(skip(self, body), fields(table = self.table))]
    pub fn update<B: Serialize>(self, body: &B) -> Result<(), RemoteError> {
        self.request("PATCH")
            .send_json(serde_json::to_value(body).map_err(|e| RemoteError::Decode(e.to_string()))?)
            .map_err(map_ureq)?;
        Ok(())
    }

    #[instrument(skip(self), fields(table = self.table))]
    pub fn delete(self) -> Result<(), RemoteError> {
        self.request("DELETE").call().map_err(map_ureq)?;
        Ok(())
    }
}

fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{Remote, RemoteError, map_status, parse_content_range_total};

    #[test]
    fn query_params_compose_filters_order_and_limit() {
        let remote = Remote::new("https://example.invalid/", "anon");
        let owner = Uuid::nil();
        let query = remote
            .rows("token", "focus_sessions")
            .select("started_at,ended_at")
            .eq_owner(owner)
            .gte("started_at", "2026-03-02T00:00:00Z")
            .lt("started_at", "2026-03-09T00:00:00Z")
            .order("started_at", true)
            .limit(10);

        assert_eq!(query.url(), "https://example.invalid/rest/v1/focus_sessions");

        let params = query.query_params();
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "started_at,ended_at".to_string()),
                (
                    "user_id".to_string(),
                    format!("eq.{owner}"),
                ),
                (
                    "started_at".to_string(),
                    "gte.2026-03-02T00:00:00Z".to_string()
                ),
                (
                    "started_at".to_string(),
                    "lt.2026-03-09T00:00:00Z".to_string()
                ),
                ("order".to_string(), "started_at.asc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn status_codes_map_to_the_error_taxonomy() {
        assert!(matches!(map_status(401, String::new()), RemoteError::Auth(_)));
        assert!(matches!(
            map_status(403, String::new()),
            RemoteError::PolicyDenied(_)
        ));
        assert!(matches!(map_status(404, String::new()), RemoteError::NotFound));
        assert!(matches!(map_status(406, String::new()), RemoteError::NotFound));
        assert!(matches!(
            map_status(409, String::new()),
            RemoteError::Conflict(_)
        ));
        assert!(matches!(
            map_status(500, String::new()),
            RemoteError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn content_range_total_parses() {
        assert_eq!(parse_content_range_total("0-24/57"), Some(57));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("garbage"), None);
    }
}
