//! Backend HTTP API client
//!
//! The coordinator calls the forum-scraping backend over REST. State-changing
//! routes require the short-lived anti-forgery token in `X-CSRF-Token` on top
//! of the bearer credential.

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crewlink_protocol::ThreadStatus;
use crewlink_utils::{CrewlinkError, Result};

/// Abstract backend API, object-safe so the router can be tested against
/// a scripted implementation.
pub trait BackendApi: Send + Sync {
    /// Fetch a fresh anti-forgery token
    fn fetch_forgery_token(&self, bearer: &str) -> BoxFuture<'static, Result<String>>;

    /// Search for releases
    fn search(
        &self,
        bearer: &str,
        query: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> BoxFuture<'static, Result<Value>>;

    /// Thread status and like information
    fn thread_status(&self, bearer: &str, thread_id: &str)
        -> BoxFuture<'static, Result<ThreadStatus>>;

    /// Like or unlike a thread (state-changing)
    fn set_like(
        &self,
        bearer: &str,
        forgery: &str,
        thread_id: &str,
        like: bool,
    ) -> BoxFuture<'static, Result<Value>>;

    /// Re-scrape a thread's cached data (state-changing)
    fn refresh_thread(
        &self,
        bearer: &str,
        forgery: &str,
        thread_id: &str,
    ) -> BoxFuture<'static, Result<Value>>;
}

/// reqwest-backed implementation against the backend's REST routes
pub struct HttpApi {
    base: Url,
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| CrewlinkError::config(format!("Invalid API base URL: {}", e)))?;
        Ok(Self {
            base,
            client: reqwest::Client::new(),
        })
    }

    fn route(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| CrewlinkError::api(format!("Invalid route {}: {}", path, e)))
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(CrewlinkError::auth(format!("{}: {}", status, body)));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CrewlinkError::api(format!("{}: {}", status, body)));
    }
    response
        .json()
        .await
        .map_err(|e| CrewlinkError::api(format!("Invalid JSON response: {}", e)))
}

impl BackendApi for HttpApi {
    fn fetch_forgery_token(&self, bearer: &str) -> BoxFuture<'static, Result<String>> {
        let client = self.client.clone();
        let bearer = bearer.to_string();
        let route = self.route("api/csrf-token");
        Box::pin(async move {
            let response = client
                .get(route?)
                .bearer_auth(&bearer)
                .send()
                .await
                .map_err(|e| CrewlinkError::api(e.to_string()))?;
            let body = read_json(response).await?;
            body.get("csrf_token")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| CrewlinkError::api("Missing csrf_token in response"))
        })
    }

    fn search(
        &self,
        bearer: &str,
        query: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> BoxFuture<'static, Result<Value>> {
        let client = self.client.clone();
        let bearer = bearer.to_string();
        let route = self.route("api");
        let query = query.to_string();
        Box::pin(async move {
            let mut url = route?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("t", "search");
                pairs.append_pair("q", &query);
                if let Some(season) = season {
                    pairs.append_pair("season", &season.to_string());
                }
                if let Some(episode) = episode {
                    pairs.append_pair("ep", &episode.to_string());
                }
            }
            let response = client
                .get(url)
                .bearer_auth(&bearer)
                .send()
                .await
                .map_err(|e| CrewlinkError::api(e.to_string()))?;
            read_json(response).await
        })
    }

    fn thread_status(
        &self,
        bearer: &str,
        thread_id: &str,
    ) -> BoxFuture<'static, Result<ThreadStatus>> {
        let client = self.client.clone();
        let bearer = bearer.to_string();
        let route = self.route(&format!("api/thread/{}/status", thread_id));
        Box::pin(async move {
            let response = client
                .get(route?)
                .bearer_auth(&bearer)
                .send()
                .await
                .map_err(|e| CrewlinkError::api(e.to_string()))?;
            let body = read_json(response).await?;
            serde_json::from_value(body)
                .map_err(|e| CrewlinkError::api(format!("Invalid status response: {}", e)))
        })
    }

    fn set_like(
        &self,
        bearer: &str,
        forgery: &str,
        thread_id: &str,
        like: bool,
    ) -> BoxFuture<'static, Result<Value>> {
        let client = self.client.clone();
        let bearer = bearer.to_string();
        let forgery = forgery.to_string();
        let route = self.route(&format!("api/thread/{}/like", thread_id));
        Box::pin(async move {
            let action = if like { "like" } else { "unlike" };
            let response = client
                .post(route?)
                .bearer_auth(&bearer)
                .header("X-CSRF-Token", &forgery)
                .json(&serde_json::json!({ "action": action }))
                .send()
                .await
                .map_err(|e| CrewlinkError::api(e.to_string()))?;
            read_json(response).await
        })
    }

    fn refresh_thread(
        &self,
        bearer: &str,
        forgery: &str,
        thread_id: &str,
    ) -> BoxFuture<'static, Result<Value>> {
        let client = self.client.clone();
        let bearer = bearer.to_string();
        let forgery = forgery.to_string();
        let route = self.route(&format!("api/search/refresh/{}", thread_id));
        Box::pin(async move {
            let response = client
                .post(route?)
                .bearer_auth(&bearer)
                .header("X-CSRF-Token", &forgery)
                .send()
                .await
                .map_err(|e| CrewlinkError::api(e.to_string()))?;
            read_json(response).await
        })
    }
}
