use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{R2rError, Result};
use crate::model::{ChunkRecord, SearchHit, SearchSettings};

/// Bearer token plus the refresh token that can renew it.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// The calls this server makes against the remote R2R service.
#[async_trait]
pub trait R2rApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;

    async fn search_chunks(
        &self,
        bearer: Option<&str>,
        query: &str,
        settings: &SearchSettings,
    ) -> Result<Vec<SearchHit>>;

    async fn retrieve_chunk(&self, bearer: Option<&str>, chunk_id: &str) -> Result<ChunkRecord>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    results: T,
}

#[derive(Debug, Deserialize)]
struct TokenField {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResults {
    access_token: TokenField,
    #[serde(default)]
    refresh_token: Option<TokenField>,
}

impl From<TokenResults> for TokenPair {
    fn from(r: TokenResults) -> Self {
        TokenPair {
            access_token: r.access_token.token,
            refresh_token: r.refresh_token.map(|t| t.token),
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    search_settings: &'a SearchSettings,
}

/// R2R v3 REST client.
#[derive(Debug, Clone)]
pub struct HttpR2rClient {
    http: Client,
    base_url: String,
}

impl HttpR2rClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v3/{}", self.base_url, path)
    }

    fn authorize(req: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        match bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_results<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(R2rError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let body = resp.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| R2rError::InvalidResponse(format!("unexpected response body: {e}")))?;
        Ok(envelope.results)
    }
}

#[async_trait]
impl R2rApi for HttpR2rClient {
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        debug!("logging in to {} as {}", self.base_url, username);
        let resp = self
            .http
            .post(self.url("users/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        let tokens: TokenResults = Self::read_results(resp).await?;
        Ok(tokens.into())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let resp = self
            .http
            .post(self.url("users/refresh-token"))
            .json(&refresh_token)
            .send()
            .await?;
        let tokens: TokenResults = Self::read_results(resp).await?;
        Ok(tokens.into())
    }

    async fn search_chunks(
        &self,
        bearer: Option<&str>,
        query: &str,
        settings: &SearchSettings,
    ) -> Result<Vec<SearchHit>> {
        let body = SearchBody {
            query,
            search_settings: settings,
        };
        let req = self.http.post(self.url("chunks/search")).json(&body);
        let resp = Self::authorize(req, bearer).send().await?;
        Self::read_results(resp).await
    }

    async fn retrieve_chunk(&self, bearer: Option<&str>, chunk_id: &str) -> Result<ChunkRecord> {
        let path = format!("chunks/{}", urlencoding::encode(chunk_id));
        let req = self.http.get(self.url(&path));
        let resp = Self::authorize(req, bearer).send().await?;
        Self::read_results(resp).await
    }
}
