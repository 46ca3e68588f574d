#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use r2r_search_mcp::client::{R2rApi, TokenPair};
use r2r_search_mcp::error::{R2rError, Result};
use r2r_search_mcp::model::{ChunkRecord, SearchHit, SearchSettings};
use serde_json::{json, Value};

pub fn token_with_exp(exp: i64) -> String {
    token_with_claims(&json!({"sub": "user-1", "exp": exp}))
}

pub fn token_with_claims(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2ln")
}

pub fn valid_token() -> String {
    token_with_exp(Utc::now().timestamp() + 3600)
}

pub fn expired_token() -> String {
    token_with_exp(Utc::now().timestamp() - 1)
}

pub fn hit(id: &str, document_id: &str, score: Option<f64>) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        document_id: document_id.to_string(),
        metadata: match score {
            Some(s) => json!({"search_score": s}),
            None => Value::Null,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Login(String),
    Refresh(String),
    Search {
        bearer: Option<String>,
        query: String,
        settings: Value,
    },
    Retrieve {
        bearer: Option<String>,
        chunk_id: String,
    },
}

fn rejected(what: &str) -> R2rError {
    R2rError::Api {
        status: 401,
        message: format!("{what} rejected"),
    }
}

/// Scripted stand-in for the R2R service that records every call.
#[derive(Default)]
pub struct FakeR2r {
    pub calls: Mutex<Vec<Call>>,
    pub login_tokens: Mutex<Vec<TokenPair>>,
    pub refresh_tokens: Mutex<Vec<TokenPair>>,
    pub hits: Option<Vec<SearchHit>>,
    pub search_error: Option<String>,
    pub chunk_texts: HashMap<String, String>,
}

impl FakeR2r {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login(self, tokens: TokenPair) -> Self {
        self.login_tokens.lock().unwrap().push(tokens);
        self
    }

    pub fn with_refresh(self, tokens: TokenPair) -> Self {
        self.refresh_tokens.lock().unwrap().push(tokens);
        self
    }

    pub fn with_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.hits = Some(hits);
        self
    }

    pub fn with_search_error(mut self, message: &str) -> Self {
        self.search_error = Some(message.to_string());
        self
    }

    pub fn with_chunk(mut self, id: &str, text: &str) -> Self {
        self.chunk_texts.insert(id.to_string(), text.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn logins(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Login(_))).count()
    }

    pub fn refreshes(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Refresh(_))).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl R2rApi for FakeR2r {
    async fn login(&self, username: &str, _password: &str) -> Result<TokenPair> {
        self.calls.lock().unwrap().push(Call::Login(username.to_string()));
        let mut queue = self.login_tokens.lock().unwrap();
        if queue.is_empty() {
            return Err(rejected("login"));
        }
        Ok(queue.remove(0))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.calls.lock().unwrap().push(Call::Refresh(refresh_token.to_string()));
        let mut queue = self.refresh_tokens.lock().unwrap();
        if queue.is_empty() {
            return Err(rejected("refresh"));
        }
        Ok(queue.remove(0))
    }

    async fn search_chunks(
        &self,
        bearer: Option<&str>,
        query: &str,
        settings: &SearchSettings,
    ) -> Result<Vec<SearchHit>> {
        self.calls.lock().unwrap().push(Call::Search {
            bearer: bearer.map(str::to_string),
            query: query.to_string(),
            settings: serde_json::to_value(settings)?,
        });
        if let Some(message) = &self.search_error {
            return Err(R2rError::Api {
                status: 500,
                message: message.clone(),
            });
        }
        Ok(self.hits.clone().unwrap_or_default())
    }

    async fn retrieve_chunk(&self, bearer: Option<&str>, chunk_id: &str) -> Result<ChunkRecord> {
        self.calls.lock().unwrap().push(Call::Retrieve {
            bearer: bearer.map(str::to_string),
            chunk_id: chunk_id.to_string(),
        });
        match self.chunk_texts.get(chunk_id) {
            Some(text) => Ok(ChunkRecord {
                id: chunk_id.to_string(),
                document_id: String::new(),
                text: text.clone(),
            }),
            None => Err(R2rError::Api {
                status: 404,
                message: format!("chunk {chunk_id} not found"),
            }),
        }
    }
}
