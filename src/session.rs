//! Session guard: keeps the R2R bearer token usable across tool calls.
//!
//! Each call walks bearer check -> refresh exchange -> full login and stops at
//! the first step that yields a usable token. Failures are logged and turned
//! into a [`SessionStatus`]; the following search call surfaces them.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::client::{R2rApi, TokenPair};
use crate::config::Credentials;
use crate::token::is_token_valid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No credentials configured; calls go out without a bearer token.
    Anonymous,
    /// First use; the initial login was attempted (or skipped when anonymous).
    Initialized,
    /// The held bearer token has not expired.
    Valid,
    Refreshed,
    LoggedIn,
    LoginFailed(String),
}

/// Outcome of a session check together with the bearer to send.
#[derive(Debug, Clone)]
pub struct ValidSession {
    pub status: SessionStatus,
    pub bearer: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    initialized: bool,
    tokens: Option<TokenPair>,
}

pub struct SessionGuard {
    client: Arc<dyn R2rApi>,
    credentials: Option<Credentials>,
    state: Mutex<SessionState>,
}

impl SessionGuard {
    pub fn new(client: Arc<dyn R2rApi>, credentials: Option<Credentials>) -> Self {
        Self {
            client,
            credentials,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn client(&self) -> &Arc<dyn R2rApi> {
        &self.client
    }

    pub fn is_authenticated_mode(&self) -> bool {
        self.credentials.is_some()
    }

    pub async fn bearer(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.tokens.as_ref().map(|t| t.access_token.clone())
    }

    /// One-time setup: performs the initial login when credentials are configured.
    /// A failed login is logged only; later calls fall back to re-authentication.
    pub async fn ensure_initialized(&self) -> ValidSession {
        let mut state = self.state.lock().await;
        if state.initialized {
            return ValidSession {
                status: SessionStatus::Initialized,
                bearer: current_bearer(&state),
            };
        }
        let status = self.initialize(&mut state).await;
        ValidSession {
            status,
            bearer: current_bearer(&state),
        }
    }

    /// Runs before every tool call. Holds the state lock for the whole sequence.
    pub async fn ensure_valid_session(&self) -> ValidSession {
        let mut state = self.state.lock().await;

        if !state.initialized {
            let status = self.initialize(&mut state).await;
            return ValidSession {
                status,
                bearer: current_bearer(&state),
            };
        }

        let Some(creds) = self.credentials.as_ref() else {
            return ValidSession {
                status: SessionStatus::Anonymous,
                bearer: current_bearer(&state),
            };
        };

        if let Some(tokens) = state.tokens.as_ref() {
            if is_token_valid(&tokens.access_token) {
                return ValidSession {
                    status: SessionStatus::Valid,
                    bearer: Some(tokens.access_token.clone()),
                };
            }
        }

        let refresh_token = state
            .tokens
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .filter(|rt| is_token_valid(rt));
        if let Some(refresh_token) = refresh_token {
            match self.client.refresh(&refresh_token).await {
                Ok(fresh) => {
                    info!("R2R access token refreshed");
                    state.tokens = Some(TokenPair {
                        access_token: fresh.access_token,
                        refresh_token: fresh.refresh_token.or(Some(refresh_token)),
                    });
                    return ValidSession {
                        status: SessionStatus::Refreshed,
                        bearer: current_bearer(&state),
                    };
                }
                Err(e) => warn!("R2R token refresh failed, falling back to login: {e}"),
            }
        }

        let status = match self.client.login(&creds.username, &creds.password).await {
            Ok(tokens) => {
                info!("R2R re-login successful");
                state.tokens = Some(tokens);
                SessionStatus::LoggedIn
            }
            Err(e) => {
                error!("R2R login check failed: {e}");
                SessionStatus::LoginFailed(e.to_string())
            }
        };
        ValidSession {
            status,
            bearer: current_bearer(&state),
        }
    }

    async fn initialize(&self, state: &mut SessionState) -> SessionStatus {
        state.initialized = true;
        let Some(creds) = self.credentials.as_ref() else {
            info!("R2R credentials not configured, running unauthenticated");
            return SessionStatus::Initialized;
        };
        info!("R2R username: {}", creds.username);
        match self.client.login(&creds.username, &creds.password).await {
            Ok(tokens) => {
                info!("R2R login successful");
                state.tokens = Some(tokens);
                SessionStatus::Initialized
            }
            Err(e) => {
                error!("R2R login failed: {e}");
                SessionStatus::LoginFailed(e.to_string())
            }
        }
    }
}

fn current_bearer(state: &SessionState) -> Option<String> {
    state.tokens.as_ref().map(|t| t.access_token.clone())
}
