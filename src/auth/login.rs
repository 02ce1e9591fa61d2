use std::sync::Arc;

use reqwest::header::SET_COOKIE;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::session::{AuthSession, Credential};
use crate::config::ClientConfig;
use crate::error::{truncate_body, KvmError, Result};

/// Local login endpoint on the native API
pub const LOGIN_PATH: &str = "/auth/login-local";

#[derive(Serialize)]
struct LoginRequest<'a> {
    password: &'a str,
}

/// Performs local login and keeps the [`AuthSession`] populated
pub struct Authenticator {
    http: reqwest::Client,
    login_url: String,
    password: Option<String>,
    session: Arc<AuthSession>,
}

impl Authenticator {
    pub fn new(config: &ClientConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            login_url: format!("{}{}", config.native_base_url(), LOGIN_PATH),
            password: config.password.clone().filter(|p| !p.is_empty()),
            session: Arc::new(AuthSession::new()),
        }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Cookie header for authenticated requests
    pub fn cookie_header(&self) -> Option<String> {
        self.session.cookie_header()
    }

    /// Clear the authenticated flag after an authorization failure
    pub fn invalidate(&self) {
        if self.session.is_authenticated() {
            debug!("Invalidating JetKVM auth session");
        }
        self.session.invalidate();
    }

    /// Log in unless the session is already authenticated
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.session.is_authenticated() {
            return Ok(());
        }
        self.authenticate().await
    }

    /// Post the configured password to the local-login endpoint
    pub async fn authenticate(&self) -> Result<()> {
        let password = self.password.as_deref().ok_or_else(|| {
            KvmError::AuthUnavailable("no password configured".to_string())
        })?;

        debug!("JetKVM login: POST {}", self.login_url);
        let resp = self
            .http
            .post(&self.login_url)
            .json(&LoginRequest { password })
            .send()
            .await
            .map_err(|e| {
                self.session.invalidate();
                KvmError::from_reqwest("login request failed", e)
            })?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.session.invalidate();
            warn!("JetKVM login rejected ({})", status);
            return Err(KvmError::Unauthorized(format!(
                "login rejected with HTTP {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            self.session.invalidate();
            let body = resp.text().await.unwrap_or_default();
            return Err(KvmError::ProtocolFailure(format!(
                "login returned HTTP {}: {}",
                status.as_u16(),
                truncate_body(&body, 200)
            )));
        }

        let credential = Credential::from_set_cookie(
            resp.headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        if credential.is_empty() {
            debug!("JetKVM login succeeded without a session cookie");
        }
        self.session.establish(credential);
        info!("Authenticated with JetKVM at {}", self.login_url);
        Ok(())
    }
}
