use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};

/// Credential obtained from a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Value for the `Cookie` request header (may be empty)
    pub cookie_header: String,
    pub obtained_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from the `Set-Cookie` values of a login response.
    ///
    /// Only the `name=value` part of each cookie is kept; attributes such as
    /// `Domain` or `Path` are ignored, so cookies set by a bare-IP host are
    /// accepted as-is.
    pub fn from_set_cookie<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let pairs: Vec<&str> = values
            .into_iter()
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .filter(|pair| pair.contains('=') && !pair.starts_with('='))
            .collect();

        Self {
            cookie_header: pairs.join("; "),
            obtained_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookie_header.is_empty()
    }
}

/// Authenticated session state for the native API
///
/// The credential is swapped atomically on re-authentication, so readers see
/// either the old or the new credential, never a mix. The flag is a plain
/// atomic: concurrent invalidations race harmlessly (last writer wins) and a
/// stale read costs at most one extra login.
#[derive(Debug, Default)]
pub struct AuthSession {
    credential: ArcSwapOption<Credential>,
    authenticated: AtomicBool,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Replace the credential and mark the session authenticated
    pub fn establish(&self, credential: Credential) {
        self.credential.store(Some(Arc::new(credential)));
        self.authenticated.store(true, Ordering::Release);
    }

    /// Clear the authenticated flag; the next use re-authenticates
    pub fn invalidate(&self) {
        self.authenticated.store(false, Ordering::Release);
    }

    /// Current credential, if a login ever succeeded
    pub fn credential(&self) -> Option<Arc<Credential>> {
        self.credential.load_full()
    }

    /// `Cookie` header value to attach to a request, if any
    pub fn cookie_header(&self) -> Option<String> {
        self.credential
            .load()
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| c.cookie_header.clone())
    }
}
