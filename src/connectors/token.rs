//! Per-adapter access token cache.
//!
//! Each adapter instance owns one [`TokenCache`] behind an async mutex; there
//! is no process-wide token state.

use chrono::{DateTime, Duration, Utc};

/// Tokens are treated as expired this many seconds before their nominal expiry.
pub const DEFAULT_EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    /// API host returned alongside the token, if it differs from the configured one
    pub instance_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenCache {
    token: Option<AccessToken>,
    skew: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_EXPIRY_SKEW_SECONDS))
    }
}

impl TokenCache {
    pub fn new(skew: Duration) -> Self {
        Self { token: None, skew }
    }

    /// The cached token if it is still usable at `now`.
    pub fn valid_at(&self, now: DateTime<Utc>) -> Option<&AccessToken> {
        self.token
            .as_ref()
            .filter(|token| token.expires_at - self.skew > now)
    }

    pub fn current(&self) -> Option<&AccessToken> {
        self.valid_at(Utc::now())
    }

    pub fn store(&mut self, token: AccessToken) {
        self.token = Some(token);
    }

    /// Forgets the token, e.g. after the remote side answered 401.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none()
    }
}
