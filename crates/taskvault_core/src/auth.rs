//! Bearer-token boundary.
//!
//! Token issuance and refresh live outside the core. The core only reads the
//! current token and asks for it to be dropped when the server rejects it.

use parking_lot::RwLock;

/// Supplies the current bearer token.
pub trait Credentials: Send + Sync {
    /// Returns the token to attach, or `None` when logged out.
    fn bearer_token(&self) -> Option<String>;

    /// Forgets the current token. Called on forced logout.
    fn clear(&self);

    fn has_token(&self) -> bool {
        self.bearer_token().is_some()
    }
}

/// In-process token holder.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    /// Creates a holder; blank tokens are treated as absent.
    pub fn new(token: Option<String>) -> Self {
        let holder = Self::default();
        holder.set(token);
        holder
    }

    pub fn set(&self, token: Option<String>) {
        let normalized = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        *self.token.write() = normalized;
    }
}

impl Credentials for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn clear(&self) {
        *self.token.write() = None;
    }
}
