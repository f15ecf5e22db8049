//! Cached user-profile summary.

use serde::{Deserialize, Serialize};

const FALLBACK_DISPLAY_NAME: &str = "User";

/// Profile fields returned by `GET user/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    /// Resolves the greeting name: full name, then username, then first name.
    pub fn display_name(&self) -> &str {
        [
            self.full_name.as_deref(),
            Some(self.username.as_str()),
            self.first_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME)
    }
}
