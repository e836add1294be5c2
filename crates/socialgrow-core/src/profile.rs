//! User profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileRole {
    /// Paying customer.
    #[default]
    Customer,
    /// Administrator.
    Admin,
    /// Affiliate partner.
    Affiliate,
}

/// Profile row keyed by the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// User id.
    pub id: UserId,
    /// Login email.
    pub email: String,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Payment processor customer id.
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    /// Role.
    #[serde(default)]
    pub role: ProfileRole,
    /// Whether the account is enabled.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// When the row was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Profile {
    /// A new customer profile.
    #[must_use]
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: None,
            last_name: None,
            stripe_customer_id: None,
            role: ProfileRole::Customer,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Builder-style name setter.
    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// `"first last"`, trimmed, or `None` when both are blank.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let full = full.trim();
        (!full.is_empty()).then(|| full.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_trims_missing_parts() {
        let profile = Profile::new("u1".parse().unwrap(), "a@example.com");
        assert_eq!(profile.display_name(), None);

        let mut named = profile.clone().with_name("Ada", "");
        assert_eq!(named.display_name().as_deref(), Some("Ada"));
        named.last_name = Some("Lovelace".into());
        assert_eq!(named.display_name().as_deref(), Some("Ada Lovelace"));
    }
}
