use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// Resolved position of an IP address. Fields stay empty when the lookup
/// fails.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
}

/// Append-only audit record of a login attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginHistory {
    pub id: Id,
    pub user: Option<Id>,
    pub email: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(flatten)]
    pub location: Location,
    pub created_at: DateTime<Utc>,
}

impl LoginHistory {
    /// Record a successful login of `user`.
    pub fn success(user: Id, email: impl Into<String>) -> Self {
        Self::attempt(Some(user), email, true, None)
    }

    /// Record a rejected login.
    pub fn failure(
        user: Option<Id>,
        email: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::attempt(user, email, false, Some(reason.into()))
    }

    fn attempt(
        user: Option<Id>,
        email: impl Into<String>,
        success: bool,
        failure_reason: Option<String>,
    ) -> Self {
        Self {
            id: Id::new_v4(),
            user,
            email: email.into(),
            success,
            failure_reason,
            ip: None,
            user_agent: None,
            location: Location::default(),
            created_at: Utc::now(),
        }
    }

    /// Attach request origin.
    pub fn origin(
        mut self,
        ip: Option<String>,
        user_agent: Option<String>,
        location: Location,
    ) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self.location = location;
        self
    }
}
