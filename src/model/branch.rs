use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// Office grouping users and leads.
///
/// `assigned_users` mirrors every [`super::User::branch`] pointing here; only
/// the membership service mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: Id,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: Option<String>,
    pub assigned_users: Vec<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    /// Create a new [`Branch`] without members.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Id::new_v4(),
            name: name.into(),
            address: address.into(),
            phone: phone.into(),
            email: None,
            assigned_users: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update `email` of [`Branch`].
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email.map(|e| super::normalize_email(&e));
        self
    }

    pub fn has_member(&self, user: Id) -> bool {
        self.assigned_users.contains(&user)
    }
}
