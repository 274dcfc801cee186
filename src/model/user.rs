use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

text_enum! {
    /// Access level of a [`User`].
    #[derive(Default)]
    pub enum UserRole {
        Superadmin => "superadmin",
        Admin => "admin",
        Supervisor => "supervisor",
        #[default]
        Staff => "staff",
    }
}

impl UserRole {
    pub fn is_superadmin(&self) -> bool {
        matches!(self, UserRole::Superadmin)
    }
}

text_enum! {
    /// Whether a [`User`] may log in.
    #[derive(Default)]
    pub enum UserStatus {
        #[default]
        Active => "active",
        Inactive => "inactive",
    }
}

/// Staff account.
///
/// `branch` is owned by the membership service: repositories never write it
/// through [`crate::repository::UserRepository::update`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub branch: Option<Id>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new unassigned, active [`User`].
    pub fn new(
        name: impl Into<String>,
        email: &str,
        password_hash: impl Into<String>,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Id::new_v4(),
            name: name.into(),
            email: normalize_email(email),
            password: password_hash.into(),
            phone: None,
            role,
            status: UserStatus::Active,
            branch: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update `phone` of [`User`].
    pub fn with_phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone;
        self
    }

    /// Update `status` of [`User`].
    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Emails are compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_text() {
        assert_eq!("supervisor".parse::<UserRole>(), Ok(UserRole::Supervisor));
        assert!("root".parse::<UserRole>().is_err());
        assert_eq!(UserRole::default(), UserRole::Staff);
        assert_eq!(
            serde_json::to_string(&UserRole::Superadmin).unwrap(),
            r#""superadmin""#
        );
    }

    #[test]
    fn test_user_password_is_never_serialized() {
        let user = User::new("Ada", "  Ada@Example.COM ", "$argon2id$", UserRole::Admin);
        assert_eq!(user.email, "ada@example.com");

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "admin");
        assert_eq!(json["status"], "active");
        assert!(json["branch"].is_null());
    }
}
