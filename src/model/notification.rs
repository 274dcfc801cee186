use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Id, UserRole};

text_enum! {
    /// Severity shown by the dashboard.
    #[derive(Default)]
    pub enum NotificationKind {
        #[default]
        Info => "info",
        Success => "success",
        Warning => "warning",
        Error => "error",
    }
}

/// Message addressed to a user, a role, a branch, any mix of them, or
/// everyone when no target is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Id,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub user: Option<Id>,
    pub role: Option<UserRole>,
    pub branch: Option<Id>,
    pub created_by: Option<Id>,
    pub is_read: bool,
    pub read_by: Option<Id>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// No target at all: visible to every principal.
    pub fn is_global(&self) -> bool {
        self.user.is_none() && self.role.is_none() && self.branch.is_none()
    }
}

/// Notification about to be stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub user: Option<Id>,
    pub role: Option<UserRole>,
    pub branch: Option<Id>,
    pub created_by: Option<Id>,
}

impl NewNotification {
    /// Create a new global [`NewNotification`].
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn kind(mut self, kind: NotificationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_user(mut self, user: Id) -> Self {
        self.user = Some(user);
        self
    }

    pub fn for_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn for_branch(mut self, branch: Id) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn created_by(mut self, actor: Option<Id>) -> Self {
        self.created_by = actor;
        self
    }

    /// Build the unread [`Notification`].
    pub fn build(self) -> Notification {
        Notification {
            id: Id::new_v4(),
            title: self.title,
            message: self.message,
            kind: self.kind,
            user: self.user,
            role: self.role,
            branch: self.branch,
            created_by: self.created_by,
            is_read: false,
            read_by: None,
            read_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_targets() {
        let global = NewNotification::new("Maintenance", "Tonight.").build();
        assert!(global.is_global());
        assert!(!global.is_read);

        let targeted = NewNotification::new("Hello", "World")
            .for_role(UserRole::Admin)
            .kind(NotificationKind::Warning)
            .build();
        assert!(!targeted.is_global());

        let json = serde_json::to_value(&targeted).unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["role"], "admin");
        assert_eq!(json["isRead"], false);
    }
}
