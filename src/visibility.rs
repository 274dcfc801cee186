//! Who sees which notification.
//!
//! A principal sees a notification when it targets the principal's id, the
//! principal's role, the principal's branch, or nobody at all (global). The
//! same rule is evaluated in memory by [`NotificationFilter::matches`] and in
//! SQL by [`NotificationFilter::push_sql`].

use sqlx::{Postgres, QueryBuilder};

use crate::model::{Id, Notification, User, UserRole};

/// Requesting identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: Id,
    pub role: UserRole,
    pub branch: Option<Id>,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
            branch: user.branch,
        }
    }
}

impl Principal {
    /// Visibility rule.
    pub fn can_see(&self, notification: &Notification) -> bool {
        notification.user == Some(self.id)
            || notification.role == Some(self.role)
            || (self.branch.is_some() && notification.branch == self.branch)
            || notification.is_global()
    }
}

/// Selection of notifications.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NotificationFilter {
    /// Restrict to what this principal can see.
    pub audience: Option<Principal>,
    /// Exact target filters, only honoured for superadmins.
    pub user: Option<Id>,
    pub role: Option<UserRole>,
    pub branch: Option<Id>,
    pub is_read: Option<bool>,
}

impl NotificationFilter {
    /// Everything `principal` can see.
    pub fn visible_to(principal: Principal) -> Self {
        Self {
            audience: Some(principal),
            ..Default::default()
        }
    }

    /// Add the read-state refinement.
    pub fn read_state(mut self, is_read: Option<bool>) -> Self {
        self.is_read = is_read;
        self
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        self.audience.is_none_or(|p| p.can_see(notification))
            && self.user.is_none_or(|u| notification.user == Some(u))
            && self.role.is_none_or(|r| notification.role == Some(r))
            && self.branch.is_none_or(|b| notification.branch == Some(b))
            && self.is_read.is_none_or(|r| notification.is_read == r)
    }

    /// Append a `WHERE` clause to `query`.
    pub fn push_sql(&self, query: &mut QueryBuilder<'_, Postgres>) {
        query.push(" WHERE TRUE");

        if let Some(principal) = self.audience {
            query
                .push(" AND (user_id = ")
                .push_bind(principal.id)
                .push(" OR role = ")
                .push_bind(principal.role.as_str());
            if let Some(branch) = principal.branch {
                query.push(" OR branch_id = ").push_bind(branch);
            }
            query.push(
                " OR (user_id IS NULL AND role IS NULL AND branch_id IS NULL))",
            );
        }
        if let Some(user) = self.user {
            query.push(" AND user_id = ").push_bind(user);
        }
        if let Some(role) = self.role {
            query.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(branch) = self.branch {
            query.push(" AND branch_id = ").push_bind(branch);
        }
        if let Some(is_read) = self.is_read {
            query.push(" AND is_read = ").push_bind(is_read);
        }
    }
}
