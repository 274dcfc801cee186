//! Persistence ports.
//!
//! One trait per collection, implemented for PostgreSQL in [`postgres`] and
//! for process memory in [`memory`].

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::AppState;
use crate::error::Result;
use crate::model::{
    Branch, Id, Lead, LeadSource, LeadStatus, LoginHistory, Notification,
    Page, Role, User, UserRole, UserStatus, WebsiteSettings,
};
use crate::visibility::NotificationFilter;

/// Criteria of `GET /users`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub branch: Option<Id>,
    /// Only users without branch.
    pub unassigned: bool,
    /// Case-insensitive match on name, email or phone.
    pub search: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.role.is_none_or(|r| user.role == r)
            && self.status.is_none_or(|s| user.status == s)
            && self.branch.is_none_or(|b| user.branch == Some(b))
            && (!self.unassigned || user.branch.is_none())
            && self.search.as_deref().is_none_or(|term| {
                contains(&user.name, term)
                    || contains(&user.email, term)
                    || user.phone.as_deref().is_some_and(|p| contains(p, term))
            })
    }
}

/// Criteria of `GET /leads`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source: Option<LeadSource>,
    pub branch: Option<Id>,
    pub assigned_to: Option<Id>,
    /// Case-insensitive match on name, email or phone.
    pub search: Option<String>,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        self.status.is_none_or(|s| lead.status == s)
            && self.source.is_none_or(|s| lead.source == s)
            && self.branch.is_none_or(|b| lead.branch == Some(b))
            && self.assigned_to.is_none_or(|u| lead.assigned_to == Some(u))
            && self.search.as_deref().is_none_or(|term| {
                contains(&lead.name, term)
                    || lead.email.as_deref().is_some_and(|e| contains(e, term))
                    || lead.phone.as_deref().is_some_and(|p| contains(p, term))
            })
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// `%term%` pattern for `ILIKE`, with wildcards escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Port for user persistence.
///
/// `branch` is excluded from [`UserRepository::update`]: only
/// [`UserRepository::claim_branch`] and [`UserRepository::set_branch`]
/// write it, both driven by the membership service.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<()>;

    async fn find_by_id(&self, id: Id) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Users among `ids`, unknown ids are skipped.
    async fn find_many(&self, ids: &[Id]) -> Result<Vec<User>>;

    /// Newest first.
    async fn list(&self, filter: &UserFilter, page: Page) -> Result<(Vec<User>, u64)>;

    /// Persist profile fields, role, status and password.
    async fn update(&self, user: &User) -> Result<()>;

    async fn delete(&self, id: Id) -> Result<bool>;

    /// Point `user` to `branch` unless it already belongs to another branch.
    ///
    /// Returns `false` when the user is assigned elsewhere or does not exist.
    async fn claim_branch(&self, user: Id, branch: Id) -> Result<bool>;

    /// Overwrite the branch of `user`.
    async fn set_branch(&self, user: Id, branch: Option<Id>) -> Result<()>;

    async fn touch_login(&self, user: Id, at: DateTime<Utc>) -> Result<()>;
}

/// Port for branch persistence.
#[async_trait]
pub trait BranchRepository: Send + Sync {
    async fn insert(&self, branch: &Branch) -> Result<()>;

    async fn find_by_id(&self, id: Id) -> Result<Option<Branch>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Branch>>;

    /// Sorted by name.
    async fn list(&self) -> Result<Vec<Branch>>;

    /// Persist every field except `assigned_users`.
    async fn update(&self, branch: &Branch) -> Result<()>;

    async fn delete(&self, id: Id) -> Result<bool>;

    /// Add `user` to `assigned_users` when missing.
    async fn add_member(&self, branch: Id, user: Id) -> Result<()>;

    /// Remove `user` from `assigned_users`.
    async fn remove_member(&self, branch: Id, user: Id) -> Result<()>;
}

/// Port for lead persistence.
#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn insert(&self, lead: &Lead) -> Result<()>;

    async fn find_by_id(&self, id: Id) -> Result<Option<Lead>>;

    /// Newest first.
    async fn list(&self, filter: &LeadFilter, page: Page) -> Result<(Vec<Lead>, u64)>;

    async fn update(&self, lead: &Lead) -> Result<()>;

    async fn delete(&self, id: Id) -> Result<bool>;

    /// Most recent lead from `source` created after `since` sharing the
    /// email or the phone.
    async fn find_recent_duplicate(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        source: LeadSource,
        since: DateTime<Utc>,
    ) -> Result<Option<Lead>>;

    /// Whether any lead shares the email or the phone.
    async fn contact_exists(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<bool>;
}

/// Port for role permission documents.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Role>>;

    async fn find(&self, name: UserRole) -> Result<Option<Role>>;

    async fn upsert(&self, role: &Role) -> Result<()>;
}

/// Port for notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;

    async fn find_by_id(&self, id: Id) -> Result<Option<Notification>>;

    /// Newest first.
    async fn list(
        &self,
        filter: &NotificationFilter,
        page: Page,
    ) -> Result<(Vec<Notification>, u64)>;

    async fn count(&self, filter: &NotificationFilter) -> Result<u64>;

    /// Mark as read unless already read. Returns whether a write happened.
    async fn mark_read(&self, id: Id, reader: Id, at: DateTime<Utc>) -> Result<bool>;

    /// Mark every unread matching notification. Returns affected count.
    async fn mark_all_read(
        &self,
        filter: &NotificationFilter,
        reader: Id,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Returns deleted count.
    async fn delete_matching(&self, filter: &NotificationFilter) -> Result<u64>;
}

/// Port for the login audit trail.
#[async_trait]
pub trait LoginHistoryRepository: Send + Sync {
    async fn insert(&self, entry: &LoginHistory) -> Result<()>;

    /// Newest first, optionally for one user.
    async fn list(
        &self,
        user: Option<Id>,
        page: Page,
    ) -> Result<(Vec<LoginHistory>, u64)>;
}

/// Port for the website settings singleton.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self) -> Result<Option<WebsiteSettings>>;

    /// Store `default` unless a document exists, return the stored one.
    async fn get_or_insert(&self, default: WebsiteSettings) -> Result<WebsiteSettings>;

    async fn save(&self, settings: &WebsiteSettings) -> Result<()>;
}

/// Every repository, shared by handlers and services.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub branches: Arc<dyn BranchRepository>,
    pub leads: Arc<dyn LeadRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub login_history: Arc<dyn LoginHistoryRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Storage {
    /// PostgreSQL backed storage.
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self::from_store(store)
    }

    /// Memory backed storage.
    pub fn memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self::from_store(store)
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserRepository
            + BranchRepository
            + LeadRepository
            + RoleRepository
            + NotificationRepository
            + LoginHistoryRepository
            + SettingsRepository
            + 'static,
    {
        Self {
            users: store.clone(),
            branches: store.clone(),
            leads: store.clone(),
            roles: store.clone(),
            notifications: store.clone(),
            login_history: store.clone(),
            settings: store,
        }
    }
}

impl FromRef<AppState> for Storage {
    fn from_ref(state: &AppState) -> Storage {
        state.storage.clone()
    }
}
