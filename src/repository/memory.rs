//! Process memory adapter.
//!
//! Collections are vectors in insertion order, so "newest first" is a
//! reverse scan. Every call takes the single lock once, which keeps each
//! operation atomic like a single-document database write.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    BranchRepository, LeadFilter, LeadRepository, LoginHistoryRepository,
    NotificationRepository, RoleRepository, SettingsRepository, UserFilter,
    UserRepository,
};
use crate::error::Result;
use crate::model::{
    Branch, Id, Lead, LeadSource, LoginHistory, Notification, Page, Role,
    User, UserRole, WebsiteSettings,
};
use crate::visibility::NotificationFilter;

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    branches: Vec<Branch>,
    leads: Vec<Lead>,
    roles: Vec<Role>,
    notifications: Vec<Notification>,
    login_history: Vec<LoginHistory>,
    settings: Option<WebsiteSettings>,
}

/// In-memory store implementing every repository.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Newest first page of `items` matching `predicate`.
fn newest_page<T: Clone>(
    items: &[T],
    predicate: impl Fn(&T) -> bool,
    page: Page,
) -> (Vec<T>, u64) {
    let matching: Vec<T> =
        items.iter().rev().filter(|i| predicate(i)).cloned().collect();
    let total = matching.len() as u64;
    (page.slice(&matching), total)
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: &User) -> Result<()> {
        let mut db = self.lock();
        if db.users.iter().any(|u| u.email == user.email) {
            return Err(crate::ServerError::bad_request(
                "A user with this email already exists.",
            ));
        }
        db.users.push(user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_many(&self, ids: &[Id]) -> Result<Vec<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &UserFilter, page: Page) -> Result<(Vec<User>, u64)> {
        Ok(newest_page(&self.lock().users, |u| filter.matches(u), page))
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut db = self.lock();
        if db.users.iter().any(|u| u.id != user.id && u.email == user.email) {
            return Err(crate::ServerError::bad_request(
                "A user with this email already exists.",
            ));
        }
        if let Some(stored) = db.users.iter_mut().find(|u| u.id == user.id) {
            let branch = stored.branch;
            *stored = User {
                branch,
                updated_at: Utc::now(),
                ..user.clone()
            };
        }
        Ok(())
    }

    async fn delete(&self, id: Id) -> Result<bool> {
        let mut db = self.lock();
        let before = db.users.len();
        db.users.retain(|u| u.id != id);
        Ok(db.users.len() != before)
    }

    async fn claim_branch(&self, user: Id, branch: Id) -> Result<bool> {
        let mut db = self.lock();
        match db.users.iter_mut().find(|u| u.id == user) {
            Some(u) if u.branch.is_none_or(|b| b == branch) => {
                u.branch = Some(branch);
                u.updated_at = Utc::now();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn set_branch(&self, user: Id, branch: Option<Id>) -> Result<()> {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.id == user) {
            u.branch = branch;
            u.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn touch_login(&self, user: Id, at: DateTime<Utc>) -> Result<()> {
        if let Some(u) = self.lock().users.iter_mut().find(|u| u.id == user) {
            u.last_login = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl BranchRepository for MemoryStore {
    async fn insert(&self, branch: &Branch) -> Result<()> {
        let mut db = self.lock();
        if branch.email.is_some()
            && db.branches.iter().any(|b| b.email == branch.email)
        {
            return Err(crate::ServerError::bad_request(
                "A branch with this email already exists.",
            ));
        }
        db.branches.push(branch.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Branch>> {
        Ok(self.lock().branches.iter().find(|b| b.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Branch>> {
        Ok(self
            .lock()
            .branches
            .iter()
            .find(|b| b.email.as_deref() == Some(email))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Branch>> {
        let mut branches = self.lock().branches.clone();
        branches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(branches)
    }

    async fn update(&self, branch: &Branch) -> Result<()> {
        let mut db = self.lock();
        if branch.email.is_some()
            && db
                .branches
                .iter()
                .any(|b| b.id != branch.id && b.email == branch.email)
        {
            return Err(crate::ServerError::bad_request(
                "A branch with this email already exists.",
            ));
        }
        if let Some(stored) = db.branches.iter_mut().find(|b| b.id == branch.id) {
            let assigned_users = std::mem::take(&mut stored.assigned_users);
            *stored = Branch {
                assigned_users,
                updated_at: Utc::now(),
                ..branch.clone()
            };
        }
        Ok(())
    }

    async fn delete(&self, id: Id) -> Result<bool> {
        let mut db = self.lock();
        let before = db.branches.len();
        db.branches.retain(|b| b.id != id);
        Ok(db.branches.len() != before)
    }

    async fn add_member(&self, branch: Id, user: Id) -> Result<()> {
        if let Some(b) = self.lock().branches.iter_mut().find(|b| b.id == branch) {
            if !b.assigned_users.contains(&user) {
                b.assigned_users.push(user);
            }
        }
        Ok(())
    }

    async fn remove_member(&self, branch: Id, user: Id) -> Result<()> {
        if let Some(b) = self.lock().branches.iter_mut().find(|b| b.id == branch) {
            b.assigned_users.retain(|u| *u != user);
        }
        Ok(())
    }
}

#[async_trait]
impl LeadRepository for MemoryStore {
    async fn insert(&self, lead: &Lead) -> Result<()> {
        self.lock().leads.push(lead.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Lead>> {
        Ok(self.lock().leads.iter().find(|l| l.id == id).cloned())
    }

    async fn list(&self, filter: &LeadFilter, page: Page) -> Result<(Vec<Lead>, u64)> {
        Ok(newest_page(&self.lock().leads, |l| filter.matches(l), page))
    }

    async fn update(&self, lead: &Lead) -> Result<()> {
        if let Some(stored) = self.lock().leads.iter_mut().find(|l| l.id == lead.id) {
            *stored = Lead {
                updated_at: Utc::now(),
                ..lead.clone()
            };
        }
        Ok(())
    }

    async fn delete(&self, id: Id) -> Result<bool> {
        let mut db = self.lock();
        let before = db.leads.len();
        db.leads.retain(|l| l.id != id);
        Ok(db.leads.len() != before)
    }

    async fn find_recent_duplicate(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        source: LeadSource,
        since: DateTime<Utc>,
    ) -> Result<Option<Lead>> {
        Ok(self
            .lock()
            .leads
            .iter()
            .rev()
            .find(|l| {
                l.source == source
                    && l.created_at >= since
                    && shares_contact(l, email, phone)
            })
            .cloned())
    }

    async fn contact_exists(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<bool> {
        Ok(self
            .lock()
            .leads
            .iter()
            .any(|l| shares_contact(l, email, phone)))
    }
}

fn shares_contact(lead: &Lead, email: Option<&str>, phone: Option<&str>) -> bool {
    (email.is_some() && lead.email.as_deref() == email)
        || (phone.is_some() && lead.phone.as_deref() == phone)
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<Role>> {
        let mut roles = self.lock().roles.clone();
        roles.sort_by_key(|r| r.name);
        Ok(roles)
    }

    async fn find(&self, name: UserRole) -> Result<Option<Role>> {
        Ok(self.lock().roles.iter().find(|r| r.name == name).cloned())
    }

    async fn upsert(&self, role: &Role) -> Result<()> {
        let mut db = self.lock();
        match db.roles.iter_mut().find(|r| r.name == role.name) {
            Some(stored) => *stored = role.clone(),
            None => db.roles.push(role.clone()),
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.lock().notifications.push(notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Notification>> {
        Ok(self.lock().notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn list(
        &self,
        filter: &NotificationFilter,
        page: Page,
    ) -> Result<(Vec<Notification>, u64)> {
        Ok(newest_page(
            &self.lock().notifications,
            |n| filter.matches(n),
            page,
        ))
    }

    async fn count(&self, filter: &NotificationFilter) -> Result<u64> {
        Ok(self
            .lock()
            .notifications
            .iter()
            .filter(|n| filter.matches(n))
            .count() as u64)
    }

    async fn mark_read(&self, id: Id, reader: Id, at: DateTime<Utc>) -> Result<bool> {
        match self
            .lock()
            .notifications
            .iter_mut()
            .find(|n| n.id == id && !n.is_read)
        {
            Some(n) => {
                n.is_read = true;
                n.read_by = Some(reader);
                n.read_at = Some(at);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn mark_all_read(
        &self,
        filter: &NotificationFilter,
        reader: Id,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut count = 0;
        for n in self
            .lock()
            .notifications
            .iter_mut()
            .filter(|n| !n.is_read && filter.matches(n))
        {
            n.is_read = true;
            n.read_by = Some(reader);
            n.read_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn delete_matching(&self, filter: &NotificationFilter) -> Result<u64> {
        let mut db = self.lock();
        let before = db.notifications.len();
        db.notifications.retain(|n| !filter.matches(n));
        Ok((before - db.notifications.len()) as u64)
    }
}

#[async_trait]
impl LoginHistoryRepository for MemoryStore {
    async fn insert(&self, entry: &LoginHistory) -> Result<()> {
        self.lock().login_history.push(entry.clone());
        Ok(())
    }

    async fn list(
        &self,
        user: Option<Id>,
        page: Page,
    ) -> Result<(Vec<LoginHistory>, u64)> {
        Ok(newest_page(
            &self.lock().login_history,
            |h| user.is_none_or(|u| h.user == Some(u)),
            page,
        ))
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get(&self) -> Result<Option<WebsiteSettings>> {
        Ok(self.lock().settings.clone())
    }

    async fn get_or_insert(&self, default: WebsiteSettings) -> Result<WebsiteSettings> {
        Ok(self.lock().settings.get_or_insert(default).clone())
    }

    async fn save(&self, settings: &WebsiteSettings) -> Result<()> {
        self.lock().settings = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewNotification;

    #[tokio::test]
    async fn test_claim_branch_is_conditional() {
        let store = MemoryStore::default();
        let user = User::new("Ada", "ada@example.com", "", UserRole::Staff);
        UserRepository::insert(&store, &user).await.unwrap();

        let (a, b) = (Id::new_v4(), Id::new_v4());
        assert!(store.claim_branch(user.id, a).await.unwrap());
        assert!(store.claim_branch(user.id, a).await.unwrap());
        assert!(!store.claim_branch(user.id, b).await.unwrap());
        assert!(!store.claim_branch(Id::new_v4(), a).await.unwrap());

        let stored = UserRepository::find_by_id(&store, user.id).await.unwrap().unwrap();
        assert_eq!(stored.branch, Some(a));
    }

    #[tokio::test]
    async fn test_update_keeps_branch() {
        let store = MemoryStore::default();
        let mut user = User::new("Ada", "ada@example.com", "", UserRole::Staff);
        UserRepository::insert(&store, &user).await.unwrap();
        let branch = Id::new_v4();
        store.set_branch(user.id, Some(branch)).await.unwrap();

        user.name = "Ada L.".into();
        user.branch = None;
        UserRepository::update(&store, &user).await.unwrap();

        let stored = UserRepository::find_by_id(&store, user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ada L.");
        assert_eq!(stored.branch, Some(branch));
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryStore::default();
        let user = User::new("Ada", "ada@example.com", "", UserRole::Staff);
        UserRepository::insert(&store, &user).await.unwrap();

        let twin = User::new("Other", "ADA@example.com", "", UserRole::Staff);
        assert!(UserRepository::insert(&store, &twin).await.is_err());
    }

    #[tokio::test]
    async fn test_notifications_newest_first() {
        let store = MemoryStore::default();
        for i in 0..3 {
            let n = NewNotification::new(format!("n{i}"), "").build();
            NotificationRepository::insert(&store, &n).await.unwrap();
        }

        let (items, total) = NotificationRepository::list(
            &store,
            &NotificationFilter::default(),
            Page::new(Some(1), Some(2)),
        )
        .await
        .unwrap();

        assert_eq!(total, 3);
        assert_eq!(
            items.iter().map(|n| n.title.as_str()).collect::<Vec<_>>(),
            vec!["n2", "n1"]
        );
    }

    #[tokio::test]
    async fn test_mark_read_only_once() {
        let store = MemoryStore::default();
        let n = NewNotification::new("Hi", "").build();
        NotificationRepository::insert(&store, &n).await.unwrap();

        let (reader, first, second) = (Id::new_v4(), Utc::now(), Utc::now());
        assert!(store.mark_read(n.id, reader, first).await.unwrap());
        assert!(!store.mark_read(n.id, Id::new_v4(), second).await.unwrap());

        let stored = NotificationRepository::find_by_id(&store, n.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.read_by, Some(reader));
        assert_eq!(stored.read_at, Some(first));
    }
}
