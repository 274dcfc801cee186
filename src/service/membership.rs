//! Branch membership.
//!
//! `User.branch` and `Branch.assigned_users` describe the same relation from
//! both sides. Every write to either side goes through [`MembershipService`].
//!
//! A user is claimed with a conditional write, so two requests racing to put
//! the same user in two branches cannot both succeed. Moving members during
//! a branch deletion is a sequence of independent writes: each step is
//! idempotent, the branch is only deleted once every member moved, and a
//! failed deletion can simply be retried.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::notification::{Event, NotificationPublisher};
use crate::error::{Result, ServerError};
use crate::model::{Branch, Id, Page, User};
use crate::repository::{BranchRepository, Storage, UserFilter, UserRepository};

pub const ALREADY_ASSIGNED: &str = "User is already assigned to another branch.";

/// Result of a branch deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deletion {
    pub moved: Vec<Id>,
    pub target: Option<Id>,
}

#[derive(Clone)]
pub struct MembershipService {
    users: Arc<dyn UserRepository>,
    branches: Arc<dyn BranchRepository>,
    publisher: NotificationPublisher,
}

impl MembershipService {
    pub fn new(storage: &Storage, publisher: NotificationPublisher) -> Self {
        Self {
            users: Arc::clone(&storage.users),
            branches: Arc::clone(&storage.branches),
            publisher,
        }
    }

    async fn branch(&self, id: Id) -> Result<Branch> {
        self.branches
            .find_by_id(id)
            .await?
            .ok_or(ServerError::not_found("branch"))
    }

    /// Check that `user` (`None` while creating it) may join `branch`.
    pub async fn check_assignment(&self, user: Option<&User>, branch: Id) -> Result<Branch> {
        let target = self.branch(branch).await?;

        if user.and_then(|u| u.branch).is_some_and(|current| current != branch) {
            return Err(ServerError::bad_request(ALREADY_ASSIGNED));
        }

        Ok(target)
    }

    /// Point `user` to `branch`, or release it when `branch` is `None`.
    pub async fn assign_user(
        &self,
        user: &User,
        branch: Option<Id>,
        actor: Option<Id>,
    ) -> Result<()> {
        let Some(branch) = branch else {
            return self.release_user(user).await;
        };

        let target = self.check_assignment(Some(user), branch).await?;
        self.claim(user.id, &target, actor).await
    }

    async fn claim(&self, user: Id, branch: &Branch, actor: Option<Id>) -> Result<()> {
        if !self.users.claim_branch(user, branch.id).await? {
            return Err(ServerError::bad_request(ALREADY_ASSIGNED));
        }
        self.branches.add_member(branch.id, user).await?;

        if !branch.has_member(user) {
            self.publisher
                .publish(
                    Event::UserAssigned {
                        user,
                        branch_name: branch.name.clone(),
                    },
                    actor,
                )
                .await;
        }

        Ok(())
    }

    /// Detach `user` from its branch, if any.
    pub async fn release_user(&self, user: &User) -> Result<()> {
        if let Some(branch) = user.branch {
            self.branches.remove_member(branch, user.id).await?;
            self.users.set_branch(user.id, None).await?;
        }

        Ok(())
    }

    /// Check every id of `members` before any write.
    ///
    /// Returns the deduplicated list in request order.
    pub async fn check_members(&self, branch: Id, members: &[Id]) -> Result<Vec<Id>> {
        let mut seen = BTreeSet::new();
        let members: Vec<Id> = members.iter().copied().filter(|id| seen.insert(*id)).collect();

        let users = self.users.find_many(&members).await?;
        if users.len() != members.len() {
            return Err(ServerError::not_found("user"));
        }

        if let Some(user) = users
            .iter()
            .find(|u| u.branch.is_some_and(|current| current != branch))
        {
            return Err(ServerError::bad_request(format!(
                "User {} is already assigned to another branch.",
                user.name
            )));
        }

        Ok(members)
    }

    /// Replace the member list of `branch` wholesale.
    pub async fn replace_members(
        &self,
        branch: &Branch,
        members: &[Id],
        actor: Option<Id>,
    ) -> Result<()> {
        let members = self.check_members(branch.id, members).await?;

        let removed: Vec<Id> = branch
            .assigned_users
            .iter()
            .copied()
            .filter(|id| !members.contains(id))
            .collect();
        for user in self.users.find_many(&removed).await? {
            if user.branch == Some(branch.id) {
                self.users.set_branch(user.id, None).await?;
            }
        }
        for id in &removed {
            self.branches.remove_member(branch.id, *id).await?;
        }

        for id in members {
            self.claim(id, branch, actor).await?;
        }

        Ok(())
    }

    /// Delete `id`, moving its members to `target` first.
    ///
    /// Refused while the branch has members and no distinct, existing
    /// target is given. When a move fails the error is returned and the
    /// branch is kept; users already moved stay moved.
    pub async fn delete_branch(
        &self,
        id: Id,
        target: Option<Id>,
        actor: Option<Id>,
    ) -> Result<Deletion> {
        let branch = self.branch(id).await?;
        let members = self.members_of(&branch).await?;

        let target = if members.is_empty() {
            None
        } else {
            let Some(target) = target else {
                return Err(ServerError::bad_request(
                    "Branch has assigned users, provide targetBranchId to move them.",
                ));
            };
            if target == id {
                return Err(ServerError::bad_request(
                    "Target branch must be different from the deleted branch.",
                ));
            }
            Some(self.branch(target).await?)
        };

        let mut moved = Vec::with_capacity(members.len());
        if let Some(target) = &target {
            for user in &members {
                if let Err(err) = self.move_member(user, &branch, target).await {
                    tracing::error!(
                        error = %err,
                        branch = %branch.id,
                        user = %user.id,
                        moved = moved.len(),
                        remaining = members.len() - moved.len(),
                        "branch deletion interrupted while moving members"
                    );
                    return Err(err);
                }
                moved.push(user.id);

                self.publisher
                    .publish(
                        Event::UserReassigned {
                            user: user.id,
                            from: branch.name.clone(),
                            to: target.name.clone(),
                        },
                        actor,
                    )
                    .await;
            }
        }

        if !self.branches.delete(id).await? {
            return Err(ServerError::not_found("branch"));
        }

        self.publisher
            .publish(
                Event::BranchDeleted {
                    name: branch.name.clone(),
                    target: target.as_ref().map(|t| t.name.clone()),
                    moved: moved.len(),
                },
                actor,
            )
            .await;

        Ok(Deletion {
            moved,
            target: target.map(|t| t.id),
        })
    }

    /// Users listed by the branch plus users pointing to it.
    ///
    /// Listed users pointing to another branch belong there and are left
    /// out.
    async fn members_of(&self, branch: &Branch) -> Result<Vec<User>> {
        let (mut members, stale): (Vec<User>, Vec<User>) = self
            .users
            .find_many(&branch.assigned_users)
            .await?
            .into_iter()
            .partition(|u| u.branch.is_none_or(|current| current == branch.id));
        for user in stale {
            tracing::warn!(
                branch = %branch.id,
                user = %user.id,
                "ignoring stale member listed by another branch"
            );
        }

        let filter = UserFilter {
            branch: Some(branch.id),
            ..Default::default()
        };
        let (pointing, _) = self.users.list(&filter, Page::all()).await?;
        for user in pointing {
            if !members.iter().any(|m| m.id == user.id) {
                members.push(user);
            }
        }

        Ok(members)
    }

    /// Remove a branch whose creation could not complete, releasing the
    /// users it already claimed.
    pub async fn discard_branch(&self, id: Id) -> Result<()> {
        let branch = self.branch(id).await?;
        for user in self.members_of(&branch).await? {
            if user.branch == Some(id) {
                self.users.set_branch(user.id, None).await?;
            }
        }
        self.branches.delete(id).await?;

        Ok(())
    }

    async fn move_member(&self, user: &User, from: &Branch, to: &Branch) -> Result<()> {
        self.users.set_branch(user.id, Some(to.id)).await?;
        self.branches.add_member(to.id, user.id).await?;
        self.branches.remove_member(from.id, user.id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::model::{Notification, UserRole};
    use crate::visibility::NotificationFilter;

    fn service(storage: &Storage) -> MembershipService {
        MembershipService::new(
            storage,
            NotificationPublisher::new(Arc::clone(&storage.notifications)),
        )
    }

    async fn branch(storage: &Storage, name: &str) -> Branch {
        let branch = Branch::new(name, "Main street", "0102030405");
        storage.branches.insert(&branch).await.unwrap();
        branch
    }

    async fn user(storage: &Storage, name: &str) -> User {
        let user = User::new(
            name,
            &format!("{}@example.com", name.to_lowercase()),
            "",
            UserRole::Staff,
        );
        storage.users.insert(&user).await.unwrap();
        user
    }

    async fn reload_user(storage: &Storage, id: Id) -> User {
        storage.users.find_by_id(id).await.unwrap().unwrap()
    }

    async fn reload_branch(storage: &Storage, id: Id) -> Branch {
        storage.branches.find_by_id(id).await.unwrap().unwrap()
    }

    /// Both sides of the relation agree for every user and branch.
    async fn assert_consistent(storage: &Storage) {
        let (users, _) = storage
            .users
            .list(&UserFilter::default(), Page::all())
            .await
            .unwrap();
        let branches = storage.branches.list().await.unwrap();

        for user in &users {
            for branch in &branches {
                assert_eq!(
                    branch.assigned_users.contains(&user.id),
                    user.branch == Some(branch.id),
                    "{} and {} disagree",
                    user.name,
                    branch.name
                );
            }
        }
    }

    async fn notifications(storage: &Storage) -> Vec<Notification> {
        storage
            .notifications
            .list(&NotificationFilter::default(), Page::all())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_assign_then_reassign_is_refused() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let b = branch(&storage, "B").await;
        let x = user(&storage, "X").await;

        service.assign_user(&x, Some(a.id), None).await.unwrap();
        assert_eq!(reload_branch(&storage, a.id).await.assigned_users, vec![x.id]);
        assert_eq!(reload_user(&storage, x.id).await.branch, Some(a.id));

        let x = reload_user(&storage, x.id).await;
        let err = service.assign_user(&x, Some(b.id), None).await.unwrap_err();
        assert_eq!(err.to_string(), ALREADY_ASSIGNED);
        assert!(reload_branch(&storage, b.id).await.assigned_users.is_empty());

        // Same branch again is accepted and does not duplicate.
        service.assign_user(&x, Some(a.id), None).await.unwrap();
        assert_eq!(reload_branch(&storage, a.id).await.assigned_users, vec![x.id]);
        assert_consistent(&storage).await;
    }

    #[tokio::test]
    async fn test_assign_to_unknown_branch() {
        let storage = Storage::memory();
        let service = service(&storage);
        let x = user(&storage, "X").await;

        assert!(matches!(
            service.assign_user(&x, Some(Id::new_v4()), None).await,
            Err(ServerError::NotFound { .. })
        ));
        assert_eq!(reload_user(&storage, x.id).await.branch, None);
    }

    #[tokio::test]
    async fn test_release_then_reassign() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let b = branch(&storage, "B").await;
        let x = user(&storage, "X").await;

        service.assign_user(&x, Some(a.id), None).await.unwrap();
        let x = reload_user(&storage, x.id).await;
        service.assign_user(&x, None, None).await.unwrap();
        assert!(reload_branch(&storage, a.id).await.assigned_users.is_empty());

        let x = reload_user(&storage, x.id).await;
        service.assign_user(&x, Some(b.id), None).await.unwrap();
        assert_eq!(reload_user(&storage, x.id).await.branch, Some(b.id));
        assert_consistent(&storage).await;
    }

    #[tokio::test]
    async fn test_concurrent_claims_only_one_wins() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let b = branch(&storage, "B").await;
        let x = user(&storage, "X").await;

        // Both requests loaded X while it was unassigned.
        let (first, second) = tokio::join!(
            service.assign_user(&x, Some(a.id), None),
            service.assign_user(&x, Some(b.id), None),
        );
        assert!(first.is_ok() != second.is_ok());
        assert_consistent(&storage).await;
    }

    #[tokio::test]
    async fn test_replace_members_diff() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let (x, y, z) = (
            user(&storage, "X").await,
            user(&storage, "Y").await,
            user(&storage, "Z").await,
        );

        service.replace_members(&a, &[x.id, y.id], None).await.unwrap();
        let a = reload_branch(&storage, a.id).await;
        assert_eq!(a.assigned_users, vec![x.id, y.id]);

        service.replace_members(&a, &[y.id, z.id, z.id], None).await.unwrap();
        let a = reload_branch(&storage, a.id).await;
        assert_eq!(a.assigned_users, vec![y.id, z.id]);
        assert_eq!(reload_user(&storage, x.id).await.branch, None);
        assert_eq!(reload_user(&storage, z.id).await.branch, Some(a.id));
        assert_consistent(&storage).await;
    }

    #[tokio::test]
    async fn test_replace_members_checks_everything_first() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let b = branch(&storage, "B").await;
        let (x, y) = (user(&storage, "X").await, user(&storage, "Y").await);
        service.assign_user(&y, Some(b.id), None).await.unwrap();

        let err = service
            .replace_members(&a, &[x.id, y.id], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User Y is already assigned to another branch.");

        let err = service
            .replace_members(&a, &[x.id, Id::new_v4()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound { .. }));

        // Nothing written for X.
        assert_eq!(reload_user(&storage, x.id).await.branch, None);
        assert!(reload_branch(&storage, a.id).await.assigned_users.is_empty());
        assert_consistent(&storage).await;
    }

    #[tokio::test]
    async fn test_delete_with_members_requires_target() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let x = user(&storage, "X").await;
        service.assign_user(&x, Some(a.id), None).await.unwrap();

        let err = service.delete_branch(a.id, None, None).await.unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
        let err = service.delete_branch(a.id, Some(a.id), None).await.unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
        let err = service
            .delete_branch(a.id, Some(Id::new_v4()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound { .. }));

        assert_eq!(reload_branch(&storage, a.id).await.assigned_users, vec![x.id]);
        assert_eq!(reload_user(&storage, x.id).await.branch, Some(a.id));
    }

    #[tokio::test]
    async fn test_delete_moves_members_and_notifies() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let t = branch(&storage, "T").await;
        let (x, y, w) = (
            user(&storage, "X").await,
            user(&storage, "Y").await,
            user(&storage, "W").await,
        );
        service.replace_members(&a, &[x.id, y.id], None).await.unwrap();
        service.assign_user(&w, Some(t.id), None).await.unwrap();
        let actor = Id::new_v4();

        let deletion = service.delete_branch(a.id, Some(t.id), Some(actor)).await.unwrap();
        assert_eq!(deletion.moved, vec![x.id, y.id]);
        assert_eq!(deletion.target, Some(t.id));

        assert!(storage.branches.find_by_id(a.id).await.unwrap().is_none());
        let t = reload_branch(&storage, t.id).await;
        assert!(t.has_member(w.id) && t.has_member(x.id) && t.has_member(y.id));
        assert_eq!(reload_user(&storage, x.id).await.branch, Some(t.id));
        assert_eq!(reload_user(&storage, y.id).await.branch, Some(t.id));
        assert_consistent(&storage).await;

        let notifications = notifications(&storage).await;
        let reassigned: Vec<_> = notifications
            .iter()
            .filter(|n| n.title == "Branch reassignment")
            .collect();
        assert_eq!(reassigned.len(), 2);
        assert!(reassigned.iter().all(|n| n.role.is_none() && n.created_by == Some(actor)));
        let summary: Vec<_> = notifications
            .iter()
            .filter(|n| n.title == "Branch deleted")
            .collect();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].role, Some(UserRole::Superadmin));
    }

    #[tokio::test]
    async fn test_delete_empty_branch_ignores_target() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;

        let deletion = service.delete_branch(a.id, None, None).await.unwrap();
        assert!(deletion.moved.is_empty());
        assert!(storage.branches.find_by_id(a.id).await.unwrap().is_none());
    }

    /// Fails `set_branch` once `budget` calls went through, and loses the
    /// claim on `contested` to another branch.
    struct Flaky {
        inner: Arc<dyn UserRepository>,
        budget: AtomicUsize,
        contested: Option<Id>,
    }

    #[async_trait]
    impl UserRepository for Flaky {
        async fn insert(&self, user: &User) -> Result<()> {
            self.inner.insert(user).await
        }
        async fn find_by_id(&self, id: Id) -> Result<Option<User>> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
            self.inner.find_by_email(email).await
        }
        async fn find_many(&self, ids: &[Id]) -> Result<Vec<User>> {
            self.inner.find_many(ids).await
        }
        async fn list(&self, filter: &UserFilter, page: Page) -> Result<(Vec<User>, u64)> {
            self.inner.list(filter, page).await
        }
        async fn update(&self, user: &User) -> Result<()> {
            self.inner.update(user).await
        }
        async fn delete(&self, id: Id) -> Result<bool> {
            self.inner.delete(id).await
        }
        async fn claim_branch(&self, user: Id, branch: Id) -> Result<bool> {
            if self.contested == Some(user) {
                return Ok(false);
            }
            self.inner.claim_branch(user, branch).await
        }
        async fn set_branch(&self, user: Id, branch: Option<Id>) -> Result<()> {
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(ServerError::internal(
                    "user store unavailable",
                    std::io::Error::other("connection reset"),
                ));
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            self.inner.set_branch(user, branch).await
        }
        async fn touch_login(&self, user: Id, at: DateTime<Utc>) -> Result<()> {
            self.inner.touch_login(user, at).await
        }
    }

    #[tokio::test]
    async fn test_interrupted_deletion_keeps_branch_and_resumes() {
        let storage = Storage::memory();
        let a = branch(&storage, "A").await;
        let t = branch(&storage, "T").await;
        let (x, y) = (user(&storage, "X").await, user(&storage, "Y").await);
        service(&storage)
            .replace_members(&a, &[x.id, y.id], None)
            .await
            .unwrap();

        let flaky = Storage {
            users: Arc::new(Flaky {
                inner: Arc::clone(&storage.users),
                budget: AtomicUsize::new(1),
                contested: None,
            }),
            ..storage.clone()
        };
        let err = service(&flaky)
            .delete_branch(a.id, Some(t.id), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Internal { .. }));

        // First member moved, second untouched, branch kept.
        let a_now = reload_branch(&storage, a.id).await;
        assert_eq!(a_now.assigned_users, vec![y.id]);
        assert_eq!(reload_user(&storage, x.id).await.branch, Some(t.id));
        assert_eq!(reload_user(&storage, y.id).await.branch, Some(a.id));
        assert_consistent(&storage).await;

        // Retry finishes the job.
        let deletion = service(&storage)
            .delete_branch(a.id, Some(t.id), None)
            .await
            .unwrap();
        assert_eq!(deletion.moved, vec![y.id]);
        assert!(storage.branches.find_by_id(a.id).await.unwrap().is_none());
        assert_eq!(
            reload_branch(&storage, t.id).await.assigned_users,
            vec![x.id, y.id]
        );
        assert_consistent(&storage).await;
    }

    #[tokio::test]
    async fn test_delete_skips_members_of_another_branch() {
        let storage = Storage::memory();
        let service = service(&storage);
        let a = branch(&storage, "A").await;
        let c = branch(&storage, "C").await;
        let t = branch(&storage, "T").await;
        let (u, x) = (user(&storage, "U").await, user(&storage, "X").await);
        service.assign_user(&u, Some(c.id), None).await.unwrap();
        service.assign_user(&x, Some(a.id), None).await.unwrap();
        // A still lists U from an older write.
        storage.branches.add_member(a.id, u.id).await.unwrap();

        let deletion = service.delete_branch(a.id, Some(t.id), None).await.unwrap();
        assert_eq!(deletion.moved, vec![x.id]);

        assert_eq!(reload_user(&storage, u.id).await.branch, Some(c.id));
        assert!(reload_branch(&storage, c.id).await.has_member(u.id));
        assert!(!reload_branch(&storage, t.id).await.has_member(u.id));
        assert_eq!(reload_user(&storage, x.id).await.branch, Some(t.id));
        assert_consistent(&storage).await;
    }

    #[tokio::test]
    async fn test_discard_releases_claimed_members() {
        let storage = Storage::memory();
        let a = branch(&storage, "A").await;
        let (x, y) = (user(&storage, "X").await, user(&storage, "Y").await);

        let contested = Storage {
            users: Arc::new(Flaky {
                inner: Arc::clone(&storage.users),
                budget: AtomicUsize::new(usize::MAX),
                contested: Some(y.id),
            }),
            ..storage.clone()
        };
        let service = service(&contested);

        let err = service
            .replace_members(&a, &[x.id, y.id], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), ALREADY_ASSIGNED);
        assert_eq!(reload_user(&storage, x.id).await.branch, Some(a.id));

        service.discard_branch(a.id).await.unwrap();
        assert!(storage.branches.find_by_id(a.id).await.unwrap().is_none());
        assert_eq!(reload_user(&storage, x.id).await.branch, None);
        assert_eq!(reload_user(&storage, y.id).await.branch, None);
        assert_consistent(&storage).await;
    }
}
