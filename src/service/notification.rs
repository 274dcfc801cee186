//! Notification fan-out.
//!
//! [`NotificationService`] answers the per-principal queries, while
//! [`NotificationPublisher`] turns domain [`Event`]s into stored
//! notifications without ever failing the caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::error::{Result, ServerError};
use crate::model::{
    Id, NewNotification, Notification, NotificationKind, Page, Paginated,
    UserRole,
};
use crate::repository::{
    BranchRepository, NotificationRepository, Storage, UserRepository,
};
use crate::visibility::{NotificationFilter, Principal};

const RECENT_LIMIT: u64 = 10;

/// Something that happened and deserves a notification.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    UserCreated {
        name: String,
        email: String,
        role: UserRole,
    },
    UserUpdated {
        user: Id,
        name: String,
    },
    UserDeleted {
        name: String,
        email: String,
    },
    /// `user` joined `branch` through a user or branch write.
    UserAssigned {
        user: Id,
        branch_name: String,
    },
    BranchCreated {
        name: String,
    },
    BranchUpdated {
        branch: Id,
        name: String,
    },
    /// `user` was moved while its branch was deleted.
    UserReassigned {
        user: Id,
        from: String,
        to: String,
    },
    BranchDeleted {
        name: String,
        target: Option<String>,
        moved: usize,
    },
}

impl Event {
    fn into_notification(self) -> NewNotification {
        match self {
            Event::UserCreated { name, email, role } => NewNotification::new(
                "New user created",
                format!("{name} ({email}) joined as {role}."),
            )
            .kind(NotificationKind::Success)
            .for_role(UserRole::Superadmin),
            Event::UserUpdated { user, name } => NewNotification::new(
                "Profile updated",
                format!("The account of {name} was updated."),
            )
            .for_user(user),
            Event::UserDeleted { name, email } => NewNotification::new(
                "User deleted",
                format!("{name} ({email}) was removed."),
            )
            .kind(NotificationKind::Warning)
            .for_role(UserRole::Superadmin),
            Event::UserAssigned { user, branch_name } => NewNotification::new(
                "Branch assignment",
                format!("You have been assigned to {branch_name}."),
            )
            .for_user(user),
            Event::BranchCreated { name } => NewNotification::new(
                "New branch created",
                format!("Branch {name} is now available."),
            )
            .kind(NotificationKind::Success)
            .for_role(UserRole::Superadmin),
            Event::BranchUpdated { branch, name } => NewNotification::new(
                "Branch updated",
                format!("Details of branch {name} changed."),
            )
            .for_branch(branch),
            Event::UserReassigned { user, from, to } => NewNotification::new(
                "Branch reassignment",
                format!("Branch {from} was deleted, you now belong to {to}."),
            )
            .kind(NotificationKind::Warning)
            .for_user(user),
            Event::BranchDeleted {
                name,
                target,
                moved,
            } => {
                let message = match target {
                    Some(target) => format!(
                        "Branch {name} was deleted, {moved} user(s) moved to {target}."
                    ),
                    None => format!("Branch {name} was deleted."),
                };
                NewNotification::new("Branch deleted", message)
                    .kind(NotificationKind::Warning)
                    .for_role(UserRole::Superadmin)
            },
        }
    }
}

/// Fire-and-forget event sink.
#[derive(Clone)]
pub struct NotificationPublisher {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationPublisher {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// Store the notification for `event`. Failures are logged only.
    pub async fn publish(&self, event: Event, actor: Option<Id>) {
        let notification = event.into_notification().created_by(actor).build();

        if let Err(err) = self.notifications.insert(&notification).await {
            tracing::warn!(
                error = %err,
                title = %notification.title,
                "cannot publish notification"
            );
        }
    }
}

/// Query parameters of the list route.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub page: Page,
    pub user: Option<Id>,
    pub role: Option<UserRole>,
    pub branch: Option<Id>,
    pub is_read: Option<bool>,
}

/// Notification with resolved names.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub user_name: Option<String>,
    pub branch_name: Option<String>,
    pub created_by_name: Option<String>,
}

/// Latest notifications and how many are unread.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recent {
    pub notifications: Vec<NotificationView>,
    pub unread_count: u64,
}

#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
    branches: Arc<dyn BranchRepository>,
}

impl NotificationService {
    pub fn new(storage: &Storage) -> Self {
        Self {
            notifications: Arc::clone(&storage.notifications),
            users: Arc::clone(&storage.users),
            branches: Arc::clone(&storage.branches),
        }
    }

    /// Store an explicit notification after checking its targets exist.
    pub async fn create(&self, notification: NewNotification) -> Result<NotificationView> {
        if let Some(user) = notification.user {
            self.users
                .find_by_id(user)
                .await?
                .ok_or(ServerError::not_found("user"))?;
        }
        if let Some(branch) = notification.branch {
            self.branches
                .find_by_id(branch)
                .await?
                .ok_or(ServerError::not_found("branch"))?;
        }

        let notification = notification.build();
        self.notifications.insert(&notification).await?;

        self.hydrate_one(notification).await
    }

    /// Superadmins see everything and may filter explicitly, others get
    /// their visibility set refined by read state.
    pub async fn list(
        &self,
        principal: Principal,
        query: ListQuery,
    ) -> Result<Paginated<NotificationView>> {
        let filter = if principal.role.is_superadmin() {
            NotificationFilter {
                audience: None,
                user: query.user,
                role: query.role,
                branch: query.branch,
                is_read: query.is_read,
            }
        } else {
            NotificationFilter::visible_to(principal).read_state(query.is_read)
        };

        let (notifications, total) =
            self.notifications.list(&filter, query.page).await?;
        let data = self.hydrate(notifications).await?;

        Ok(Paginated::new(data, total, query.page))
    }

    pub async fn recent(&self, principal: Principal) -> Result<Recent> {
        let filter = NotificationFilter::visible_to(principal);
        let (notifications, _) = self
            .notifications
            .list(&filter, Page::new(Some(1), Some(RECENT_LIMIT)))
            .await?;
        let unread_count = self
            .notifications
            .count(&filter.read_state(Some(false)))
            .await?;

        Ok(Recent {
            notifications: self.hydrate(notifications).await?,
            unread_count,
        })
    }

    /// Mark one notification as read. A second call keeps the first
    /// reader and timestamp.
    pub async fn mark_read(&self, principal: Principal, id: Id) -> Result<NotificationView> {
        let notification = self
            .notifications
            .find_by_id(id)
            .await?
            .ok_or(ServerError::not_found("notification"))?;

        if !principal.role.is_superadmin() && !principal.can_see(&notification) {
            return Err(ServerError::Forbidden);
        }

        if !notification.is_read {
            self.notifications.mark_read(id, principal.id, Utc::now()).await?;
        }

        let notification = self
            .notifications
            .find_by_id(id)
            .await?
            .ok_or(ServerError::not_found("notification"))?;
        self.hydrate_one(notification).await
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_read(&self, principal: Principal) -> Result<u64> {
        self.notifications
            .mark_all_read(
                &NotificationFilter::visible_to(principal),
                principal.id,
                Utc::now(),
            )
            .await
    }

    /// Returns how many notifications were deleted.
    pub async fn clear_all(&self, principal: Principal) -> Result<u64> {
        self.notifications
            .delete_matching(&NotificationFilter::visible_to(principal))
            .await
    }

    async fn hydrate_one(&self, notification: Notification) -> Result<NotificationView> {
        self.hydrate(vec![notification])
            .await?
            .pop()
            .ok_or(ServerError::not_found("notification"))
    }

    async fn hydrate(&self, notifications: Vec<Notification>) -> Result<Vec<NotificationView>> {
        let mut ids: Vec<Id> = notifications
            .iter()
            .flat_map(|n| [n.user, n.created_by])
            .flatten()
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let users: HashMap<Id, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.users
                .find_many(&ids)
                .await?
                .into_iter()
                .map(|u| (u.id, u.name))
                .collect()
        };
        let branches: HashMap<Id, String> =
            if notifications.iter().any(|n| n.branch.is_some()) {
                self.branches
                    .list()
                    .await?
                    .into_iter()
                    .map(|b| (b.id, b.name))
                    .collect()
            } else {
                HashMap::new()
            };

        Ok(notifications
            .into_iter()
            .map(|notification| NotificationView {
                user_name: notification.user.and_then(|id| users.get(&id).cloned()),
                branch_name: notification
                    .branch
                    .and_then(|id| branches.get(&id).cloned()),
                created_by_name: notification
                    .created_by
                    .and_then(|id| users.get(&id).cloned()),
                notification,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Branch, User};

    struct Fixture {
        storage: Storage,
        service: NotificationService,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = Storage::memory();
            let service = NotificationService::new(&storage);
            Self { storage, service }
        }

        async fn user(&self, role: UserRole, branch: Option<Id>) -> Principal {
            let mut user = User::new(
                "Someone",
                &format!("{}@example.com", Id::new_v4()),
                "",
                role,
            );
            user.branch = branch;
            self.storage.users.insert(&user).await.unwrap();
            Principal::from(&user)
        }

        async fn notify(&self, notification: NewNotification) -> Id {
            self.service.create(notification).await.unwrap().notification.id
        }
    }

    fn ids(views: &[NotificationView]) -> Vec<Id> {
        views.iter().map(|v| v.notification.id).collect()
    }

    #[tokio::test]
    async fn test_global_notification_reaches_everyone() {
        let fixture = Fixture::new();
        let global = fixture.notify(NewNotification::new("Hello", "All")).await;

        for role in UserRole::ALL {
            let principal = fixture.user(*role, Some(Id::new_v4())).await;

            let list = fixture
                .service
                .list(principal, ListQuery::default())
                .await
                .unwrap();
            assert!(ids(&list.data).contains(&global));

            let recent = fixture.service.recent(principal).await.unwrap();
            assert!(ids(&recent.notifications).contains(&global));
        }
    }

    #[tokio::test]
    async fn test_role_notification_is_hidden_from_other_roles() {
        let fixture = Fixture::new();
        let for_admins = fixture
            .notify(NewNotification::new("Admins", "Only").for_role(UserRole::Admin))
            .await;

        let staff = fixture.user(UserRole::Staff, None).await;
        let admin = fixture.user(UserRole::Admin, None).await;

        let staff_list = fixture.service.list(staff, ListQuery::default()).await.unwrap();
        assert!(!ids(&staff_list.data).contains(&for_admins));
        let staff_recent = fixture.service.recent(staff).await.unwrap();
        assert!(!ids(&staff_recent.notifications).contains(&for_admins));

        let admin_list = fixture.service.list(admin, ListQuery::default()).await.unwrap();
        assert!(ids(&admin_list.data).contains(&for_admins));
        let admin_recent = fixture.service.recent(admin).await.unwrap();
        assert!(ids(&admin_recent.notifications).contains(&for_admins));
    }

    #[tokio::test]
    async fn test_superadmin_bypasses_visibility_in_list() {
        let fixture = Fixture::new();
        let staff = fixture.user(UserRole::Staff, None).await;
        let superadmin = fixture.user(UserRole::Superadmin, None).await;
        let private = fixture
            .notify(NewNotification::new("Private", "").for_user(staff.id))
            .await;

        let list = fixture
            .service
            .list(superadmin, ListQuery::default())
            .await
            .unwrap();
        assert!(ids(&list.data).contains(&private));

        let filtered = fixture
            .service
            .list(
                superadmin,
                ListQuery {
                    role: Some(UserRole::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(filtered.data.is_empty());

        // recent keeps the visibility rule for everyone.
        let recent = fixture.service.recent(superadmin).await.unwrap();
        assert!(!ids(&recent.notifications).contains(&private));
    }

    #[tokio::test]
    async fn test_recent_is_capped_with_unread_count() {
        let fixture = Fixture::new();
        let staff = fixture.user(UserRole::Staff, None).await;
        for i in 0..12 {
            fixture.notify(NewNotification::new(format!("n{i}"), "")).await;
        }

        let recent = fixture.service.recent(staff).await.unwrap();
        assert_eq!(recent.notifications.len(), 10);
        assert_eq!(recent.notifications[0].notification.title, "n11");
        assert_eq!(recent.unread_count, 12);

        let list = fixture
            .service
            .list(
                staff,
                ListQuery {
                    page: Page::new(Some(2), Some(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(list.total, 12);
        assert_eq!(list.pages, 3);
        assert_eq!(list.page, 2);
        assert_eq!(list.data[0].notification.title, "n6");
    }

    #[tokio::test]
    async fn test_mark_read_twice_keeps_first_state() {
        let fixture = Fixture::new();
        let staff = fixture.user(UserRole::Staff, None).await;
        let id = fixture.notify(NewNotification::new("Hi", "")).await;

        let first = fixture.service.mark_read(staff, id).await.unwrap();
        assert!(first.notification.is_read);
        assert_eq!(first.notification.read_by, Some(staff.id));

        let other = fixture.user(UserRole::Admin, None).await;
        let second = fixture.service.mark_read(other, id).await.unwrap();
        assert_eq!(second.notification, first.notification);
    }

    #[tokio::test]
    async fn test_mark_read_requires_visibility() {
        let fixture = Fixture::new();
        let staff = fixture.user(UserRole::Staff, None).await;
        let superadmin = fixture.user(UserRole::Superadmin, None).await;
        let id = fixture
            .notify(NewNotification::new("Admins", "").for_role(UserRole::Admin))
            .await;

        assert!(matches!(
            fixture.service.mark_read(staff, id).await,
            Err(ServerError::Forbidden)
        ));
        assert!(fixture.service.mark_read(superadmin, id).await.is_ok());
        assert!(matches!(
            fixture.service.mark_read(staff, Id::new_v4()).await,
            Err(ServerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_all_and_clear_all_use_visibility() {
        let fixture = Fixture::new();
        let branch = Id::new_v4();
        let staff = fixture.user(UserRole::Staff, Some(branch)).await;
        let admin = fixture.user(UserRole::Admin, None).await;

        fixture.notify(NewNotification::new("Global", "")).await;
        fixture
            .notify(NewNotification::new("Mine", "").for_user(staff.id))
            .await;
        let admins_only = fixture
            .notify(NewNotification::new("Admins", "").for_role(UserRole::Admin))
            .await;

        assert_eq!(fixture.service.mark_all_read(staff).await.unwrap(), 2);
        assert_eq!(fixture.service.mark_all_read(staff).await.unwrap(), 0);
        assert_eq!(fixture.service.recent(staff).await.unwrap().unread_count, 0);
        assert_eq!(fixture.service.recent(admin).await.unwrap().unread_count, 1);

        assert_eq!(fixture.service.clear_all(staff).await.unwrap(), 2);
        let remaining = fixture.service.list(admin, ListQuery::default()).await.unwrap();
        assert_eq!(ids(&remaining.data), vec![admins_only]);
    }

    #[tokio::test]
    async fn test_create_checks_targets_and_hydrates() {
        let fixture = Fixture::new();
        let branch = Branch::new("Paris", "1 rue", "01");
        fixture.storage.branches.insert(&branch).await.unwrap();
        let author = fixture.user(UserRole::Superadmin, None).await;

        assert!(matches!(
            fixture
                .service
                .create(NewNotification::new("Hi", "").for_user(Id::new_v4()))
                .await,
            Err(ServerError::NotFound { .. })
        ));
        assert!(matches!(
            fixture
                .service
                .create(NewNotification::new("Hi", "").for_branch(Id::new_v4()))
                .await,
            Err(ServerError::NotFound { .. })
        ));

        let view = fixture
            .service
            .create(
                NewNotification::new("Hi", "")
                    .for_branch(branch.id)
                    .created_by(Some(author.id)),
            )
            .await
            .unwrap();
        assert_eq!(view.branch_name.as_deref(), Some("Paris"));
        assert_eq!(view.created_by_name.as_deref(), Some("Someone"));
        assert_eq!(view.user_name, None);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["branchName"], "Paris");
        assert_eq!(json["type"], "info");
    }

    #[tokio::test]
    async fn test_publish_never_fails() {
        struct Broken;

        #[async_trait::async_trait]
        impl NotificationRepository for Broken {
            async fn insert(&self, _: &Notification) -> Result<()> {
                Err(ServerError::bad_request("store is down"))
            }
            async fn find_by_id(&self, _: Id) -> Result<Option<Notification>> {
                Ok(None)
            }
            async fn list(
                &self,
                _: &NotificationFilter,
                _: Page,
            ) -> Result<(Vec<Notification>, u64)> {
                Ok((Vec::new(), 0))
            }
            async fn count(&self, _: &NotificationFilter) -> Result<u64> {
                Ok(0)
            }
            async fn mark_read(&self, _: Id, _: Id, _: chrono::DateTime<Utc>) -> Result<bool> {
                Ok(false)
            }
            async fn mark_all_read(
                &self,
                _: &NotificationFilter,
                _: Id,
                _: chrono::DateTime<Utc>,
            ) -> Result<u64> {
                Ok(0)
            }
            async fn delete_matching(&self, _: &NotificationFilter) -> Result<u64> {
                Ok(0)
            }
        }

        NotificationPublisher::new(Arc::new(Broken))
            .publish(
                Event::BranchCreated {
                    name: "Paris".into(),
                },
                None,
            )
            .await;
    }

    #[test]
    fn test_event_targets() {
        let user = Id::new_v4();
        let reassigned = Event::UserReassigned {
            user,
            from: "Lyon".into(),
            to: "Paris".into(),
        }
        .into_notification();
        assert_eq!(reassigned.user, Some(user));
        assert_eq!(reassigned.role, None);
        assert_eq!(reassigned.kind, NotificationKind::Warning);

        let summary = Event::BranchDeleted {
            name: "Lyon".into(),
            target: Some("Paris".into()),
            moved: 3,
        }
        .into_notification();
        assert_eq!(summary.role, Some(UserRole::Superadmin));
        assert_eq!(summary.message, "Branch Lyon was deleted, 3 user(s) moved to Paris.");
    }
}
