//! PostgreSQL implementation of every repository.

mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use self::models::{
    BranchRecord, LeadRecord, LoginHistoryRecord, NotificationRecord,
    RoleRecord, SettingsRecord, UserRecord,
};
use super::{
    BranchRepository, LeadFilter, LeadRepository, LoginHistoryRepository,
    NotificationRepository, RoleRepository, SettingsRepository, UserFilter,
    UserRepository, like_pattern,
};
use crate::error::Result;
use crate::model::{
    Branch, Id, Lead, LeadSource, LoginHistory, Notification, Page, Role,
    User, UserRole, WebsiteSettings,
};
use crate::visibility::NotificationFilter;

const USER_COLUMNS: &str = "id, name, email, password, phone, role, status, \
    branch_id, last_login, created_at, updated_at";
const BRANCH_COLUMNS: &str =
    "id, name, address, phone, email, assigned_users, created_at, updated_at";
const LEAD_COLUMNS: &str = "id, name, email, phone, whatsapp, subject, message, \
    source, status, branch_id, assigned_to, notes, last_interaction, \
    created_at, updated_at";
const NOTIFICATION_COLUMNS: &str = "id, title, message, kind, user_id, role, \
    branch_id, created_by, is_read, read_by, read_at, created_at";
const LOGIN_HISTORY_COLUMNS: &str = "id, user_id, email, success, \
    failure_reason, ip, user_agent, country, region, city, isp, created_at";
const NEWEST_FIRST: &str = " ORDER BY created_at DESC, id DESC";

/// PostgreSQL store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new [`PgStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_page(query: &mut QueryBuilder<'_, Postgres>, page: Page) {
    query
        .push(NEWEST_FIRST)
        .push(" LIMIT ")
        .push_bind(i64::try_from(page.limit()).unwrap_or(i64::MAX))
        .push(" OFFSET ")
        .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
}

fn push_user_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    query.push(" WHERE TRUE");

    if let Some(role) = filter.role {
        query.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(branch) = filter.branch {
        query.push(" AND branch_id = ").push_bind(branch);
    }
    if filter.unassigned {
        query.push(" AND branch_id IS NULL");
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        query
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR phone ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_lead_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &LeadFilter) {
    query.push(" WHERE TRUE");

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(source) = filter.source {
        query.push(" AND source = ").push_bind(source.as_str());
    }
    if let Some(branch) = filter.branch {
        query.push(" AND branch_id = ").push_bind(branch);
    }
    if let Some(user) = filter.assigned_to {
        query.push(" AND assigned_to = ").push_bind(user);
    }
    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        query
            .push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR phone ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_login_owner(query: &mut QueryBuilder<'_, Postgres>, user: Option<Id>) {
    if let Some(user) = user {
        query.push(" WHERE user_id = ").push_bind(user);
    }
}

async fn fetch_count(pool: &PgPool, mut query: QueryBuilder<'_, Postgres>) -> Result<u64> {
    let total: i64 = query.build_query_scalar().fetch_one(pool).await?;
    Ok(u64::try_from(total).unwrap_or_default())
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, email, password, phone, role, status,
                branch_id, last_login, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.branch)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_many(&self, ids: &[Id]) -> Result<Vec<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");

        sqlx::query_as::<_, UserRecord>(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn list(&self, filter: &UserFilter, page: Page) -> Result<(Vec<User>, u64)> {
        let mut total = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_user_filter(&mut total, filter);
        let total = fetch_count(&self.pool, total).await?;

        let mut query = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filter(&mut query, filter);
        push_page(&mut query, page);

        let users = query
            .build_query_as::<UserRecord>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_>>()?;

        Ok((users, total))
    }

    async fn update(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET
                name = $2,
                email = $3,
                password = $4,
                phone = $5,
                role = $6,
                status = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_branch(&self, user: Id, branch: Id) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET branch_id = $2, updated_at = NOW()
            WHERE id = $1 AND (branch_id IS NULL OR branch_id = $2)
            "#,
        )
        .bind(user)
        .bind(branch)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_branch(&self, user: Id, branch: Option<Id>) -> Result<()> {
        sqlx::query("UPDATE users SET branch_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(user)
            .bind(branch)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn touch_login(&self, user: Id, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl BranchRepository for PgStore {
    async fn insert(&self, branch: &Branch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO branches (
                id, name, address, phone, email, assigned_users,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(branch.id)
        .bind(&branch.name)
        .bind(&branch.address)
        .bind(&branch.phone)
        .bind(&branch.email)
        .bind(&branch.assigned_users)
        .bind(branch.created_at)
        .bind(branch.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Branch>> {
        let query = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = $1");

        Ok(sqlx::query_as::<_, BranchRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Branch::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Branch>> {
        let query = format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE email = $1");

        Ok(sqlx::query_as::<_, BranchRecord>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(Branch::from))
    }

    async fn list(&self) -> Result<Vec<Branch>> {
        let query = format!("SELECT {BRANCH_COLUMNS} FROM branches ORDER BY name, id");

        Ok(sqlx::query_as::<_, BranchRecord>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Branch::from)
            .collect())
    }

    async fn update(&self, branch: &Branch) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE branches
            SET name = $2, address = $3, phone = $4, email = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(branch.id)
        .bind(&branch.name)
        .bind(&branch.address)
        .bind(&branch.phone)
        .bind(&branch.email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM branches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_member(&self, branch: Id, user: Id) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE branches
            SET assigned_users = array_append(assigned_users, $2), updated_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(assigned_users))
            "#,
        )
        .bind(branch)
        .bind(user)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_member(&self, branch: Id, user: Id) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE branches
            SET assigned_users = array_remove(assigned_users, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(branch)
        .bind(user)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LeadRepository for PgStore {
    async fn insert(&self, lead: &Lead) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leads (
                id, name, email, phone, whatsapp, subject, message, source,
                status, branch_id, assigned_to, notes, last_interaction,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(lead.id)
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.whatsapp)
        .bind(&lead.subject)
        .bind(&lead.message)
        .bind(lead.source.as_str())
        .bind(lead.status.as_str())
        .bind(lead.branch)
        .bind(lead.assigned_to)
        .bind(&lead.notes)
        .bind(lead.last_interaction)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Lead>> {
        let query = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1");

        sqlx::query_as::<_, LeadRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Lead::try_from)
            .transpose()
    }

    async fn list(&self, filter: &LeadFilter, page: Page) -> Result<(Vec<Lead>, u64)> {
        let mut total = QueryBuilder::new("SELECT COUNT(*) FROM leads");
        push_lead_filter(&mut total, filter);
        let total = fetch_count(&self.pool, total).await?;

        let mut query = QueryBuilder::new(format!("SELECT {LEAD_COLUMNS} FROM leads"));
        push_lead_filter(&mut query, filter);
        push_page(&mut query, page);

        let leads = query
            .build_query_as::<LeadRecord>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Lead::try_from)
            .collect::<Result<_>>()?;

        Ok((leads, total))
    }

    async fn update(&self, lead: &Lead) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE leads
            SET
                name = $2,
                email = $3,
                phone = $4,
                whatsapp = $5,
                subject = $6,
                message = $7,
                source = $8,
                status = $9,
                branch_id = $10,
                assigned_to = $11,
                notes = $12,
                last_interaction = $13,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(lead.id)
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.whatsapp)
        .bind(&lead.subject)
        .bind(&lead.message)
        .bind(lead.source.as_str())
        .bind(lead.status.as_str())
        .bind(lead.branch)
        .bind(lead.assigned_to)
        .bind(&lead.notes)
        .bind(lead.last_interaction)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_recent_duplicate(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        source: LeadSource,
        since: DateTime<Utc>,
    ) -> Result<Option<Lead>> {
        let query = format!(
            "SELECT {LEAD_COLUMNS} FROM leads \
             WHERE source = $1 AND created_at >= $2 AND (email = $3 OR phone = $4)\
             {NEWEST_FIRST} LIMIT 1"
        );

        sqlx::query_as::<_, LeadRecord>(&query)
            .bind(source.as_str())
            .bind(since)
            .bind(email)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?
            .map(Lead::try_from)
            .transpose()
    }

    async fn contact_exists(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM leads WHERE email = $1 OR phone = $2)",
        )
        .bind(email)
        .bind(phone)
        .fetch_one(&self.pool)
        .await?)
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn list(&self) -> Result<Vec<Role>> {
        let mut roles = sqlx::query_as::<_, RoleRecord>(
            "SELECT name, permissions, updated_at FROM roles",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Role::try_from)
        .collect::<Result<Vec<_>>>()?;

        roles.sort_by_key(|r| r.name);
        Ok(roles)
    }

    async fn find(&self, name: UserRole) -> Result<Option<Role>> {
        sqlx::query_as::<_, RoleRecord>(
            "SELECT name, permissions, updated_at FROM roles WHERE name = $1",
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Role::try_from)
        .transpose()
    }

    async fn upsert(&self, role: &Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (name, permissions, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET permissions = EXCLUDED.permissions, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(role.name.as_str())
        .bind(sqlx::types::Json(&role.permissions))
        .bind(role.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, title, message, kind, user_id, role, branch_id,
                created_by, is_read, read_by, read_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind.as_str())
        .bind(notification.user)
        .bind(notification.role.map(|r| r.as_str()))
        .bind(notification.branch)
        .bind(notification.created_by)
        .bind(notification.is_read)
        .bind(notification.read_by)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Notification>> {
        let query =
            format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");

        sqlx::query_as::<_, NotificationRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    async fn list(
        &self,
        filter: &NotificationFilter,
        page: Page,
    ) -> Result<(Vec<Notification>, u64)> {
        let total = NotificationRepository::count(self, filter).await?;

        let mut query =
            QueryBuilder::new(format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications"));
        filter.push_sql(&mut query);
        push_page(&mut query, page);

        let notifications = query
            .build_query_as::<NotificationRecord>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<_>>()?;

        Ok((notifications, total))
    }

    async fn count(&self, filter: &NotificationFilter) -> Result<u64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM notifications");
        filter.push_sql(&mut query);
        fetch_count(&self.pool, query).await
    }

    async fn mark_read(&self, id: Id, reader: Id, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_by = $2, read_at = $3
            WHERE id = $1 AND is_read = FALSE
            "#,
        )
        .bind(id)
        .bind(reader)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_all_read(
        &self,
        filter: &NotificationFilter,
        reader: Id,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut query = QueryBuilder::new("UPDATE notifications SET is_read = TRUE, read_by = ");
        query.push_bind(reader).push(", read_at = ").push_bind(at);
        filter.push_sql(&mut query);
        query.push(" AND is_read = FALSE");

        Ok(query.build().execute(&self.pool).await?.rows_affected())
    }

    async fn delete_matching(&self, filter: &NotificationFilter) -> Result<u64> {
        let mut query = QueryBuilder::new("DELETE FROM notifications");
        filter.push_sql(&mut query);

        Ok(query.build().execute(&self.pool).await?.rows_affected())
    }
}

#[async_trait]
impl LoginHistoryRepository for PgStore {
    async fn insert(&self, entry: &LoginHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_history (
                id, user_id, email, success, failure_reason, ip, user_agent,
                country, region, city, isp, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user)
        .bind(&entry.email)
        .bind(entry.success)
        .bind(&entry.failure_reason)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(&entry.location.country)
        .bind(&entry.location.region)
        .bind(&entry.location.city)
        .bind(&entry.location.isp)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        user: Option<Id>,
        page: Page,
    ) -> Result<(Vec<LoginHistory>, u64)> {
        let mut total = QueryBuilder::new("SELECT COUNT(*) FROM login_history");
        push_login_owner(&mut total, user);
        let total = fetch_count(&self.pool, total).await?;

        let mut query = QueryBuilder::new(format!(
            "SELECT {LOGIN_HISTORY_COLUMNS} FROM login_history"
        ));
        push_login_owner(&mut query, user);
        push_page(&mut query, page);

        let entries = query
            .build_query_as::<LoginHistoryRecord>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(LoginHistory::from)
            .collect();

        Ok((entries, total))
    }
}

#[async_trait]
impl SettingsRepository for PgStore {
    async fn get(&self) -> Result<Option<WebsiteSettings>> {
        Ok(sqlx::query_as::<_, SettingsRecord>(
            "SELECT api_key, target_url, updated_by, updated_at FROM website_settings",
        )
        .fetch_optional(&self.pool)
        .await?
        .map(WebsiteSettings::from))
    }

    async fn get_or_insert(&self, default: WebsiteSettings) -> Result<WebsiteSettings> {
        let record = sqlx::query_as::<_, SettingsRecord>(
            r#"
            WITH inserted AS (
                INSERT INTO website_settings (api_key, target_url, updated_by, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (singleton) DO NOTHING
                RETURNING api_key, target_url, updated_by, updated_at
            )
            SELECT api_key, target_url, updated_by, updated_at FROM inserted
            UNION ALL
            SELECT api_key, target_url, updated_by, updated_at FROM website_settings
            LIMIT 1
            "#,
        )
        .bind(&default.api_key)
        .bind(&default.target_url)
        .bind(default.updated_by)
        .bind(default.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn save(&self, settings: &WebsiteSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO website_settings (api_key, target_url, updated_by, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (singleton) DO UPDATE
            SET
                api_key = EXCLUDED.api_key,
                target_url = EXCLUDED.target_url,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&settings.api_key)
        .bind(&settings.target_url)
        .bind(settings.updated_by)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LeadStatus;

    #[test]
    fn test_user_filter_sql() {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_user_filter(
            &mut query,
            &UserFilter {
                role: Some(UserRole::Staff),
                unassigned: true,
                search: Some("ada".into()),
                ..Default::default()
            },
        );

        assert_eq!(
            query.sql(),
            "SELECT COUNT(*) FROM users WHERE TRUE AND role = $1 AND branch_id IS NULL \
             AND (name ILIKE $2 OR email ILIKE $3 OR phone ILIKE $4)"
        );
    }

    #[test]
    fn test_lead_page_sql() {
        let mut query = QueryBuilder::new("SELECT id FROM leads");
        push_lead_filter(
            &mut query,
            &LeadFilter {
                status: Some(LeadStatus::FollowUp),
                ..Default::default()
            },
        );
        push_page(&mut query, Page::new(Some(2), Some(20)));

        assert_eq!(
            query.sql(),
            "SELECT id FROM leads WHERE TRUE AND status = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
    }
}
