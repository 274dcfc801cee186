//! Database models for PostgreSQL.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::{Result, ServerError};
use crate::model::{
    Branch, Id, Lead, Location, LoginHistory, Notification, Permissions,
    Role, User, WebsiteSettings,
};

/// Parse a text column into its enum, a mismatch means a corrupted row.
fn parse<T>(column: &str, value: &str) -> Result<T>
where
    T: FromStr<Err = crate::model::UnknownVariant>,
{
    value
        .parse()
        .map_err(|err| ServerError::internal(format!("invalid `{column}` column"), err))
}

/// User record as stored in the database.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub role: String,
    pub status: String,
    pub branch_id: Option<Id>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = ServerError;

    fn try_from(record: UserRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            name: record.name,
            email: record.email,
            password: record.password,
            phone: record.phone,
            role: parse("role", &record.role)?,
            status: parse("status", &record.status)?,
            branch: record.branch_id,
            last_login: record.last_login,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Branch record, members are a `UUID[]` column.
#[derive(Debug, Clone, FromRow)]
pub struct BranchRecord {
    pub id: Id,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: Option<String>,
    pub assigned_users: Vec<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BranchRecord> for Branch {
    fn from(record: BranchRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            address: record.address,
            phone: record.phone,
            email: record.email,
            assigned_users: record.assigned_users,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LeadRecord {
    pub id: Id,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub source: String,
    pub status: String,
    pub branch_id: Option<Id>,
    pub assigned_to: Option<Id>,
    pub notes: Option<String>,
    pub last_interaction: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeadRecord> for Lead {
    type Error = ServerError;

    fn try_from(record: LeadRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            name: record.name,
            email: record.email,
            phone: record.phone,
            whatsapp: record.whatsapp,
            subject: record.subject,
            message: record.message,
            source: parse("source", &record.source)?,
            status: parse("status", &record.status)?,
            branch: record.branch_id,
            assigned_to: record.assigned_to,
            notes: record.notes,
            last_interaction: record.last_interaction,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RoleRecord {
    pub name: String,
    #[sqlx(json)]
    pub permissions: Permissions,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RoleRecord> for Role {
    type Error = ServerError;

    fn try_from(record: RoleRecord) -> Result<Self> {
        Ok(Self {
            name: parse("name", &record.name)?,
            permissions: record.permissions,
            updated_at: record.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationRecord {
    pub id: Id,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub user_id: Option<Id>,
    pub role: Option<String>,
    pub branch_id: Option<Id>,
    pub created_by: Option<Id>,
    pub is_read: bool,
    pub read_by: Option<Id>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = ServerError;

    fn try_from(record: NotificationRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            title: record.title,
            message: record.message,
            kind: parse("kind", &record.kind)?,
            user: record.user_id,
            role: record.role.as_deref().map(|r| parse("role", r)).transpose()?,
            branch: record.branch_id,
            created_by: record.created_by,
            is_read: record.is_read,
            read_by: record.read_by,
            read_at: record.read_at,
            created_at: record.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LoginHistoryRecord {
    pub id: Id,
    pub user_id: Option<Id>,
    pub email: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<LoginHistoryRecord> for LoginHistory {
    fn from(record: LoginHistoryRecord) -> Self {
        Self {
            id: record.id,
            user: record.user_id,
            email: record.email,
            success: record.success,
            failure_reason: record.failure_reason,
            ip: record.ip,
            user_agent: record.user_agent,
            location: Location {
                country: record.country,
                region: record.region,
                city: record.city,
                isp: record.isp,
            },
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SettingsRecord {
    pub api_key: String,
    pub target_url: Option<String>,
    pub updated_by: Option<Id>,
    pub updated_at: DateTime<Utc>,
}

impl From<SettingsRecord> for WebsiteSettings {
    fn from(record: SettingsRecord) -> Self {
        Self {
            api_key: record.api_key,
            target_url: record.target_url,
            updated_by: record.updated_by,
            updated_at: record.updated_at,
        }
    }
}
