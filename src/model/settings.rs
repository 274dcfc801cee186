use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// Singleton configuration of the public lead intake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteSettings {
    pub api_key: String,
    pub target_url: Option<String>,
    pub updated_by: Option<Id>,
    pub updated_at: DateTime<Utc>,
}

impl WebsiteSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            target_url: None,
            updated_by: None,
            updated_at: Utc::now(),
        }
    }
}
