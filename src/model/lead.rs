use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

text_enum! {
    /// Channel a [`Lead`] came from.
    #[derive(Default)]
    pub enum LeadSource {
        Website => "Website",
        Call => "Call",
        WhatsApp => "WhatsApp",
        Facebook => "Facebook",
        AiBot => "AI Bot",
        WalkIn => "Walk-in",
        Referral => "Referral",
        #[default]
        Other => "Other",
    }
}

text_enum! {
    /// Sales pipeline stage.
    #[derive(Default)]
    pub enum LeadStatus {
        #[default]
        New => "New",
        InProgress => "In Progress",
        FollowUp => "Follow-Up",
        Converted => "Converted",
        Lost => "Lost",
    }
}

/// Prospective customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Id,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub branch: Option<Id>,
    pub assigned_to: Option<Id>,
    pub notes: Option<String>,
    pub last_interaction: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new [`Lead`] with status `New`.
    pub fn new(name: impl Into<String>, source: LeadSource) -> Self {
        let now = Utc::now();

        Self {
            id: Id::new_v4(),
            name: name.into(),
            email: None,
            phone: None,
            whatsapp: None,
            subject: None,
            message: None,
            source,
            status: LeadStatus::New,
            branch: None,
            assigned_to: None,
            notes: None,
            last_interaction: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update contact fields, empty strings become `None`.
    pub fn with_contact(
        mut self,
        email: Option<String>,
        phone: Option<String>,
        whatsapp: Option<String>,
    ) -> Self {
        self.email = non_empty(email).map(|e| super::normalize_email(&e));
        self.phone = non_empty(phone);
        self.whatsapp = non_empty(whatsapp);
        self
    }

    /// Update `subject` and `message` of [`Lead`].
    pub fn with_enquiry(
        mut self,
        subject: Option<String>,
        message: Option<String>,
    ) -> Self {
        self.subject = non_empty(subject);
        self.message = non_empty(message);
        self
    }
}

/// Trim a value and drop it when nothing is left.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_enums_use_display_names() {
        assert_eq!(LeadSource::AiBot.as_str(), "AI Bot");
        assert_eq!("Walk-in".parse::<LeadSource>(), Ok(LeadSource::WalkIn));
        assert_eq!(
            serde_json::to_string(&LeadStatus::FollowUp).unwrap(),
            r#""Follow-Up""#
        );
        assert!("follow-up".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn test_lead_contact_normalization() {
        let lead = Lead::new("Grace", LeadSource::Website).with_contact(
            Some(" Grace@Example.com ".into()),
            Some("  ".into()),
            None,
        );

        assert_eq!(lead.email.as_deref(), Some("grace@example.com"));
        assert_eq!(lead.phone, None);
        assert_eq!(lead.status, LeadStatus::New);
    }
}
