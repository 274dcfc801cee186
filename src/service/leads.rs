//! Lead intake and bulk import.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use super::lead_csv;
use crate::error::{Result, ServerError};
use crate::model::{Lead, LeadSource, non_empty, normalize_email};
use crate::repository::LeadRepository;

/// Website submissions sharing a contact within this window update the
/// existing lead.
const DEDUP_WINDOW_HOURS: i64 = 24;

/// Form posted by the public website.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WebsiteLead {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub whatsapp: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

/// Outcome of a website submission.
#[derive(Clone, Debug, PartialEq)]
pub enum Intake {
    Created(Lead),
    Updated(Lead),
}

/// Outcome of a CSV import.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct LeadService {
    leads: Arc<dyn LeadRepository>,
}

impl LeadService {
    pub fn new(leads: Arc<dyn LeadRepository>) -> Self {
        Self { leads }
    }

    /// Store a website submission.
    ///
    /// A `Website` lead created in the last 24 hours with the same email or
    /// phone is updated in place instead of duplicated.
    pub async fn intake(&self, form: WebsiteLead) -> Result<Intake> {
        let email = non_empty(form.email).map(|e| normalize_email(&e));
        let phone = non_empty(form.phone);
        if email.is_none() && phone.is_none() {
            return Err(ServerError::bad_request("Email or phone is required."));
        }

        let since = Utc::now() - Duration::hours(DEDUP_WINDOW_HOURS);
        let existing = self
            .leads
            .find_recent_duplicate(email.as_deref(), phone.as_deref(), LeadSource::Website, since)
            .await?;

        match existing {
            Some(mut lead) => {
                lead.name = form.name.trim().to_owned();
                lead.email = email.or(lead.email);
                lead.phone = phone.or(lead.phone);
                lead.whatsapp = non_empty(form.whatsapp).or(lead.whatsapp);
                lead.subject = non_empty(form.subject).or(lead.subject);
                lead.message = non_empty(form.message).or(lead.message);
                lead.last_interaction = Utc::now();

                self.leads.update(&lead).await?;
                tracing::debug!(lead = %lead.id, "website lead refreshed");

                Ok(Intake::Updated(lead))
            },
            None => {
                let lead = Lead::new(form.name.trim(), LeadSource::Website)
                    .with_contact(email, phone, form.whatsapp)
                    .with_enquiry(form.subject, form.message);

                self.leads.insert(&lead).await?;
                tracing::debug!(lead = %lead.id, "website lead created");

                Ok(Intake::Created(lead))
            },
        }
    }

    /// Import a CSV file of leads.
    ///
    /// Invalid rows count as failed, rows sharing an email or phone with a
    /// stored lead or an earlier row count as duplicates. Neither is stored.
    pub async fn import(&self, data: &[u8]) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut emails = HashSet::new();
        let mut phones = HashSet::new();

        for parsed in lead_csv::parse(data)? {
            let row = match parsed.row {
                Ok(row) => row,
                Err(reason) => {
                    report.failed += 1;
                    report.errors.push(format!("Row {}: {reason}", parsed.line));
                    continue;
                },
            };

            let email = row.email.as_deref().map(normalize_email);
            let seen = email.as_ref().is_some_and(|e| emails.contains(e))
                || phones.contains(&row.phone);
            if seen
                || self
                    .leads
                    .contact_exists(email.as_deref(), Some(&row.phone))
                    .await?
            {
                report.duplicates += 1;
                continue;
            }

            let lead = Lead::new(row.name, LeadSource::Other)
                .with_contact(email.clone(), Some(row.phone.clone()), row.whatsapp)
                .with_enquiry(row.subject, row.message);
            self.leads.insert(&lead).await?;

            report.imported += 1;
            emails.extend(email);
            phones.insert(row.phone);
        }

        tracing::info!(
            imported = report.imported,
            duplicates = report.duplicates,
            failed = report.failed,
            "leads imported"
        );

        Ok(report)
    }
}

impl Intake {
    pub fn lead(&self) -> &Lead {
        match self {
            Intake::Created(lead) | Intake::Updated(lead) => lead,
        }
    }

    pub fn into_lead(self) -> Lead {
        match self {
            Intake::Created(lead) | Intake::Updated(lead) => lead,
        }
    }
}
