//! Leads-related HTTP API.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail, ValidationError};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::website_api_key;
use crate::model::{
    Id, Lead, LeadSource, LeadStatus, Page, Paginated, non_empty,
};
use crate::repository::LeadFilter;
use crate::router::{Path, Query, Valid, not_blank, nullable};
use crate::service::lead_csv;
use crate::service::leads::{ImportReport, Intake, WebsiteLead};
use crate::telemetry;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    status: Option<LeadStatus>,
    source: Option<LeadSource>,
    branch: Option<Id>,
    assigned_to: Option<Id>,
    search: Option<String>,
    page: Option<u64>,
    limit: Option<u64>,
}

impl ListQuery {
    fn filter(&self) -> LeadFilter {
        LeadFilter {
            status: self.status,
            source: self.source,
            branch: self.branch,
            assigned_to: self.assigned_to,
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Empty strings are accepted, the website form sends them for blank
/// inputs.
fn email_or_empty(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() || value.trim().validate_email() {
        Ok(())
    } else {
        Err(ValidationError::new("email").with_message("Email must be formatted.".into()))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct WebsiteBody {
    #[validate(length(min = 1, max = 200, message = "Name is required."), custom(function = "not_blank"))]
    name: String,
    #[validate(custom(function = "email_or_empty"))]
    email: Option<String>,
    phone: Option<String>,
    whatsapp: Option<String>,
    subject: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteResponse {
    success: bool,
    message: &'static str,
    lead_id: Id,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
    #[validate(length(min = 1, max = 200, message = "Name is required."), custom(function = "not_blank"))]
    name: String,
    #[validate(custom(function = "email_or_empty"))]
    email: Option<String>,
    phone: Option<String>,
    whatsapp: Option<String>,
    subject: Option<String>,
    message: Option<String>,
    #[serde(default)]
    source: LeadSource,
    #[serde(default)]
    status: LeadStatus,
    branch: Option<Id>,
    assigned_to: Option<Id>,
    notes: Option<String>,
}

/// Absent fields are kept, `null` clears optional ones.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[validate(length(min = 1, max = 200, message = "Name is required."), custom(function = "not_blank"))]
    name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    whatsapp: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    subject: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    message: Option<Option<String>>,
    source: Option<LeadSource>,
    status: Option<LeadStatus>,
    #[serde(default, deserialize_with = "nullable")]
    branch: Option<Option<Id>>,
    #[serde(default, deserialize_with = "nullable")]
    assigned_to: Option<Option<Id>>,
    #[serde(default, deserialize_with = "nullable")]
    notes: Option<Option<String>>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/export", get(export))
        .route("/sample", get(sample))
        .route("/import", post(import))
        .route("/{id}", get(find).put(update).delete(delete))
}

/// Public intake, guarded by the website API key.
pub fn website_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/website", post(website))
        .route_layer(middleware::from_fn_with_state(state, website_api_key))
}

async fn load(state: &AppState, id: Id) -> Result<Lead> {
    state
        .storage
        .leads
        .find_by_id(id)
        .await?
        .ok_or(ServerError::not_found("lead"))
}

/// Referenced branch and assignee must exist.
async fn check_refs(state: &AppState, branch: Option<Id>, assigned_to: Option<Id>) -> Result<()> {
    if let Some(branch) = branch {
        state
            .storage
            .branches
            .find_by_id(branch)
            .await?
            .ok_or(ServerError::not_found("branch"))?;
    }
    if let Some(user) = assigned_to {
        state
            .storage
            .users
            .find_by_id(user)
            .await?
            .ok_or(ServerError::not_found("user"))?;
    }

    Ok(())
}

fn csv_attachment(filename: String, data: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        data,
    )
}

async fn website(
    State(state): State<AppState>,
    Valid(body): Valid<WebsiteBody>,
) -> Result<(StatusCode, Json<WebsiteResponse>)> {
    let intake = state
        .leads
        .intake(WebsiteLead {
            name: body.name,
            email: body.email,
            phone: body.phone,
            whatsapp: body.whatsapp,
            subject: body.subject,
            message: body.message,
        })
        .await?;

    telemetry::website_lead(matches!(intake, Intake::Created(_)));
    let (status, message) = match &intake {
        Intake::Created(_) => (StatusCode::CREATED, "Thank you, we will contact you soon."),
        Intake::Updated(_) => (StatusCode::OK, "Thank you, your request has been updated."),
    };

    Ok((
        status,
        Json(WebsiteResponse {
            success: true,
            message,
            lead_id: intake.into_lead().id,
        }),
    ))
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<Lead>>> {
    let page = Page::new(query.page, query.limit);
    let (leads, total) = state.storage.leads.list(&query.filter(), page).await?;

    Ok(Json(Paginated::new(leads, total, page)))
}

async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<Lead>)> {
    check_refs(&state, body.branch, body.assigned_to).await?;

    let mut lead = Lead::new(body.name.trim(), body.source)
        .with_contact(body.email, body.phone, body.whatsapp)
        .with_enquiry(body.subject, body.message);
    lead.status = body.status;
    lead.branch = body.branch;
    lead.assigned_to = body.assigned_to;
    lead.notes = non_empty(body.notes);

    state.storage.leads.insert(&lead).await?;
    tracing::debug!(lead = %lead.id, "lead created");

    Ok((StatusCode::CREATED, Json(lead)))
}

async fn find(State(state): State<AppState>, Path(id): Path<Id>) -> Result<Json<Lead>> {
    Ok(Json(load(&state, id).await?))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<Id>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<Lead>> {
    let mut lead = load(&state, id).await?;
    check_refs(&state, body.branch.flatten(), body.assigned_to.flatten()).await?;

    if let Some(name) = body.name {
        lead.name = name.trim().to_owned();
    }
    if let Some(email) = body.email {
        let email = non_empty(email);
        if email.as_ref().is_some_and(|e| !e.validate_email()) {
            return Err(ServerError::bad_request("Email must be formatted."));
        }
        lead.email = email.map(|e| crate::model::normalize_email(&e));
    }
    if let Some(phone) = body.phone {
        lead.phone = non_empty(phone);
    }
    if let Some(whatsapp) = body.whatsapp {
        lead.whatsapp = non_empty(whatsapp);
    }
    if let Some(subject) = body.subject {
        lead.subject = non_empty(subject);
    }
    if let Some(message) = body.message {
        lead.message = non_empty(message);
    }
    if let Some(source) = body.source {
        lead.source = source;
    }
    if let Some(status) = body.status {
        lead.status = status;
    }
    if let Some(branch) = body.branch {
        lead.branch = branch;
    }
    if let Some(assigned_to) = body.assigned_to {
        lead.assigned_to = assigned_to;
    }
    if let Some(notes) = body.notes {
        lead.notes = non_empty(notes);
    }
    let now = Utc::now();
    lead.last_interaction = now;
    lead.updated_at = now;

    state.storage.leads.update(&lead).await?;

    Ok(Json(lead))
}

async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Id>,
) -> Result<Json<serde_json::Value>> {
    if !state.storage.leads.delete(id).await? {
        return Err(ServerError::not_found("lead"));
    }

    Ok(Json(serde_json::json!({ "message": "Lead deleted successfully." })))
}

async fn export(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let (leads, _) = state.storage.leads.list(&query.filter(), Page::all()).await?;
    let data = lead_csv::export(&leads)?;

    let filename = format!("leads-{}.csv", Utc::now().format("%Y-%m-%d"));
    Ok(csv_attachment(filename, data))
}

async fn sample() -> Result<impl IntoResponse> {
    Ok(csv_attachment("leads-sample.csv".to_owned(), lead_csv::sample()?))
}

async fn import(State(state): State<AppState>, body: Bytes) -> Result<Json<ImportReport>> {
    if body.is_empty() {
        return Err(ServerError::bad_request("CSV file is empty."));
    }

    Ok(Json(state.leads.import(&body).await?))
}
