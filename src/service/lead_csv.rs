//! Lead spreadsheets.
//!
//! Files are RFC 4180 CSV prefixed with a UTF-8 byte order mark so
//! spreadsheet software detects the encoding. The mark is optional on
//! import.

use csv::{ReaderBuilder, StringRecord, Trim, Writer};
use validator::ValidateEmail;

use crate::error::{Result, ServerError};
use crate::model::{Lead, non_empty};

/// Columns accepted on import.
pub const IMPORT_COLUMNS: [&str; 6] =
    ["name", "phone", "email", "whatsapp", "subject", "message"];
const REQUIRED_COLUMNS: [&str; 2] = ["name", "phone"];
const EXPORT_COLUMNS: [&str; 11] = [
    "Name",
    "Email",
    "Phone",
    "WhatsApp",
    "Subject",
    "Message",
    "Source",
    "Status",
    "Notes",
    "Last Interaction",
    "Created At",
];
const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Valid row of an import file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeadRow {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

/// Row of an import file with its line number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedRow {
    pub line: u64,
    pub row: std::result::Result<LeadRow, String>,
}

fn writer() -> Writer<Vec<u8>> {
    Writer::from_writer(BOM.to_vec())
}

fn finish(writer: Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|err| ServerError::internal("cannot flush CSV", err.into_error()))
}

fn write_failed(err: csv::Error) -> ServerError {
    ServerError::internal("cannot write CSV", err)
}

/// Export `leads`, one row each.
pub fn export(leads: &[Lead]) -> Result<Vec<u8>> {
    let mut writer = writer();
    writer.write_record(EXPORT_COLUMNS).map_err(write_failed)?;

    for lead in leads {
        let last_interaction = lead.last_interaction.to_rfc3339();
        let created_at = lead.created_at.to_rfc3339();
        writer
            .write_record([
                lead.name.as_str(),
                lead.email.as_deref().unwrap_or_default(),
                lead.phone.as_deref().unwrap_or_default(),
                lead.whatsapp.as_deref().unwrap_or_default(),
                lead.subject.as_deref().unwrap_or_default(),
                lead.message.as_deref().unwrap_or_default(),
                lead.source.as_str(),
                lead.status.as_str(),
                lead.notes.as_deref().unwrap_or_default(),
                last_interaction.as_str(),
                created_at.as_str(),
            ])
            .map_err(write_failed)?;
    }

    finish(writer)
}

/// Template listing the import columns.
pub fn sample() -> Result<Vec<u8>> {
    let mut writer = writer();
    writer.write_record(IMPORT_COLUMNS).map_err(write_failed)?;
    writer
        .write_record([
            "Jane Doe",
            "+33612345678",
            "jane.doe@example.com",
            "+33612345678",
            "Pricing",
            "I would like a quote, please.",
        ])
        .map_err(write_failed)?;

    finish(writer)
}

/// Parse an import file.
///
/// A broken header fails the whole file, anything wrong in a row only
/// fails that row.
pub fn parse(data: &[u8]) -> Result<Vec<ParsedRow>> {
    let data = data.strip_prefix(BOM).unwrap_or(data);
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(ServerError::bad_request("CSV file is empty."));
    }
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|c| !headers.iter().any(|h| h == *c))
    {
        return Err(ServerError::bad_request(format!(
            "Missing required column `{missing}`."
        )));
    }

    Ok(reader
        .records()
        .enumerate()
        .map(|(index, record)| match record {
            Ok(record) => ParsedRow {
                line: record.position().map_or(index as u64 + 2, |p| p.line()),
                row: check_row(&headers, &record),
            },
            Err(err) => ParsedRow {
                line: err.position().map_or(index as u64 + 2, |p| p.line()),
                row: Err(err.to_string()),
            },
        })
        .collect())
}

fn check_row(headers: &[String], record: &StringRecord) -> std::result::Result<LeadRow, String> {
    if record.len() > headers.len() {
        return Err("row has more fields than the header".to_owned());
    }

    let mut row = LeadRow::default();
    for (column, value) in headers.iter().zip(record.iter()) {
        let value = non_empty(Some(value.to_owned()));
        match column.as_str() {
            "name" => row.name = value.unwrap_or_default(),
            "phone" => row.phone = value.unwrap_or_default(),
            "email" => row.email = value,
            "whatsapp" => row.whatsapp = value,
            "subject" => row.subject = value,
            "message" => row.message = value,
            other if value.is_some() => {
                return Err(format!("field `{other}` is not allowed"));
            },
            _ => {},
        }
    }

    if row.name.is_empty() {
        return Err("name is required".to_owned());
    }
    if row.phone.is_empty() {
        return Err("phone is required".to_owned());
    }
    if row.email.as_ref().is_some_and(|e| !e.validate_email()) {
        return Err("email is invalid".to_owned());
    }

    Ok(row)
}
