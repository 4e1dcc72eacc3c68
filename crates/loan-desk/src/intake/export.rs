use serde::Serialize;

use super::domain::ApplicationRecord;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write csv row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv output: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv output was not valid utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Applicant Name")]
    applicant_name: &'a str,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Income")]
    income: f64,
    #[serde(rename = "Loan Amount")]
    loan_amount: f64,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "Signature Verified")]
    signature_verified: &'static str,
}

impl<'a> From<&'a ApplicationRecord> for ExportRow<'a> {
    fn from(record: &'a ApplicationRecord) -> Self {
        Self {
            id: record.display_id(),
            applicant_name: &record.applicant_name,
            date: record.created_at.format("%Y-%m-%d %H:%M").to_string(),
            income: record.fields.applicant_income,
            loan_amount: record.fields.loan_amount_full(),
            status: record.decision.title(),
            signature_verified: if record.signature.verified { "Yes" } else { "No" },
        }
    }
}

/// Render records as CSV with a header row; an empty slice yields the header alone.
pub fn records_to_csv(records: &[ApplicationRecord]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if records.is_empty() {
        writer.write_record([
            "ID",
            "Applicant Name",
            "Date",
            "Income",
            "Loan Amount",
            "Status",
            "Signature Verified",
        ])?;
    }
    for record in records {
        writer.serialize(ExportRow::from(record))?;
    }
    writer.flush()?;
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Io(std::io::Error::new(err.error().kind(), err.to_string())))?;
    Ok(String::from_utf8(bytes)?)
}
