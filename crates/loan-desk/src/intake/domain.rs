use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the pipeline when a record is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of entries in the canonical field vector.
pub const FIELD_VECTOR_LEN: usize = 11;

/// Canonical, always fully populated applicant record consumed by the classifier.
///
/// Categorical attributes are carried in their numeric encoding so the record can be handed to the
/// model without a second translation step. `loan_amount` is expressed in thousands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(rename = "Gender")]
    pub gender: f64,
    #[serde(rename = "Married")]
    pub married: f64,
    #[serde(rename = "Dependents")]
    pub dependents: u32,
    #[serde(rename = "Education")]
    pub education: f64,
    #[serde(rename = "Self_Employed")]
    pub self_employed: f64,
    #[serde(rename = "ApplicantIncome")]
    pub applicant_income: f64,
    #[serde(rename = "CoapplicantIncome")]
    pub coapplicant_income: f64,
    #[serde(rename = "LoanAmount")]
    pub loan_amount: f64,
    #[serde(rename = "Loan_Amount_Term")]
    pub loan_term_months: f64,
    #[serde(rename = "Credit_History")]
    pub credit_history: f64,
    #[serde(rename = "Property_Area")]
    pub property_area: f64,
}

impl ExtractedFields {
    /// Fixed-order encoding: the order matches the serialized keys.
    pub fn to_vector(&self) -> [f64; FIELD_VECTOR_LEN] {
        [
            self.gender,
            self.married,
            f64::from(self.dependents),
            self.education,
            self.self_employed,
            self.applicant_income,
            self.coapplicant_income,
            self.loan_amount,
            self.loan_term_months,
            self.credit_history,
            self.property_area,
        ]
    }

    pub fn total_income(&self) -> f64 {
        self.applicant_income + self.coapplicant_income
    }

    /// Requested amount in full currency units.
    pub fn loan_amount_full(&self) -> f64 {
        self.loan_amount * 1000.0
    }

    pub fn has_good_credit(&self) -> bool {
        self.credit_history == 1.0
    }
}

/// Outcome of the signature heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignatureVerdict {
    pub verified: bool,
    pub confidence: f64,
}

impl SignatureVerdict {
    pub const fn new(verified: bool, confidence: f64) -> Self {
        Self {
            verified,
            confidence,
        }
    }

    pub const fn no_signal() -> Self {
        Self::new(false, 0.0)
    }
}

/// Classification outcome attached to a processed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanDecision {
    Approved,
    Rejected,
    Incomplete,
}

impl LoanDecision {
    pub const fn label(self) -> &'static str {
        match self {
            LoanDecision::Approved => "approved",
            LoanDecision::Rejected => "rejected",
            LoanDecision::Incomplete => "incomplete",
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            LoanDecision::Approved => "Approved",
            LoanDecision::Rejected => "Rejected",
            LoanDecision::Incomplete => "Incomplete",
        }
    }

    pub fn matches_label(self, filter: &str) -> bool {
        self.label().eq_ignore_ascii_case(filter.trim())
    }
}

impl fmt::Display for LoanDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Review lifecycle tracked by loan officers after the pipeline stores a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    PendingReview,
    UnderReview,
    Approved,
    Declined,
    Escalated,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::PendingReview => "pending_review",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Declined => "declined",
            ApplicationStatus::Escalated => "escalated",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown application status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ApplicationStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "pending_review" => Ok(Self::PendingReview),
            "under_review" => Ok(Self::UnderReview),
            "approved" => Ok(Self::Approved),
            "declined" => Ok(Self::Declined),
            "escalated" => Ok(Self::Escalated),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// Free-text annotation appended by an officer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficerNote {
    pub text: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

impl OfficerNote {
    pub fn new(text: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: author.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ratios derived from the canonical fields alongside the explanation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub total_income: f64,
    pub monthly_payment: f64,
    pub dti_ratio: f64,
    pub loan_to_income_ratio: f64,
}

impl DerivedMetrics {
    pub fn from_fields(fields: &ExtractedFields) -> Self {
        let total_income = fields.total_income();
        let loan_amount = fields.loan_amount_full();

        let monthly_payment = if fields.loan_term_months > 0.0 {
            loan_amount / fields.loan_term_months
        } else {
            0.0
        };

        let (dti_ratio, loan_to_income_ratio) = if total_income > 0.0 {
            (
                monthly_payment / total_income * 100.0,
                loan_amount / (total_income * 12.0) * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            total_income,
            monthly_payment,
            dti_ratio,
            loan_to_income_ratio,
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("total_income".to_string(), round2(self.total_income)),
            ("monthly_payment".to_string(), round2(self.monthly_payment)),
            ("dti_ratio".to_string(), round2(self.dti_ratio)),
            (
                "loan_to_income_ratio".to_string(),
                round2(self.loan_to_income_ratio),
            ),
        ])
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Stored decision record for a signed, processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub original_id: Option<String>,
    pub applicant_name: String,
    pub source_name: String,
    pub fields: ExtractedFields,
    pub decision: LoanDecision,
    pub explanation: String,
    pub metrics: BTreeMap<String, f64>,
    pub signature: SignatureVerdict,
    pub status: ApplicationStatus,
    pub officer_notes: Vec<OfficerNote>,
    pub created_at: DateTime<Utc>,
}

impl ApplicationRecord {
    /// Identifier shown to officers: the document's own reference when present.
    pub fn display_id(&self) -> &str {
        self.original_id
            .as_deref()
            .unwrap_or(self.application_id.as_str())
    }

    pub fn summary_view(&self) -> ApplicationSummaryView {
        ApplicationSummaryView {
            application_id: self.display_id().to_string(),
            reference_id: self.application_id.clone(),
            applicant_name: self.applicant_name.clone(),
            decision: self.decision,
            income: self.fields.applicant_income,
            loan_amount: self.fields.loan_amount_full(),
            created_at: self.created_at,
            status: self.status.label(),
            signature_verified: self.signature.verified,
            signature_confidence: self.signature.confidence,
        }
    }
}

/// Listing row returned to dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummaryView {
    pub application_id: String,
    pub reference_id: ApplicationId,
    pub applicant_name: String,
    pub decision: LoanDecision,
    pub income: f64,
    pub loan_amount: f64,
    pub created_at: DateTime<Utc>,
    pub status: &'static str,
    pub signature_verified: bool,
    pub signature_confidence: f64,
}
