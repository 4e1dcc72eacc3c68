//! Labelled-value extraction from application page text.
//!
//! Every pattern runs independently against the whole text. A pattern that does not match leaves
//! its field "missing", which selects the documented default rather than failing the document.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::domain::ExtractedFields;

const DEFAULT_LOAN_TERM_MONTHS: f64 = 360.0;
const UNKNOWN_APPLICANT: &str = "Unknown";

/// Parsed document: canonical fields plus the identifiers found on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub fields: ExtractedFields,
    pub applicant_name: String,
    pub original_id: Option<String>,
    /// Labels whose pattern did not match, in pattern order.
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    ApplicationReference,
    FullName,
    IcNumber,
    Gender,
    MaritalStatus,
    Dependents,
    Education,
    Employment,
    ApplicantIncome,
    CoapplicantIncome,
    TotalIncome,
    LoanAmount,
    LoanTerm,
    CreditHistory,
    PropertyArea,
}

impl Label {
    const ALL: [Label; 15] = [
        Label::ApplicationReference,
        Label::FullName,
        Label::IcNumber,
        Label::Gender,
        Label::MaritalStatus,
        Label::Dependents,
        Label::Education,
        Label::Employment,
        Label::ApplicantIncome,
        Label::CoapplicantIncome,
        Label::TotalIncome,
        Label::LoanAmount,
        Label::LoanTerm,
        Label::CreditHistory,
        Label::PropertyArea,
    ];

    const fn key(self) -> &'static str {
        match self {
            Label::ApplicationReference => "application_id",
            Label::FullName => "full_name",
            Label::IcNumber => "ic_number",
            Label::Gender => "gender",
            Label::MaritalStatus => "marital_status",
            Label::Dependents => "dependents",
            Label::Education => "education",
            Label::Employment => "self_employed",
            Label::ApplicantIncome => "applicant_income",
            Label::CoapplicantIncome => "coapplicant_income",
            Label::TotalIncome => "total_income",
            Label::LoanAmount => "loan_amount",
            Label::LoanTerm => "loan_term",
            Label::CreditHistory => "credit_history",
            Label::PropertyArea => "property_area",
        }
    }

    const fn pattern(self) -> &'static str {
        match self {
            Label::ApplicationReference => r"(?i)Application Reference:[ \t]*(\S+)",
            Label::FullName => r"(?i)Full Name \(as per IC\):[ \t]*(.+)",
            Label::IcNumber => r"(?i)IC Number:[ \t]*([\d-]+)",
            Label::Gender => r"(?i)Gender:\s*(\w+)",
            Label::MaritalStatus => r"(?i)Marital Status:\s*(\w+)",
            Label::Dependents => r"(?i)Number of Dependents:\s*(\d+)",
            Label::Education => r"(?i)Education Level:\s*(.+?)(?:\n|Employment)",
            Label::Employment => r"(?i)Employment Status:\s*(.+?)(?:\n|Monthly)",
            Label::ApplicantIncome => {
                r"(?i)Monthly Income:\s*(?:RM|MYR|USD|\$)?\s*([\d,]+(?:\.\d+)?k?)"
            }
            Label::CoapplicantIncome => {
                r"(?i)Co-applicant Income:\s*(?:RM|MYR|USD|\$)?\s*([\d,]+(?:\.\d+)?k?)"
            }
            Label::TotalIncome => {
                r"(?i)Total Household Income:\s*(?:RM|MYR|USD|\$)?\s*([\d,]+(?:\.\d+)?k?)"
            }
            Label::LoanAmount => {
                r"(?i)Loan Amount Requested:\s*(?:RM|MYR|USD|\$)?\s*([\d,]+(?:\.\d+)?k?)"
            }
            Label::LoanTerm => r"(?i)Loan Tenure:\s*(\d+)\s*months",
            Label::CreditHistory => r"(?i)Credit History Status:\s*(.+?)(?:\n|Property)",
            Label::PropertyArea => r"(?i)Property Location Type:\s*([\w-]+)",
        }
    }
}

fn patterns() -> &'static [(Label, Regex)] {
    static PATTERNS: OnceLock<Vec<(Label, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Label::ALL
            .iter()
            .map(|label| {
                let regex = Regex::new(label.pattern())
                    .unwrap_or_else(|err| panic!("invalid pattern for {}: {err}", label.key()));
                (*label, regex)
            })
            .collect()
    })
}

/// Raw captures keyed by label; `None` means the pattern did not match.
struct Captures<'t> {
    values: Vec<(Label, Option<&'t str>)>,
}

impl<'t> Captures<'t> {
    fn scan(text: &'t str) -> Self {
        let values = patterns()
            .iter()
            .map(|(label, regex)| {
                let value = regex
                    .captures(text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim())
                    .filter(|value| !value.is_empty());
                (*label, value)
            })
            .collect();
        Self { values }
    }

    fn get(&self, label: Label) -> Option<&'t str> {
        self.values
            .iter()
            .find(|(candidate, _)| *candidate == label)
            .and_then(|(_, value)| *value)
    }

    fn missing(&self) -> Vec<&'static str> {
        self.values
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(label, _)| label.key())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldExtractor;

impl FieldExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Total over arbitrary text; identical input yields an identical extraction.
    pub fn extract(&self, text: &str) -> Extraction {
        let captures = Captures::scan(text);
        let missing = captures.missing();
        for key in &missing {
            debug!(field = key, "field missing, default applied");
        }

        let fields = ExtractedFields {
            gender: map_gender(captures.get(Label::Gender).unwrap_or("Male")),
            married: map_married(captures.get(Label::MaritalStatus).unwrap_or("Single")),
            dependents: captures
                .get(Label::Dependents)
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(0),
            education: map_education(captures.get(Label::Education).unwrap_or("Graduate")),
            self_employed: map_self_employed(
                captures.get(Label::Employment).unwrap_or("Employed"),
            ),
            applicant_income: captures
                .get(Label::ApplicantIncome)
                .map_or(0.0, |raw| clean_number(raw, 0.0)),
            coapplicant_income: captures
                .get(Label::CoapplicantIncome)
                .map_or(0.0, |raw| clean_number(raw, 0.0)),
            loan_amount: normalize_loan_amount(
                captures
                    .get(Label::LoanAmount)
                    .map_or(0.0, |raw| clean_number(raw, 0.0)),
            ),
            loan_term_months: captures
                .get(Label::LoanTerm)
                .map(|raw| clean_number(raw, DEFAULT_LOAN_TERM_MONTHS))
                .filter(|term| *term > 0.0)
                .unwrap_or(DEFAULT_LOAN_TERM_MONTHS),
            credit_history: map_credit_history(
                captures.get(Label::CreditHistory).unwrap_or("Good"),
            ),
            property_area: map_property_area(captures.get(Label::PropertyArea).unwrap_or("Urban")),
        };

        Extraction {
            fields,
            applicant_name: captures
                .get(Label::FullName)
                .unwrap_or(UNKNOWN_APPLICANT)
                .to_string(),
            original_id: captures.get(Label::ApplicationReference).map(str::to_string),
            missing,
        }
    }
}

fn map_gender(value: &str) -> f64 {
    if value.eq_ignore_ascii_case("male") {
        1.0
    } else {
        0.0
    }
}

fn map_married(value: &str) -> f64 {
    if value.eq_ignore_ascii_case("married") {
        1.0
    } else {
        0.0
    }
}

fn map_education(value: &str) -> f64 {
    let lowered = value.to_lowercase();
    if lowered.contains("graduate") && !lowered.contains("not") {
        0.0
    } else {
        1.0
    }
}

fn map_self_employed(value: &str) -> f64 {
    if value.to_lowercase().contains("self") {
        0.0
    } else {
        1.0
    }
}

fn map_credit_history(value: &str) -> f64 {
    if value.to_lowercase().contains("good") {
        1.0
    } else {
        0.0
    }
}

fn map_property_area(value: &str) -> f64 {
    let normalized: String = value
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '_'))
        .collect::<String>()
        .to_lowercase();
    match normalized.as_str() {
        "semiurban" => 1.0,
        "rural" => 2.0,
        _ => 0.0,
    }
}

/// Strip separators, currency prefixes and a trailing `k` before parsing.
pub(crate) fn clean_number(raw: &str, default: f64) -> f64 {
    let mut cleaned = raw.replace(',', "");
    for prefix in ["RM", "MYR", "USD", "$"] {
        cleaned = cleaned.replace(prefix, "");
    }
    let cleaned = cleaned.trim().trim_end_matches(['k', 'K']).trim();
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => default,
    }
}

/// Amounts above 1000 are full currency and are scaled to thousands; 1000 and below are
/// already in thousands.
pub(crate) fn normalize_loan_amount(parsed: f64) -> f64 {
    if parsed > 1000.0 {
        parsed / 1000.0
    } else {
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = "\
LOAN APPLICATION FORM
Application Reference: MYS20241000
Full Name (as per IC): Nur Aisyah binti Rahman
IC Number: 900101-14-5678
Gender: Female
Marital Status: Married
Number of Dependents: 2
Education Level: Graduate
Employment Status: Self-Employed
Monthly Income: RM 6,500
Co-applicant Income: RM 2,000
Total Household Income: RM 8,500
Loan Amount Requested: RM 350,000
Loan Tenure: 240 months
Credit History Status: Good Standing
Property Location Type: Semiurban
Applicant Signature: Digitally signed
";

    #[test]
    fn extracts_all_labelled_fields() {
        let extraction = FieldExtractor::new().extract(SAMPLE_PAGE);
        let fields = extraction.fields;

        assert_eq!(extraction.original_id.as_deref(), Some("MYS20241000"));
        assert_eq!(extraction.applicant_name, "Nur Aisyah binti Rahman");
        assert!(extraction.missing.is_empty(), "{:?}", extraction.missing);
        assert_eq!(fields.gender, 0.0);
        assert_eq!(fields.married, 1.0);
        assert_eq!(fields.dependents, 2);
        assert_eq!(fields.education, 0.0);
        assert_eq!(fields.self_employed, 0.0);
        assert_eq!(fields.applicant_income, 6500.0);
        assert_eq!(fields.coapplicant_income, 2000.0);
        assert_eq!(fields.loan_amount, 350.0);
        assert_eq!(fields.loan_term_months, 240.0);
        assert_eq!(fields.credit_history, 1.0);
        assert_eq!(fields.property_area, 1.0);
    }

    #[test]
    fn empty_text_yields_documented_defaults() {
        let extraction = FieldExtractor::new().extract("");
        let fields = extraction.fields;

        assert_eq!(extraction.applicant_name, "Unknown");
        assert!(extraction.original_id.is_none());
        assert_eq!(extraction.missing.len(), Label::ALL.len());
        assert_eq!(fields.gender, 1.0);
        assert_eq!(fields.married, 0.0);
        assert_eq!(fields.dependents, 0);
        assert_eq!(fields.education, 0.0);
        assert_eq!(fields.self_employed, 1.0);
        assert_eq!(fields.applicant_income, 0.0);
        assert_eq!(fields.loan_amount, 0.0);
        assert_eq!(fields.loan_term_months, 360.0);
        assert_eq!(fields.credit_history, 1.0);
        assert_eq!(fields.property_area, 0.0);
    }

    #[test]
    fn extraction_is_idempotent() {
        let extractor = FieldExtractor::new();
        let first = extractor.extract(SAMPLE_PAGE);
        let second = extractor.extract(SAMPLE_PAGE);
        assert_eq!(first, second);
        assert_eq!(
            first.fields.to_vector().map(f64::to_bits),
            second.fields.to_vector().map(f64::to_bits)
        );
    }

    #[test]
    fn loan_amount_boundary_is_strictly_above_one_thousand() {
        let extractor = FieldExtractor::new();
        let amount = |literal: &str| {
            extractor
                .extract(&format!("Loan Amount Requested: RM {literal}\n"))
                .fields
                .loan_amount
        };

        assert_eq!(amount("350,000"), 350.0);
        assert_eq!(amount("350"), 350.0);
        assert_eq!(amount("1000"), 1000.0);
        assert_eq!(amount("1,001"), 1.001);
    }

    #[test]
    fn not_graduate_and_poor_credit_map_to_one_and_zero() {
        let text = "Education Level: Not Graduate\nCredit History Status: Poor\nProperty Location Type: Rural\n";
        let fields = FieldExtractor::new().extract(text).fields;
        assert_eq!(fields.education, 1.0);
        assert_eq!(fields.credit_history, 0.0);
        assert_eq!(fields.property_area, 2.0);
    }

    #[test]
    fn hyphenated_property_area_is_recognised() {
        let fields = FieldExtractor::new()
            .extract("Property Location Type: Semi-Urban\n")
            .fields;
        assert_eq!(fields.property_area, 1.0);
    }

    #[test]
    fn zero_tenure_falls_back_to_default_term() {
        let fields = FieldExtractor::new()
            .extract("Loan Tenure: 0 months\n")
            .fields;
        assert_eq!(fields.loan_term_months, 360.0);
    }

    #[test]
    fn clean_number_strips_currency_and_suffixes() {
        assert_eq!(clean_number("RM 12,500", 0.0), 12500.0);
        assert_eq!(clean_number("$4,250.50", 0.0), 4250.5);
        assert_eq!(clean_number("85k", 0.0), 85.0);
        assert_eq!(clean_number("n/a", 360.0), 360.0);
    }
}
