//! Explanation generator contract and its Messages API adapter.
//!
//! The generated text is opaque to the pipeline: nothing here parses it beyond cleanup of
//! formatting artefacts.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ApplicationRecord, DerivedMetrics, ExtractedFields, LoanDecision};

/// Risk assessment narrative. Ratios are derived by the pipeline, never taken from here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub text: String,
}

impl Explanation {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Substitute used whenever the generator fails.
    pub fn fallback(decision: LoanDecision) -> Self {
        Self::new(format!(
            "**Decision: {decision}**\n\nUnable to generate detailed risk assessment at this time. Please review application manually."
        ))
    }
}

pub const QUESTION_FALLBACK: &str = "I apologize, but I'm having trouble processing your question right now. Please try again or contact technical support.";
pub const ALTERNATIVES_FALLBACK: &str = "Unable to generate alternative terms at this time.";

pub trait Explainer: Send + Sync {
    fn generate_explanation(
        &self,
        fields: &ExtractedFields,
        decision: LoanDecision,
    ) -> Result<Explanation, ExplainerError>;

    fn answer_question(
        &self,
        question: &str,
        application: &ApplicationRecord,
    ) -> Result<String, ExplainerError>;

    fn suggest_alternatives(
        &self,
        fields: &ExtractedFields,
        decision: LoanDecision,
    ) -> Result<String, ExplainerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExplainerError {
    #[error("explainer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("explainer returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("explainer response contained no text")]
    EmptyResponse,
    #[error("explainer not configured")]
    NotConfigured,
}

/// Stand-in used when no credentials are configured; every call degrades to the fallback text.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableExplainer;

impl Explainer for UnavailableExplainer {
    fn generate_explanation(
        &self,
        _fields: &ExtractedFields,
        _decision: LoanDecision,
    ) -> Result<Explanation, ExplainerError> {
        Err(ExplainerError::NotConfigured)
    }

    fn answer_question(
        &self,
        _question: &str,
        _application: &ApplicationRecord,
    ) -> Result<String, ExplainerError> {
        Err(ExplainerError::NotConfigured)
    }

    fn suggest_alternatives(
        &self,
        _fields: &ExtractedFields,
        _decision: LoanDecision,
    ) -> Result<String, ExplainerError> {
        Err(ExplainerError::NotConfigured)
    }
}

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicExplainer {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicExplainer {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExplainerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: MESSAGES_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, ExplainerError> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExplainerError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response.json()?;
        let text = parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or(ExplainerError::EmptyResponse)?;

        Ok(clean_text(&text).trim().to_string())
    }
}

impl Explainer for AnthropicExplainer {
    fn generate_explanation(
        &self,
        fields: &ExtractedFields,
        decision: LoanDecision,
    ) -> Result<Explanation, ExplainerError> {
        let metrics = DerivedMetrics::from_fields(fields);
        let text = self.complete(&assessment_prompt(fields, &metrics, decision), 1000)?;
        Ok(Explanation::new(text))
    }

    fn answer_question(
        &self,
        question: &str,
        application: &ApplicationRecord,
    ) -> Result<String, ExplainerError> {
        self.complete(&question_prompt(question, application), 600)
    }

    fn suggest_alternatives(
        &self,
        fields: &ExtractedFields,
        _decision: LoanDecision,
    ) -> Result<String, ExplainerError> {
        self.complete(&alternatives_prompt(fields), 600)
    }
}

fn describe_fields(fields: &ExtractedFields, metrics: &DerivedMetrics) -> String {
    let property = match fields.property_area as u8 {
        1 => "Semiurban",
        2 => "Rural",
        _ => "Urban",
    };
    format!(
        "- Applicant Income: RM {:.2}/month\n\
         - Co-applicant Income: RM {:.2}/month\n\
         - Total Household Income: RM {:.2}/month\n\
         - Loan Amount Requested: RM {:.2}\n\
         - Loan Term: {} months\n\
         - Monthly Payment (approx): RM {:.2}\n\
         - Debt-to-Income Ratio: {:.1}%\n\
         - Credit History: {}\n\
         - Employment Status: {}\n\
         - Education Level: {}\n\
         - Married: {}\n\
         - Number of Dependents: {}\n\
         - Property Location: {}",
        fields.applicant_income,
        fields.coapplicant_income,
        metrics.total_income,
        fields.loan_amount_full(),
        fields.loan_term_months,
        metrics.monthly_payment,
        metrics.dti_ratio,
        if fields.has_good_credit() {
            "Good Standing"
        } else {
            "Poor Standing"
        },
        if fields.self_employed == 0.0 {
            "Self-Employed"
        } else {
            "Employed"
        },
        if fields.education == 0.0 {
            "Graduate"
        } else {
            "Not Graduate"
        },
        if fields.married == 1.0 { "Yes" } else { "No" },
        fields.dependents,
        property,
    )
}

fn assessment_prompt(
    fields: &ExtractedFields,
    metrics: &DerivedMetrics,
    decision: LoanDecision,
) -> String {
    format!(
        "You are providing decision support to a bank loan officer reviewing a loan application.\n\n\
         APPLICATION DATA:\n{}\n\n\
         MODEL DECISION: {decision}\n\n\
         Write a professional risk assessment with the sections: Risk Assessment Summary, Key Risk \
         Factors, Positive Factors, Financial Analysis (comment on the {:.1}% DTI ratio against a \
         40% industry threshold), Recommendation (APPROVE / REJECT / CONDITIONAL APPROVAL) and \
         Officer Notes. Keep it objective and data-driven; this is for internal bank use.",
        describe_fields(fields, metrics),
        metrics.dti_ratio,
    )
}

fn question_prompt(question: &str, application: &ApplicationRecord) -> String {
    let metrics = DerivedMetrics::from_fields(&application.fields);
    format!(
        "You are helping a bank loan officer analyze a loan application.\n\n\
         OFFICER'S QUESTION: \"{question}\"\n\n\
         APPLICATION SUMMARY:\n- Decision: {}\n{}\n\n\
         PREVIOUS RISK ASSESSMENT:\n{}\n\n\
         Answer clearly and concisely (at most five short paragraphs), include numbers where \
         relevant and suggest next steps if applicable.",
        application.decision,
        describe_fields(&application.fields, &metrics),
        application.explanation,
    )
}

fn alternatives_prompt(fields: &ExtractedFields) -> String {
    let metrics = DerivedMetrics::from_fields(fields);
    format!(
        "You are helping a loan officer find alternatives for a rejected loan application.\n\n\
         CURRENT APPLICATION:\n{}\n\n\
         Suggest three options: a reduced loan amount sized to a 30% DTI ratio, an extended loan \
         term, and additional requirements such as a co-signer or collateral. Give specific \
         numbers and the trade-offs of each option.",
        describe_fields(fields, &metrics),
    )
}

fn cleanup_patterns() -> &'static [(Regex, &'static str); 4] {
    static PATTERNS: OnceLock<[(Regex, &'static str); 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| {
            Regex::new(pattern).unwrap_or_else(|err| panic!("invalid cleanup pattern: {err}"))
        };
        [
            (compile(r"<[^>]+>"), ""),
            (compile(r"(?s)```.*?```"), ""),
            (compile(r"\n{3,}"), "\n\n"),
            (compile(r"\.([A-Z])"), ". $1"),
        ]
    })
}

/// Strip HTML tags and code fences, collapse blank runs, and space sentence boundaries.
pub fn clean_text(text: &str) -> String {
    cleanup_patterns()
        .iter()
        .fold(text.to_string(), |acc, (regex, replacement)| {
            regex.replace_all(&acc, *replacement).into_owned()
        })
}
