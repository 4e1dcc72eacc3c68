use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::analytics::{AnalyticsAggregator, AnalyticsSummary};
use super::classifier::{Classifier, ClassifierError};
use super::document::{DocumentError, PageSource, PdfDocument, PopplerTools, Upload};
use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, DerivedMetrics, ExtractedFields,
    LoanDecision, OfficerNote, SignatureVerdict,
};
use super::explainer::{Explainer, Explanation, ALTERNATIVES_FALLBACK, QUESTION_FALLBACK};
use super::extraction::FieldExtractor;
use super::repository::{ApplicationRepository, RepositoryError};
use super::signature::{SignatureCalibration, SignatureVerifier};

const NOT_ASSIGNED: &str = "N/A";
const UNKNOWN_APPLICANT: &str = "Unknown";
const MISSING_SIGNATURE_MESSAGE: &str = "**Document Incomplete - Missing Signature**\n\nThe application cannot be processed because the document lacks a valid signature. Please request the applicant to sign and resubmit the application.";
const ALREADY_APPROVED_MESSAGE: &str = "Application already approved. No alternative terms needed.";

/// Per-document pipeline result returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOutcome {
    pub application_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_application_id: Option<String>,
    pub applicant_name: String,
    pub decision: LoanDecision,
    pub signature_verified: bool,
    pub signature_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<ExtractedFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_metrics: Option<BTreeMap<String, f64>>,
    pub explanation: String,
}

impl ProcessingOutcome {
    fn incomplete(verdict: SignatureVerdict) -> Self {
        Self {
            application_id: NOT_ASSIGNED.to_string(),
            original_application_id: None,
            applicant_name: UNKNOWN_APPLICANT.to_string(),
            decision: LoanDecision::Incomplete,
            signature_verified: false,
            signature_confidence: verdict.confidence,
            extracted_fields: None,
            derived_metrics: None,
            explanation: MISSING_SIGNATURE_MESSAGE.to_string(),
        }
    }

    fn from_record(record: &ApplicationRecord) -> Self {
        Self {
            application_id: record.application_id.0.clone(),
            original_application_id: record.original_id.clone(),
            applicant_name: record.applicant_name.clone(),
            decision: record.decision,
            signature_verified: record.signature.verified,
            signature_confidence: record.signature.confidence,
            extracted_fields: Some(record.fields),
            derived_metrics: Some(record.metrics.clone()),
            explanation: record.explanation.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchEntryStatus {
    Success,
    Incomplete,
    Error,
}

/// One document's slot in a batch report, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub document: String,
    pub status: BatchEntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProcessingOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub incomplete: usize,
    pub approved: usize,
    pub rejected: usize,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    fn push(&mut self, document: String, result: Result<ProcessingOutcome, IntakeError>) {
        self.total += 1;
        let entry = match result {
            Ok(outcome) => {
                let status = match outcome.decision {
                    LoanDecision::Incomplete => {
                        self.incomplete += 1;
                        BatchEntryStatus::Incomplete
                    }
                    LoanDecision::Approved => {
                        self.successful += 1;
                        self.approved += 1;
                        BatchEntryStatus::Success
                    }
                    LoanDecision::Rejected => {
                        self.successful += 1;
                        self.rejected += 1;
                        BatchEntryStatus::Success
                    }
                };
                BatchEntry {
                    document,
                    status,
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Err(err) => {
                self.failed += 1;
                BatchEntry {
                    document,
                    status: BatchEntryStatus::Error,
                    outcome: None,
                    error: Some(err.to_string()),
                }
            }
        };
        self.entries.push(entry);
    }
}

/// Officer-facing answer for a rejected application's alternatives.
#[derive(Debug, Clone, Serialize)]
pub struct AlternativeTerms {
    pub application_id: String,
    pub original_decision: LoanDecision,
    pub alternative_terms: String,
}

/// Sequences signature verification, extraction, scoring and explanation, then stores the record.
pub struct LoanIntakeService {
    verifier: SignatureVerifier,
    extractor: FieldExtractor,
    tools: PopplerTools,
    classifier: Arc<dyn Classifier>,
    explainer: Arc<dyn Explainer>,
    repository: Arc<dyn ApplicationRepository>,
}

impl LoanIntakeService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        explainer: Arc<dyn Explainer>,
        repository: Arc<dyn ApplicationRepository>,
    ) -> Self {
        Self {
            verifier: SignatureVerifier::default(),
            extractor: FieldExtractor::new(),
            tools: PopplerTools::default(),
            classifier,
            explainer,
            repository,
        }
    }

    pub fn with_calibration(mut self, calibration: SignatureCalibration) -> Self {
        self.verifier = SignatureVerifier::new(calibration);
        self
    }

    pub fn with_tools(mut self, tools: PopplerTools) -> Self {
        self.tools = tools;
        self
    }

    pub fn repository(&self) -> &Arc<dyn ApplicationRepository> {
        &self.repository
    }

    /// Run one document through the pipeline.
    ///
    /// Unsigned documents short-circuit to an `Incomplete` outcome without touching the
    /// classifier, explainer or store.
    pub fn process(&self, document: &dyn PageSource) -> Result<ProcessingOutcome, IntakeError> {
        let text = document.first_page_text();
        let verdict = self.verifier.verify_with_text(document, text.as_deref());
        if !verdict.verified {
            warn!(
                document = document.name(),
                confidence = verdict.confidence,
                "signature missing, application marked incomplete"
            );
            return Ok(ProcessingOutcome::incomplete(verdict));
        }

        // A page can be signed off from its rendering alone; extraction still needs the text.
        let text = match text {
            Ok(text) => text,
            Err(_) => document.first_page_text()?,
        };
        let extraction = self.extractor.extract(&text);
        if let Some(original_id) = extraction.original_id.as_deref() {
            self.ensure_unregistered(original_id)?;
        }
        let fields = extraction.fields;

        let label = self.classifier.predict(&fields)?;
        let decision = if label == 1 {
            LoanDecision::Approved
        } else {
            LoanDecision::Rejected
        };

        let explanation = self
            .explainer
            .generate_explanation(&fields, decision)
            .unwrap_or_else(|err| {
                warn!(document = document.name(), error = %err, "explainer failed, using fallback assessment");
                Explanation::fallback(decision)
            });
        let metrics = DerivedMetrics::from_fields(&fields);

        let record = ApplicationRecord {
            application_id: ApplicationId::generate(),
            original_id: extraction.original_id,
            applicant_name: extraction.applicant_name,
            source_name: document.name().to_string(),
            fields,
            decision,
            explanation: explanation.text,
            metrics: metrics.to_map(),
            signature: verdict,
            status: ApplicationStatus::PendingReview,
            officer_notes: Vec::new(),
            created_at: Utc::now(),
        };

        let stored = self.repository.insert(record)?;
        info!(
            document = document.name(),
            application_id = %stored.application_id,
            original_id = stored.original_id.as_deref().unwrap_or("-"),
            decision = decision.label(),
            "application processed"
        );

        Ok(ProcessingOutcome::from_record(&stored))
    }

    /// Reject a reused reference before the classifier and explainer are called. `insert`
    /// still guards against a concurrent registration of the same reference.
    fn ensure_unregistered(&self, original_id: &str) -> Result<(), IntakeError> {
        match self.repository.lookup(original_id) {
            Ok(_) => Err(RepositoryError::Conflict(original_id.to_string()).into()),
            Err(RepositoryError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Validate raw bytes as a PDF and process it.
    pub fn process_upload(&self, upload: &Upload) -> Result<ProcessingOutcome, IntakeError> {
        let document = PdfDocument::from_bytes(&upload.name, &upload.bytes, self.tools.clone())?;
        self.process(&document)
    }

    /// Process documents sequentially; a failure is recorded against its own entry only.
    pub fn process_batch<P: PageSource>(&self, documents: &[P]) -> BatchReport {
        self.run_batch(documents, |document| document.name().to_string(), |document| {
            self.process(document)
        })
    }

    pub fn process_upload_batch(&self, uploads: &[Upload]) -> BatchReport {
        self.run_batch(
            uploads,
            |upload| upload.name.clone(),
            |upload| self.process_upload(upload),
        )
    }

    fn run_batch<T, N, F>(&self, items: &[T], name: N, run: F) -> BatchReport
    where
        N: Fn(&T) -> String,
        F: Fn(&T) -> Result<ProcessingOutcome, IntakeError>,
    {
        let mut report = BatchReport::default();
        for item in items {
            let document = name(item);
            let result = run(item);
            if let Err(err) = &result {
                warn!(document = %document, error = %err, "batch document failed");
            }
            report.push(document, result);
        }

        info!(
            total = report.total,
            successful = report.successful,
            approved = report.approved,
            rejected = report.rejected,
            "batch processing complete"
        );
        report
    }

    pub fn get(&self, id: &str) -> Result<ApplicationRecord, IntakeError> {
        Ok(self.repository.lookup(id)?)
    }

    pub fn list(
        &self,
        decision_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, IntakeError> {
        Ok(self.repository.list(decision_filter, limit)?)
    }

    pub fn add_note(&self, id: &str, text: &str, author: &str) -> Result<OfficerNote, IntakeError> {
        let note = OfficerNote::new(text.trim(), author.trim());
        self.repository.append_note(id, note.clone())?;
        Ok(note)
    }

    pub fn update_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, IntakeError> {
        Ok(self.repository.update_status(id, status)?)
    }

    pub fn ask(&self, id: &str, question: &str) -> Result<String, IntakeError> {
        let record = self.repository.lookup(id)?;
        Ok(self
            .explainer
            .answer_question(question, &record)
            .unwrap_or_else(|err| {
                warn!(application_id = id, error = %err, "explainer failed to answer question");
                QUESTION_FALLBACK.to_string()
            }))
    }

    pub fn alternatives(&self, id: &str) -> Result<AlternativeTerms, IntakeError> {
        let record = self.repository.lookup(id)?;
        let alternative_terms = if record.decision == LoanDecision::Approved {
            ALREADY_APPROVED_MESSAGE.to_string()
        } else {
            self.explainer
                .suggest_alternatives(&record.fields, record.decision)
                .unwrap_or_else(|err| {
                    warn!(application_id = id, error = %err, "explainer failed to suggest alternatives");
                    ALTERNATIVES_FALLBACK.to_string()
                })
        };

        Ok(AlternativeTerms {
            application_id: id.to_string(),
            original_decision: record.decision,
            alternative_terms,
        })
    }

    pub fn summary(&self) -> Result<AnalyticsSummary, IntakeError> {
        Ok(AnalyticsAggregator::new(self.repository.as_ref()).summarize()?)
    }
}

/// Error raised by the intake service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
