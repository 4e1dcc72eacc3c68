//! Loan application intake: signature screening, field extraction, scoring, explanation, and the
//! in-memory application registry officers review from.

pub mod analytics;
pub mod classifier;
pub mod document;
pub mod domain;
pub mod explainer;
pub mod export;
pub mod extraction;
pub mod repository;
pub mod router;
pub mod service;
pub mod signature;

#[cfg(test)]
mod tests;

pub use analytics::{AnalyticsAggregator, AnalyticsSummary};
pub use classifier::{Classifier, ClassifierError, HttpClassifier};
pub use document::{DocumentError, PageSource, PdfDocument, PopplerTools, Upload};
pub use domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, ApplicationSummaryView, DerivedMetrics,
    ExtractedFields, LoanDecision, OfficerNote, SignatureVerdict, UnknownStatus,
};
pub use explainer::{
    AnthropicExplainer, Explainer, ExplainerError, Explanation, UnavailableExplainer,
};
pub use export::{records_to_csv, ExportError};
pub use extraction::{Extraction, FieldExtractor};
pub use repository::{ApplicationRepository, InMemoryApplicationStore, RepositoryError};
pub use router::{intake_router, IntakeState};
pub use service::{
    AlternativeTerms, BatchEntry, BatchEntryStatus, BatchReport, IntakeError, LoanIntakeService,
    ProcessingOutcome,
};
pub use signature::{SignatureCalibration, SignatureVerifier};
