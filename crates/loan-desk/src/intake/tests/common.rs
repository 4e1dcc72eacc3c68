use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use image::{GrayImage, Luma};
use serde_json::Value;

use crate::intake::classifier::{Classifier, ClassifierError};
use crate::intake::document::{DocumentError, PageSource};
use crate::intake::domain::{ApplicationRecord, ExtractedFields, LoanDecision};
use crate::intake::explainer::{Explainer, ExplainerError, Explanation};
use crate::intake::repository::InMemoryApplicationStore;
use crate::intake::{intake_router, LoanIntakeService};

pub(super) const CANNED_ASSESSMENT: &str = "Risk Assessment Summary: low risk.";
pub(super) const CANNED_ANSWER: &str = "The DTI ratio is within policy.";
pub(super) const CANNED_ALTERNATIVES: &str = "Option 1: reduce the loan to RM 200,000.";

pub(super) fn application_text(reference: &str, name: &str, signature_line: &str) -> String {
    format!(
        "LOAN APPLICATION FORM\n\
         Application Reference: {reference}\n\
         Full Name (as per IC): {name}\n\
         IC Number: 880412-10-2233\n\
         Gender: Male\n\
         Marital Status: Married\n\
         Number of Dependents: 1\n\
         Education Level: Graduate\n\
         Employment Status: Employed\n\
         Monthly Income: RM 6,000\n\
         Co-applicant Income: RM 2,000\n\
         Total Household Income: RM 8,000\n\
         Loan Amount Requested: RM 240,000\n\
         Loan Tenure: 240 months\n\
         Credit History Status: Good Standing\n\
         Property Location Type: Urban\n\
         Applicant Signature: {signature_line}\n"
    )
}

/// Scripted document: `None` makes the corresponding call fail like a missing poppler binary.
pub(super) struct FakePage {
    name: String,
    text: Option<String>,
    image: Option<GrayImage>,
    text_reads: AtomicUsize,
}

impl FakePage {
    pub(super) fn new(name: &str, text: Option<String>, image: Option<GrayImage>) -> Self {
        Self {
            name: name.to_string(),
            text,
            image,
            text_reads: AtomicUsize::new(0),
        }
    }

    pub(super) fn signed(name: &str, reference: &str) -> Self {
        Self::new(
            name,
            Some(application_text(reference, "Lim Chee Keong", "Digitally signed")),
            None,
        )
    }

    pub(super) fn unsigned(name: &str) -> Self {
        Self::new(
            name,
            Some(application_text("MYS-UNSIGNED", "Unsigned Applicant", "[ Unsigned ]")),
            None,
        )
    }

    /// No text markers at all; the verdict has to come from the rendered page.
    pub(super) fn scanned(name: &str, reference: &str, image: GrayImage) -> Self {
        Self::new(
            name,
            Some(application_text(reference, "Siti Hajar", "")),
            Some(image),
        )
    }

    pub(super) fn text_reads(&self) -> usize {
        self.text_reads.load(Ordering::SeqCst)
    }
}

impl PageSource for FakePage {
    fn name(&self) -> &str {
        &self.name
    }

    fn first_page_text(&self) -> Result<String, DocumentError> {
        self.text_reads.fetch_add(1, Ordering::SeqCst);
        self.text.clone().ok_or_else(|| DocumentError::Tool {
            tool: "pdftotext".to_string(),
            detail: "not scripted".to_string(),
        })
    }

    fn render_first_page(&self, _dpi: u32) -> Result<GrayImage, DocumentError> {
        self.image.clone().ok_or_else(|| DocumentError::Tool {
            tool: "pdftoppm".to_string(),
            detail: "not scripted".to_string(),
        })
    }
}

/// White page whose bottom band carries `ink_rows` fully dark rows.
pub(super) fn page_with_ink_rows(ink_rows: u32) -> GrayImage {
    let (width, height) = (100, 100);
    GrayImage::from_fn(width, height, |_, y| {
        if y >= height - ink_rows {
            Luma([10])
        } else {
            Luma([255])
        }
    })
}

/// Returns `label` for every call except the `fail_on`-th (1-based), which errors.
pub(super) struct ScriptedClassifier {
    label: u8,
    fail_on: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub(super) fn approving() -> Self {
        Self::new(1, None)
    }

    pub(super) fn rejecting() -> Self {
        Self::new(0, None)
    }

    pub(super) fn failing_on(call: usize) -> Self {
        Self::new(1, Some(call))
    }

    fn new(label: u8, fail_on: Option<usize>) -> Self {
        Self {
            label,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for ScriptedClassifier {
    fn predict(&self, _fields: &ExtractedFields) -> Result<u8, ClassifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(call) {
            return Err(ClassifierError::Unavailable("model offline".to_string()));
        }
        Ok(self.label)
    }
}

#[derive(Default)]
pub(super) struct CannedExplainer {
    calls: AtomicUsize,
}

impl CannedExplainer {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Explainer for CannedExplainer {
    fn generate_explanation(
        &self,
        _fields: &ExtractedFields,
        _decision: LoanDecision,
    ) -> Result<Explanation, ExplainerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Explanation::new(CANNED_ASSESSMENT))
    }

    fn answer_question(
        &self,
        _question: &str,
        _application: &ApplicationRecord,
    ) -> Result<String, ExplainerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CANNED_ANSWER.to_string())
    }

    fn suggest_alternatives(
        &self,
        _fields: &ExtractedFields,
        _decision: LoanDecision,
    ) -> Result<String, ExplainerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CANNED_ALTERNATIVES.to_string())
    }
}

pub(super) struct Harness {
    pub(super) service: LoanIntakeService,
    pub(super) store: Arc<InMemoryApplicationStore>,
    pub(super) classifier: Arc<ScriptedClassifier>,
    pub(super) explainer: Arc<CannedExplainer>,
}

pub(super) fn harness(classifier: ScriptedClassifier) -> Harness {
    let store = Arc::new(InMemoryApplicationStore::new());
    let classifier = Arc::new(classifier);
    let explainer = Arc::new(CannedExplainer::default());
    let service = LoanIntakeService::new(classifier.clone(), explainer.clone(), store.clone());
    Harness {
        service,
        store,
        classifier,
        explainer,
    }
}

pub(super) fn harness_with_explainer(
    classifier: ScriptedClassifier,
    explainer: Arc<dyn Explainer>,
) -> (LoanIntakeService, Arc<InMemoryApplicationStore>) {
    let store = Arc::new(InMemoryApplicationStore::new());
    let service = LoanIntakeService::new(Arc::new(classifier), explainer, store.clone());
    (service, store)
}

pub(super) fn router_for(service: LoanIntakeService, max_batch: usize) -> axum::Router {
    intake_router(Arc::new(service), max_batch)
}

pub(super) const BOUNDARY: &str = "loan-desk-test-boundary";

pub(super) fn multipart_body(field: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
                 Content-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}
