use loan_desk::config::{AppConfig, ConfigError};
use loan_desk::error::AppError;
use loan_desk::intake::{
    AnthropicExplainer, Explainer, HttpClassifier, InMemoryApplicationStore, LoanIntakeService,
    PopplerTools, SignatureCalibration, UnavailableExplainer,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the pipeline from configuration: HTTP classifier, explainer (or its fallback stand-in),
/// poppler paths, and a fresh in-memory store.
pub(crate) fn build_service(config: &AppConfig) -> Result<LoanIntakeService, AppError> {
    let collaborators = &config.collaborators;
    let classifier_url = collaborators
        .classifier_url
        .as_deref()
        .ok_or(ConfigError::MissingClassifier)?;
    let classifier = HttpClassifier::new(classifier_url, collaborators.timeout)?;

    let explainer: Arc<dyn Explainer> = match collaborators.anthropic_api_key.as_deref() {
        Some(key) => Arc::new(AnthropicExplainer::new(
            key,
            collaborators.explainer_model.as_str(),
            collaborators.timeout,
        )?),
        None => {
            warn!("ANTHROPIC_API_KEY not set; explanations will use fallback text");
            Arc::new(UnavailableExplainer)
        }
    };

    let calibration = SignatureCalibration {
        render_dpi: config.intake.render_dpi,
        ..SignatureCalibration::default()
    };

    Ok(LoanIntakeService::new(
        Arc::new(classifier),
        explainer,
        Arc::new(InMemoryApplicationStore::new()),
    )
    .with_calibration(calibration)
    .with_tools(PopplerTools::from_config(&config.intake)))
}
