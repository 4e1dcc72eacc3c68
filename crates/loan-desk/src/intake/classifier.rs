use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{ExtractedFields, FIELD_VECTOR_LEN};

/// Binary approval model. Implementations own any scaling; the pipeline hands over the canonical
/// field vector untouched.
pub trait Classifier: Send + Sync {
    fn predict(&self, fields: &ExtractedFields) -> Result<u8, ClassifierError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classifier returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: &'a ExtractedFields,
    vector: [f64; FIELD_VECTOR_LEN],
}

#[derive(Deserialize)]
struct PredictResponse {
    label: u8,
}

/// Client for a model served over HTTP (`POST {url}` → `{"label": 0|1}`).
pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl Classifier for HttpClassifier {
    fn predict(&self, fields: &ExtractedFields) -> Result<u8, ClassifierError> {
        let request = PredictRequest {
            features: fields,
            vector: fields.to_vector(),
        };

        debug!(endpoint = %self.endpoint, "requesting classification");
        let response = self.client.post(&self.endpoint).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClassifierError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let PredictResponse { label } = response.json()?;
        Ok(label)
    }
}
