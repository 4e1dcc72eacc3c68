//! Signed/unsigned classification for the first page of an application.
//!
//! Explicit text markers win. Without a marker the page is rendered and the ink density of the
//! bottom band (where the applicant signs) decides. The heuristic never fails: every error path
//! collapses into a verdict.
//!
//! The calibration constants are carried over from observed behavior and have not been fitted
//! against labelled documents.

use image::GrayImage;
use tracing::{debug, warn};

use super::document::{DocumentError, PageSource};
use super::domain::SignatureVerdict;

const UNSIGNED_MARKER: &str = "Unsigned";
const BRACKETED_UNSIGNED_MARKER: &str = "[ Unsigned ]";
const DIGITAL_SIGNATURE_MARKER: &str = "Digitally signed";
const CHECKMARK_GLYPH: char = '\u{2713}';

const UNSIGNED_MARKER_VERDICT: SignatureVerdict = SignatureVerdict::new(false, 25.0);
const SIGNED_MARKER_VERDICT: SignatureVerdict = SignatureVerdict::new(true, 95.0);
const FALLBACK_UNSIGNED_VERDICT: SignatureVerdict = SignatureVerdict::new(false, 20.0);
const FALLBACK_SIGNED_VERDICT: SignatureVerdict = SignatureVerdict::new(true, 90.0);

/// Rendering and thresholding parameters for the ink-density stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureCalibration {
    pub render_dpi: u32,
    /// Fraction of the page height, measured from the bottom, treated as the signature zone.
    pub zone_fraction: f64,
    /// Pixels at or below this intensity count as ink.
    pub ink_cutoff: u8,
}

impl Default for SignatureCalibration {
    fn default() -> Self {
        Self {
            render_dpi: 150,
            zone_fraction: 0.30,
            ink_cutoff: 200,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    calibration: SignatureCalibration,
}

impl SignatureVerifier {
    pub fn new(calibration: SignatureCalibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> SignatureCalibration {
        self.calibration
    }

    pub fn verify(&self, page: &dyn PageSource) -> SignatureVerdict {
        let text = page.first_page_text();
        self.verify_with_text(page, text.as_deref())
    }

    /// Classify a page whose text layer the caller has already read.
    ///
    /// The page is only touched again to render it, or to re-read the text after rendering
    /// failed when the first read had failed too.
    pub fn verify_with_text(
        &self,
        page: &dyn PageSource,
        text: Result<&str, &DocumentError>,
    ) -> SignatureVerdict {
        match text {
            Ok(text) => {
                if let Some(verdict) = marker_verdict(text) {
                    debug!(document = page.name(), ?verdict, "signature marker found");
                    return verdict;
                }
            }
            Err(err) => {
                warn!(document = page.name(), error = %err, "page text unavailable for signature markers");
            }
        }

        match page.render_first_page(self.calibration.render_dpi) {
            Ok(image) => match ink_ratio(&image, &self.calibration) {
                Some(ratio) => {
                    let verdict = verdict_for_ink_ratio(ratio);
                    debug!(
                        document = page.name(),
                        ink_ratio = ratio,
                        verified = verdict.verified,
                        confidence = verdict.confidence,
                        "signature zone analysed"
                    );
                    verdict
                }
                None => SignatureVerdict::no_signal(),
            },
            Err(err) => {
                warn!(document = page.name(), error = %err, "page rasterization failed, retrying text markers");
                let verdict = match text {
                    Ok(text) => fallback_marker_verdict(text),
                    Err(_) => page
                        .first_page_text()
                        .ok()
                        .and_then(|text| fallback_marker_verdict(&text)),
                };
                verdict.unwrap_or_else(SignatureVerdict::no_signal)
            }
        }
    }
}

/// Stage one: explicit markers. The unsigned marker is checked first.
pub fn marker_verdict(text: &str) -> Option<SignatureVerdict> {
    if text.contains(UNSIGNED_MARKER) {
        Some(UNSIGNED_MARKER_VERDICT)
    } else if text.contains(DIGITAL_SIGNATURE_MARKER) || text.contains(CHECKMARK_GLYPH) {
        Some(SIGNED_MARKER_VERDICT)
    } else {
        None
    }
}

fn fallback_marker_verdict(text: &str) -> Option<SignatureVerdict> {
    if text.contains(DIGITAL_SIGNATURE_MARKER) {
        Some(FALLBACK_SIGNED_VERDICT)
    } else if text.contains(BRACKETED_UNSIGNED_MARKER) {
        Some(FALLBACK_UNSIGNED_VERDICT)
    } else {
        None
    }
}

/// Fraction of ink pixels in the signature zone, or `None` when the zone is empty.
pub fn ink_ratio(image: &GrayImage, calibration: &SignatureCalibration) -> Option<f64> {
    let (width, height) = image.dimensions();
    let zone_start = (f64::from(height) * (1.0 - calibration.zone_fraction)) as u32;
    let zone_rows = height.saturating_sub(zone_start);
    let zone_pixels = u64::from(width) * u64::from(zone_rows);
    if zone_pixels == 0 {
        return None;
    }

    let ink_pixels = (zone_start..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .filter(|&(x, y)| image.get_pixel(x, y).0[0] <= calibration.ink_cutoff)
        .count() as u64;

    Some(ink_pixels as f64 / zone_pixels as f64)
}

/// Piecewise mapping from ink density to a verdict.
pub fn verdict_for_ink_ratio(ratio: f64) -> SignatureVerdict {
    if ratio > 0.02 {
        SignatureVerdict::new(true, (85.0 + ratio * 100.0).min(98.0))
    } else if ratio > 0.01 {
        SignatureVerdict::new(ratio > 0.015, 60.0 + ratio * 500.0)
    } else {
        SignatureVerdict::new(false, ratio * 3000.0)
    }
}
