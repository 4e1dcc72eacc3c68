//! Uploaded document handling: byte validation, first-page text, and page rasterization.
//!
//! Text extraction and rendering shell out to poppler (`pdftotext` / `pdftoppm`) and decode the
//! rendered PNG with the `image` crate.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::GrayImage;
use tempfile::{NamedTempFile, TempDir};

use crate::config::IntakeConfig;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Errors raised while reading an uploaded document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("'{name}' is not a PDF document")]
    NotPdf { name: String },
    #[error("failed to stage document: {0}")]
    Io(#[from] std::io::Error),
    #[error("{tool} failed: {detail}")]
    Tool { tool: String, detail: String },
    #[error("rendered page could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}

/// Page-level access the pipeline needs from an ingested document.
pub trait PageSource {
    /// Name used in logs and batch reports (usually the uploaded filename).
    fn name(&self) -> &str;

    /// Text layer of the first page.
    fn first_page_text(&self) -> Result<String, DocumentError>;

    /// First page rendered to 8-bit grayscale at `dpi`.
    fn render_first_page(&self, dpi: u32) -> Result<GrayImage, DocumentError>;
}

/// Raw upload as received from a caller, before validation.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Poppler invocation settings shared by every ingested PDF.
#[derive(Debug, Clone)]
pub struct PopplerTools {
    pdftotext: PathBuf,
    pdftoppm: PathBuf,
}

impl PopplerTools {
    pub fn new(pdftotext: impl Into<PathBuf>, pdftoppm: impl Into<PathBuf>) -> Self {
        Self {
            pdftotext: pdftotext.into(),
            pdftoppm: pdftoppm.into(),
        }
    }

    pub fn from_config(config: &IntakeConfig) -> Self {
        Self::new(&config.pdftotext_bin, &config.pdftoppm_bin)
    }
}

impl Default for PopplerTools {
    fn default() -> Self {
        Self::new("pdftotext", "pdftoppm")
    }
}

/// A PDF upload staged to a temporary file so poppler can read it.
#[derive(Debug)]
pub struct PdfDocument {
    name: String,
    file: NamedTempFile,
    tools: PopplerTools,
}

impl PdfDocument {
    /// Validate the upload and stage it on disk. The temporary file is removed on drop.
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: &[u8],
        tools: PopplerTools,
    ) -> Result<Self, DocumentError> {
        let name = name.into();
        if !looks_like_pdf(bytes) {
            return Err(DocumentError::NotPdf { name });
        }

        let mut file = tempfile::Builder::new()
            .prefix("loan-desk-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        Ok(Self { name, file, tools })
    }

    pub fn open(path: &Path, tools: PopplerTools) -> Result<Self, DocumentError> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, &bytes, tools)
    }

    fn path(&self) -> &Path {
        self.file.path()
    }
}

impl PageSource for PdfDocument {
    fn name(&self) -> &str {
        &self.name
    }

    fn first_page_text(&self) -> Result<String, DocumentError> {
        let output = Command::new(&self.tools.pdftotext)
            .args(["-f", "1", "-l", "1", "-layout"])
            .arg(self.path())
            .arg("-")
            .output()
            .map_err(|err| DocumentError::Tool {
                tool: self.tools.pdftotext.display().to_string(),
                detail: format!("failed to invoke ({err}); is poppler-utils installed?"),
            })?;

        if !output.status.success() {
            return Err(DocumentError::Tool {
                tool: self.tools.pdftotext.display().to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn render_first_page(&self, dpi: u32) -> Result<GrayImage, DocumentError> {
        let out_dir = TempDir::new()?;
        let prefix = out_dir.path().join("page");

        // -singlefile drops the page-number suffix so the output name is predictable.
        let status = Command::new(&self.tools.pdftoppm)
            .args(["-png", "-gray", "-singlefile", "-f", "1", "-l", "1", "-r"])
            .arg(dpi.to_string())
            .arg(self.path())
            .arg(&prefix)
            .status()
            .map_err(|err| DocumentError::Tool {
                tool: self.tools.pdftoppm.display().to_string(),
                detail: format!("failed to invoke ({err}); is poppler-utils installed?"),
            })?;

        if !status.success() {
            return Err(DocumentError::Tool {
                tool: self.tools.pdftoppm.display().to_string(),
                detail: format!("exited with {status}"),
            });
        }

        let image_path = prefix.with_extension("png");
        let image = image::open(&image_path)?;
        Ok(image.to_luma8())
    }
}

fn looks_like_pdf(bytes: &[u8]) -> bool {
    // Some producers emit a BOM or whitespace before the header.
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(PDF_MAGIC.len()).any(|window| window == PDF_MAGIC)
}
