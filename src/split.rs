//! `pdf-split` entry point: one PDF in, one JPEG per page out.

use crate::config::{RenderBackend, SplitConfig};
use crate::error::DocprepError;
use crate::pipeline::render;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// What a split run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutput {
    /// Directory the pages were written to.
    pub output_dir: PathBuf,
    /// Page images in page order.
    pub pages: Vec<PathBuf>,
    /// Backend that rendered them.
    pub backend: RenderBackend,
    /// Wall-clock time for the whole split.
    pub duration_ms: u64,
}

/// Default output directory: `<stem>_pages` next to the PDF.
pub fn default_output_dir(pdf_path: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    pdf_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}_pages"))
}

/// Split `pdf_path` into JPEG pages.
///
/// # Errors
/// - [`DocprepError::NotFound`] / [`DocprepError::NotAFile`] for a bad input path
/// - [`DocprepError::MissingDependency`] when the backend is not installed
/// - [`DocprepError::ConversionFailed`] when the backend fails mid-render
pub async fn split_pdf(
    pdf_path: impl AsRef<Path>,
    config: &SplitConfig,
) -> Result<SplitOutput, DocprepError> {
    let start = Instant::now();
    let pdf_path = pdf_path.as_ref();

    if !pdf_path.exists() {
        return Err(DocprepError::NotFound {
            path: pdf_path.to_path_buf(),
        });
    }
    if !pdf_path.is_file() {
        return Err(DocprepError::NotAFile {
            path: pdf_path.to_path_buf(),
        });
    }
    let pdf_path = pdf_path
        .canonicalize()
        .map_err(|e| DocprepError::io(pdf_path, e))?;

    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&pdf_path));
    std::fs::create_dir_all(&output_dir).map_err(|e| DocprepError::write(&output_dir, e))?;

    info!(
        "Splitting {} with '{}' (quality {}, {} dpi)",
        pdf_path.display(),
        config.backend,
        config.quality,
        config.dpi
    );
    info!("Saving pages to: {}", output_dir.display());

    let pages = render::render_pdf(&pdf_path, &output_dir, config).await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Wrote {} pages to {} in {}ms",
        pages.len(),
        output_dir.display(),
        duration_ms
    );

    Ok(SplitOutput {
        output_dir,
        pages,
        backend: config.backend,
        duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_dir_sits_next_to_pdf() {
        assert_eq!(
            default_output_dir(Path::new("/data/in/report.pdf")),
            PathBuf::from("/data/in/report_pages")
        );
        assert_eq!(
            default_output_dir(Path::new("scan.v2.pdf")),
            PathBuf::from("scan.v2_pages")
        );
    }

    #[tokio::test]
    async fn missing_pdf_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let config = SplitConfig::builder().build().unwrap();
        let err = split_pdf(tmp.path().join("nope.pdf"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, DocprepError::NotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn directory_is_not_a_file() {
        let tmp = TempDir::new().unwrap();
        let config = SplitConfig::builder().build().unwrap();
        let err = split_pdf(tmp.path(), &config).await.unwrap_err();
        assert!(matches!(err, DocprepError::NotAFile { .. }), "got {err:?}");
        assert!(err.is_input_error());
    }
}
