//! PDF rasterisation: render every page to a JPEG file.
//!
//! Two backends, chosen by [`RenderBackend`]:
//!
//! * **Pdfium** renders in-process through `pdfium-render`. Pdfium keeps
//!   thread-local state and is not async-safe, so the whole document is
//!   rendered inside `tokio::task::spawn_blocking`.
//! * **Poppler** shells out to `pdfinfo` (page count) and `pdftoppm`
//!   (rendering). The page range is cut into `thread_count` contiguous
//!   chunks, one `pdftoppm` process each, run concurrently. The PNG
//!   intermediates land in a temporary directory and are re-encoded as JPEG
//!   at the requested quality.
//!
//! Both backends write `{stem}_page_{NNNN}.jpg` into the output directory
//! and return the paths in page order.

use crate::config::{RenderBackend, SplitConfig};
use crate::diagnostics::TracingSink;
use crate::error::DocprepError;
use crate::pipeline::collect::collect_pages;
use crate::pipeline::encode::write_jpeg;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

static RE_PDFINFO_PAGES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)").unwrap());

/// Output file name for 1-based `page_num`.
pub fn page_file_name(stem: &str, page_num: usize) -> String {
    format!("{stem}_page_{page_num:04}.jpg")
}

/// Render every page of `pdf_path` into `output_dir` with the configured
/// backend.
pub async fn render_pdf(
    pdf_path: &Path,
    output_dir: &Path,
    config: &SplitConfig,
) -> Result<Vec<PathBuf>, DocprepError> {
    match config.backend {
        RenderBackend::Pdfium => render_with_pdfium(pdf_path, output_dir, config).await,
        RenderBackend::Poppler => render_with_poppler(pdf_path, output_dir, config).await,
    }
}

fn pdf_stem(pdf_path: &Path) -> String {
    pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

// ── Pdfium ───────────────────────────────────────────────────────────────

async fn render_with_pdfium(
    pdf_path: &Path,
    output_dir: &Path,
    config: &SplitConfig,
) -> Result<Vec<PathBuf>, DocprepError> {
    let pdf = pdf_path.to_path_buf();
    let out = output_dir.to_path_buf();
    let dpi = config.dpi;
    let quality = config.quality;

    tokio::task::spawn_blocking(move || render_with_pdfium_blocking(&pdf, &out, dpi, quality))
        .await
        .map_err(|e| DocprepError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind the pdfium library: `PDFIUM_LIB_PATH`, then the working directory,
/// then the system library path.
fn bind_pdfium() -> Result<Pdfium, DocprepError> {
    let backend = RenderBackend::Pdfium.algorithm_name();

    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DocprepError::MissingDependency {
        backend: backend.to_string(),
        hint: format!(
            "could not load the pdfium library ({e:?}).\n\
             Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium on the library path."
        ),
    })?;

    Ok(Pdfium::new(bindings))
}

fn render_with_pdfium_blocking(
    pdf_path: &Path,
    output_dir: &Path,
    dpi: u32,
    quality: u8,
) -> Result<Vec<PathBuf>, DocprepError> {
    let backend = RenderBackend::Pdfium.algorithm_name();
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| DocprepError::ConversionFailed {
            backend: backend.to_string(),
            detail: format!("cannot open {}: {:?}", pdf_path.display(), e),
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    // PDF user space is 72 points per inch.
    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
    let stem = pdf_stem(pdf_path);

    let mut saved = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| DocprepError::ConversionFailed {
                backend: backend.to_string(),
                detail: format!("rasterisation failed for page {}: {:?}", page_num, e),
            })?;

        let image = bitmap.as_image();
        let output_path = output_dir.join(page_file_name(&stem, page_num));
        write_jpeg(&image, quality, &output_path)?;

        debug!(
            "Rendered page {} with pdfium at {}dpi to {}",
            page_num,
            dpi,
            output_path.display()
        );
        saved.push(output_path);
    }

    Ok(saved)
}

// ── Poppler ──────────────────────────────────────────────────────────────

async fn render_with_poppler(
    pdf_path: &Path,
    output_dir: &Path,
    config: &SplitConfig,
) -> Result<Vec<PathBuf>, DocprepError> {
    let page_count = poppler_page_count(pdf_path).await?;
    info!("PDF loaded: {} pages", page_count);
    if page_count == 0 {
        return Ok(Vec::new());
    }

    let scratch = tempfile::TempDir::new()
        .map_err(|e| DocprepError::Internal(format!("tempdir: {e}")))?;
    let prefix = scratch.path().join("page");

    let chunks = page_chunks(page_count, config.thread_count);
    debug!("Rendering with pdftoppm in {} chunk(s): {:?}", chunks.len(), chunks);

    let jobs = chunks.iter().map(|&(first, last)| {
        let args: Vec<OsString> = vec![
            "-png".into(),
            "-r".into(),
            config.dpi.to_string().into(),
            "-f".into(),
            first.to_string().into(),
            "-l".into(),
            last.to_string().into(),
            pdf_path.as_os_str().to_owned(),
            prefix.as_os_str().to_owned(),
        ];
        async move { run_poppler_tool("pdftoppm", &args).await }
    });
    futures::future::try_join_all(jobs).await?;

    let stem = pdf_stem(pdf_path);
    let out = output_dir.to_path_buf();
    let quality = config.quality;
    let dpi = config.dpi;

    // `scratch` moves into the closure so the intermediates outlive the re-encode.
    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, DocprepError> {
        let rendered = collect_pages(scratch.path(), &["png"], &TracingSink)?;
        let mut saved = Vec::with_capacity(rendered.len());
        for (idx, page) in rendered.iter().enumerate() {
            let page_num = idx + 1;
            let image = image::open(&page.path).map_err(|e| DocprepError::ConversionFailed {
                backend: RenderBackend::Poppler.algorithm_name().to_string(),
                detail: format!("cannot read {}: {e}", page.path.display()),
            })?;
            let output_path = out.join(page_file_name(&stem, page_num));
            write_jpeg(&image, quality, &output_path)?;
            debug!(
                "Rendered page {} with pdftoppm at {}dpi to {}",
                page_num,
                dpi,
                output_path.display()
            );
            saved.push(output_path);
        }
        Ok(saved)
    })
    .await
    .map_err(|e| DocprepError::Internal(format!("Encode task panicked: {}", e)))?
}

/// Page count from `pdfinfo`.
async fn poppler_page_count(pdf_path: &Path) -> Result<usize, DocprepError> {
    let output = run_poppler_tool("pdfinfo", &[pdf_path.as_os_str().to_owned()]).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_pdfinfo_pages(&stdout).ok_or_else(|| DocprepError::ConversionFailed {
        backend: RenderBackend::Poppler.algorithm_name().to_string(),
        detail: format!("pdfinfo reported no page count for {}", pdf_path.display()),
    })
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<usize> {
    RE_PDFINFO_PAGES
        .captures(stdout)
        .and_then(|caps| caps[1].parse().ok())
}

/// Split pages `1..=page_count` into at most `threads` contiguous, inclusive
/// ranges whose sizes differ by at most one (larger chunks first).
fn page_chunks(page_count: usize, threads: usize) -> Vec<(usize, usize)> {
    if page_count == 0 {
        return Vec::new();
    }
    let threads = threads.clamp(1, page_count);
    let base = page_count / threads;
    let mut remainder = page_count % threads;

    let mut chunks = Vec::with_capacity(threads);
    let mut first = 1;
    for _ in 0..threads {
        let mut size = base;
        if remainder > 0 {
            size += 1;
            remainder -= 1;
        }
        let last = first + size - 1;
        chunks.push((first, last));
        first = last + 1;
    }
    chunks
}

/// Run a Poppler utility, mapping a missing executable to
/// [`DocprepError::MissingDependency`] and a non-zero exit to
/// [`DocprepError::ConversionFailed`].
async fn run_poppler_tool(program: &str, args: &[OsString]) -> Result<Output, DocprepError> {
    let backend = RenderBackend::Poppler.algorithm_name();
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DocprepError::MissingDependency {
                    backend: backend.to_string(),
                    hint: format!("'{program}' was not found on PATH; install Poppler (poppler-utils)."),
                }
            } else {
                DocprepError::ConversionFailed {
                    backend: backend.to_string(),
                    detail: format!("failed to start {program}: {e}"),
                }
            }
        })?;

    if !output.status.success() {
        return Err(DocprepError::ConversionFailed {
            backend: backend.to_string(),
            detail: format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_file_names_are_zero_padded() {
        assert_eq!(page_file_name("report", 1), "report_page_0001.jpg");
        assert_eq!(page_file_name("report", 123), "report_page_0123.jpg");
        assert_eq!(page_file_name("report", 12345), "report_page_12345.jpg");
    }

    #[test]
    fn chunks_cover_every_page_once() {
        assert_eq!(page_chunks(10, 3), vec![(1, 4), (5, 7), (8, 10)]);
        assert_eq!(page_chunks(4, 2), vec![(1, 2), (3, 4)]);
        assert_eq!(page_chunks(5, 1), vec![(1, 5)]);
    }

    #[test]
    fn more_threads_than_pages() {
        assert_eq!(page_chunks(2, 8), vec![(1, 1), (2, 2)]);
        assert!(page_chunks(0, 2).is_empty());
    }

    #[test]
    fn pdfinfo_pages_are_parsed() {
        let out = "Title:          Report\nProducer:       x\nPages:          17\nEncrypted:      no\n";
        assert_eq!(parse_pdfinfo_pages(out), Some(17));
        assert_eq!(parse_pdfinfo_pages("Title: x\n"), None);
    }

    #[test]
    fn stem_falls_back_for_odd_paths() {
        assert_eq!(pdf_stem(Path::new("/tmp/My Doc.pdf")), "My Doc");
        assert_eq!(pdf_stem(Path::new("/")), "document");
    }

    #[tokio::test]
    async fn missing_tool_is_missing_dependency() {
        let err = run_poppler_tool("definitely-not-a-poppler-binary", &[])
            .await
            .unwrap_err();
        assert!(
            matches!(err, DocprepError::MissingDependency { .. }),
            "got {err:?}"
        );
    }
}
