//! `pages2md` entry point: page images in, one markdown file out.
//!
//! Pages are processed strictly in collector order, one model call each.
//! Every page's block is written and flushed before the next call starts, so
//! a failure mid-run leaves a valid prefix of the document on disk.

use crate::config::TranscribeConfig;
use crate::error::DocprepError;
use crate::pipeline::collect::{collect_pages, validate_image_path, PageFile};
use crate::pipeline::llm::VisionModel;
use crate::prompts::render_template;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// File name used when `--output` names a directory.
pub const DEFAULT_OUTPUT_FILENAME: &str = "output.md";

/// Suffix of the default output file, appended to the image directory name.
pub const OUTPUT_SUFFIX: &str = "_combined.md";

/// One page's transcription, before it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct PageInferenceResult {
    /// 1-based position in the run.
    pub page_number: usize,
    pub image_path: PathBuf,
    /// The full block: heading, blank line, trimmed model output, newline.
    pub markdown: String,
    pub elapsed_seconds: f64,
}

/// Transcription of one image outside a page run.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleImageResult {
    pub image_path: PathBuf,
    /// Trimmed model output.
    pub text: String,
    pub elapsed_seconds: f64,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionStats {
    pub output_path: PathBuf,
    pub pages: usize,
    /// Sum of per-page model time.
    pub total_seconds: f64,
}

impl TranscriptionStats {
    /// Mean model time per page; 0 for an empty run.
    pub fn average_seconds(&self) -> f64 {
        if self.pages == 0 {
            0.0
        } else {
            self.total_seconds / self.pages as f64
        }
    }
}

/// Where the markdown goes.
///
/// An explicit path that is an existing directory, or that has no extension,
/// gets [`DEFAULT_OUTPUT_FILENAME`] appended. Without one, the file is
/// `<image_dir>_combined.md` beside the image directory.
pub fn resolve_output_path(image_dir: &Path, explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        if path.is_dir() || path.extension().is_none() {
            return path.join(DEFAULT_OUTPUT_FILENAME);
        }
        return path.to_path_buf();
    }

    let dir_name = image_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pages".to_string());
    image_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{dir_name}{OUTPUT_SUFFIX}"))
}

/// Collect the images in `image_dir` and transcribe them with `model`.
///
/// Collector warnings go to `config.diagnostics`.
pub async fn transcribe_dir<M: VisionModel>(
    image_dir: impl AsRef<Path>,
    config: &TranscribeConfig,
    model: &M,
) -> Result<TranscriptionStats, DocprepError> {
    let image_dir = absolute_dir(image_dir.as_ref())?;
    let pages = collect_pages(
        &image_dir,
        config.image_suffixes.as_slice(),
        config.diagnostics.as_ref(),
    )?;
    info!("Found {} page images in {}", pages.len(), image_dir.display());

    let output_path = resolve_output_path(&image_dir, config.output.as_deref());
    transcribe_pages(&pages, &output_path, config, model).await
}

/// Transcribe a single image with the configured prompt.
///
/// The prompt is rendered as page 1. Nothing is written to disk and no
/// heading is added.
///
/// # Errors
/// - [`DocprepError::NotFound`] / [`DocprepError::NotAFile`] for a bad path
/// - [`DocprepError::UnsupportedImage`] if the extension is not in
///   `config.image_suffixes`
/// - [`DocprepError::InferenceFailed`] from the model
pub async fn transcribe_image<M: VisionModel>(
    image: impl AsRef<Path>,
    config: &TranscribeConfig,
    model: &M,
) -> Result<SingleImageResult, DocprepError> {
    let image_path = validate_image_path(image.as_ref(), config.image_suffixes.as_slice())?;
    let image_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prompt = render_template(&config.prompt_template, 1, &image_name)?;

    let start = Instant::now();
    let text = model
        .generate(1, &prompt, &image_path, config.max_tokens)
        .await
        .map_err(|e| inference_error(1, e))?;
    let elapsed_seconds = start.elapsed().as_secs_f64();
    info!("Processed {} in {:.2} seconds", image_name, elapsed_seconds);

    Ok(SingleImageResult {
        image_path,
        text: text.trim().to_string(),
        elapsed_seconds,
    })
}

fn inference_error(page: usize, e: DocprepError) -> DocprepError {
    match e {
        DocprepError::InferenceFailed { .. } => e,
        other => DocprepError::InferenceFailed {
            page,
            detail: other.to_string(),
        },
    }
}

/// Canonicalise an existing directory, leaving missing paths as they are so
/// the collector can report them.
pub(crate) fn absolute_dir(dir: &Path) -> Result<PathBuf, DocprepError> {
    if !dir.exists() {
        return Ok(dir.to_path_buf());
    }
    dir.canonicalize().map_err(|e| DocprepError::io(dir, e))
}

/// Transcribe `pages` in order into `output_path`.
///
/// The file (and its parent directories) is created and truncated before the
/// first model call.
///
/// # Errors
/// - [`DocprepError::OutputWriteFailed`] if the file cannot be created or written
/// - [`DocprepError::InferenceFailed`] from the model; blocks for earlier
///   pages are already on disk
pub async fn transcribe_pages<M: VisionModel>(
    pages: &[PageFile],
    output_path: &Path,
    config: &TranscribeConfig,
    model: &M,
) -> Result<TranscriptionStats, DocprepError> {
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DocprepError::write(parent, e))?;
    }
    let file = File::create(output_path).map_err(|e| DocprepError::write(output_path, e))?;
    let mut writer = BufWriter::new(file);

    let total = pages.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }
    let run_start = Instant::now();
    let mut total_seconds = 0.0;

    for (idx, page) in pages.iter().enumerate() {
        let page_number = idx + 1;
        let image_name = page.file_name();

        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(page_number, total, &image_name);
        }

        let result = infer_page(model, config, page, page_number).await?;

        writer
            .write_all(result.markdown.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| DocprepError::write(output_path, e))?;

        info!(
            "Page {} processed in {:.2} seconds ({})",
            page_number, result.elapsed_seconds, image_name
        );
        total_seconds += result.elapsed_seconds;

        if let Some(ref cb) = config.progress_callback {
            cb.on_page_complete(
                page_number,
                total,
                result.elapsed_seconds,
                result.markdown.len(),
            );
        }
    }

    let stats = TranscriptionStats {
        output_path: output_path.to_path_buf(),
        pages: total,
        total_seconds,
    };

    info!(
        "Wrote {} pages to {} in {:.2} seconds total - avg {:.2} seconds/page",
        stats.pages,
        stats.output_path.display(),
        stats.total_seconds,
        stats.average_seconds()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, run_start.elapsed().as_secs_f64());
    }

    Ok(stats)
}

async fn infer_page<M: VisionModel>(
    model: &M,
    config: &TranscribeConfig,
    page: &PageFile,
    page_number: usize,
) -> Result<PageInferenceResult, DocprepError> {
    let image_name = page.file_name();
    let prompt = render_template(&config.prompt_template, page_number, &image_name)?;
    let heading = render_template(&config.heading_template, page_number, &image_name)?;
    debug!("Page {} prompt: {}", page_number, prompt);

    let start = Instant::now();
    let text = model
        .generate(page_number, &prompt, &page.path, config.max_tokens)
        .await
        .map_err(|e| inference_error(page_number, e))?;
    let elapsed_seconds = start.elapsed().as_secs_f64();

    Ok(PageInferenceResult {
        page_number,
        image_path: page.path.clone(),
        markdown: format!("{}\n\n{}\n", heading, text.trim()),
        elapsed_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Returns canned text per call and records what it was asked.
    struct ScriptedModel {
        replies: Vec<Result<String, String>>,
        calls: Mutex<Vec<(usize, String, String, usize)>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl VisionModel for ScriptedModel {
        async fn generate(
            &self,
            page_num: usize,
            prompt: &str,
            image: &Path,
            max_tokens: usize,
        ) -> Result<String, DocprepError> {
            let name = image.file_name().unwrap().to_string_lossy().into_owned();
            let mut calls = self.calls.lock().unwrap();
            calls.push((page_num, prompt.to_string(), name, max_tokens));
            match &self.replies[calls.len() - 1] {
                Ok(text) => Ok(text.clone()),
                Err(detail) => Err(DocprepError::InferenceFailed {
                    page: page_num,
                    detail: detail.clone(),
                }),
            }
        }
    }

    fn page_dir(names: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let pages = tmp.path().join("doc_pages");
        std::fs::create_dir(&pages).unwrap();
        for n in names {
            std::fs::write(pages.join(n), b"img").unwrap();
        }
        tmp
    }

    #[test]
    fn explicit_output_paths() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("pages");
        assert_eq!(
            resolve_output_path(&dir, Some(tmp.path())),
            tmp.path().join("output.md")
        );
        assert_eq!(
            resolve_output_path(&dir, Some(&tmp.path().join("out"))),
            tmp.path().join("out").join("output.md")
        );
        assert_eq!(
            resolve_output_path(&dir, Some(&tmp.path().join("book.md"))),
            tmp.path().join("book.md")
        );
    }

    #[test]
    fn default_output_sits_beside_image_dir() {
        assert_eq!(
            resolve_output_path(Path::new("/data/report_pages"), None),
            PathBuf::from("/data/report_pages_combined.md")
        );
    }

    #[test]
    fn average_of_empty_run_is_zero() {
        let stats = TranscriptionStats {
            output_path: PathBuf::from("x.md"),
            pages: 0,
            total_seconds: 0.0,
        };
        assert_eq!(stats.average_seconds(), 0.0);
        let stats = TranscriptionStats {
            pages: 4,
            total_seconds: 2.0,
            ..stats
        };
        assert_eq!(stats.average_seconds(), 0.5);
    }

    #[tokio::test]
    async fn pages_are_written_in_numeric_order() {
        let tmp = page_dir(&["doc_page_0010.jpg", "doc_page_0002.jpg", "doc_page_0001.jpg"]);
        let config = TranscribeConfig::builder()
            .prompt_template("Transcribe {image_name} (page {page_number})")
            .build()
            .unwrap();
        let model = ScriptedModel::new(vec![
            Ok("  first  ".into()),
            Ok("second\n".into()),
            Ok("tenth".into()),
        ]);

        let stats = transcribe_dir(tmp.path().join("doc_pages"), &config, &model)
            .await
            .unwrap();

        assert_eq!(stats.pages, 3);
        let expected_path = tmp
            .path()
            .canonicalize()
            .unwrap()
            .join("doc_pages_combined.md");
        assert_eq!(stats.output_path, expected_path);

        let md = std::fs::read_to_string(&stats.output_path).unwrap();
        assert_eq!(
            md,
            "## Page 1\n\nfirst\n## Page 2\n\nsecond\n## Page 3\n\ntenth\n"
        );

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[0].1, "Transcribe doc_page_0001.jpg (page 1)");
        assert_eq!(calls[1].2, "doc_page_0002.jpg");
        assert_eq!(calls[2].2, "doc_page_0010.jpg");
        assert!(calls.iter().all(|c| c.3 == 3200));
    }

    #[tokio::test]
    async fn failure_keeps_earlier_pages() {
        let tmp = page_dir(&["p1.png", "p2.png", "p3.png"]);
        let out = tmp.path().join("nested").join("out.md");
        let config = TranscribeConfig::builder()
            .heading_template("# {image_name}")
            .output(&out)
            .build()
            .unwrap();
        let model = ScriptedModel::new(vec![Ok("one".into()), Err("model crashed".into())]);

        let err = transcribe_dir(tmp.path().join("doc_pages"), &config, &model)
            .await
            .unwrap_err();

        assert!(
            matches!(err, DocprepError::InferenceFailed { page: 2, .. }),
            "got {err:?}"
        );
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "# p1.png\n\none\n");
        assert_eq!(model.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unnumbered_images_go_last_and_are_reported() {
        let tmp = page_dir(&["cover.webp", "scan_2.jpg", "scan_1.jpeg", "readme.txt"]);
        let sink = Arc::new(CollectingSink::new());
        let config = TranscribeConfig::builder()
            .heading_template("## {page_number:03d}")
            .diagnostics(sink.clone())
            .build()
            .unwrap();
        let model = ScriptedModel::new(vec![Ok("a".into()), Ok("b".into()), Ok("c".into())]);

        let stats = transcribe_dir(tmp.path().join("doc_pages"), &config, &model)
            .await
            .unwrap();

        assert_eq!(stats.pages, 3);
        let names: Vec<String> = model
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.2.clone())
            .collect();
        assert_eq!(names, vec!["scan_1.jpeg", "scan_2.jpg", "cover.webp"]);
        assert_eq!(sink.events().len(), 1);

        let md = std::fs::read_to_string(&stats.output_path).unwrap();
        assert!(md.starts_with("## 001\n\na\n"));
    }

    #[tokio::test]
    async fn single_image_is_trimmed_and_not_written() {
        let tmp = page_dir(&["figure.PNG", "notes.txt"]);
        let pages = tmp.path().join("doc_pages");
        let config = TranscribeConfig::builder()
            .prompt_template("Describe {image_name}")
            .max_tokens(64)
            .build()
            .unwrap();
        let model = ScriptedModel::new(vec![Ok("\n  a chart  \n".into())]);

        let result = transcribe_image(pages.join("figure.PNG"), &config, &model)
            .await
            .unwrap();

        assert_eq!(result.text, "a chart");
        assert_eq!(
            result.image_path,
            pages.canonicalize().unwrap().join("figure.PNG")
        );
        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[0], (1, "Describe figure.PNG".to_string(), "figure.PNG".to_string(), 64));
        assert_eq!(std::fs::read_dir(&pages).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn single_image_with_wrong_suffix_never_reaches_model() {
        let tmp = page_dir(&["notes.txt"]);
        let config = TranscribeConfig::builder().build().unwrap();
        let model = ScriptedModel::new(vec![]);

        let err = transcribe_image(tmp.path().join("doc_pages/notes.txt"), &config, &model)
            .await
            .unwrap_err();

        assert!(matches!(err, DocprepError::UnsupportedImage { .. }), "got {err:?}");
        assert!(err.is_input_error());
        assert!(model.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_dir_fails_before_output_is_created() {
        let tmp = page_dir(&["notes.txt"]);
        let config = TranscribeConfig::builder().build().unwrap();
        let model = ScriptedModel::new(vec![]);

        let err = transcribe_dir(tmp.path().join("doc_pages"), &config, &model)
            .await
            .unwrap_err();

        assert!(matches!(err, DocprepError::NoMatchingFiles { .. }), "got {err:?}");
        assert!(!tmp.path().join("doc_pages_combined.md").exists());
    }
}
