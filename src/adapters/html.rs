//! HTML report renderer.
//!
//! Either delegates to a converter program (e.g. `jupyter nbconvert`) or
//! builds a self-contained page from the raw artifact and its log. When
//! rendering fails an error page is written in place of the report.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::ArtifactRef;

use super::command::{run_command, CommandSpec, StageExecutionError, TemplateVars};
use super::Renderer;

/// Errors from rendering a report
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Nothing to render for stage '{0}'")]
    NoArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Converter failed: {0}")]
    Converter(#[from] StageExecutionError),

    #[error("Converter produced no report at {}", .0.display())]
    NoOutput(PathBuf),

    #[error("Rendering failed ({reason}); error page written to {}", path.display())]
    Degraded { path: PathBuf, reason: String },
}

impl RenderError {
    /// Page written in place of the report, if any
    pub fn fallback_path(&self) -> Option<&Path> {
        match self {
            Self::Degraded { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Write `contents` to `dest` via a temp file in the same directory
fn write_atomic(dest: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Renderer writing `<reports>/<stage>.html`
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    reports_dir: PathBuf,
    work_dir: PathBuf,
    notebooks_dir: PathBuf,
    converter: Option<CommandSpec>,
    timeout: Option<Duration>,
}

impl HtmlRenderer {
    /// Built-in renderer writing into `reports_dir`
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        let reports_dir = reports_dir.into();
        Self {
            work_dir: reports_dir.clone(),
            notebooks_dir: reports_dir.clone(),
            reports_dir,
            converter: None,
            timeout: None,
        }
    }

    /// Use an external converter; `{input}` and `{output}` expand to the
    /// raw artifact and the report path
    pub fn with_converter(
        mut self,
        converter: CommandSpec,
        work_dir: impl Into<PathBuf>,
        notebooks_dir: impl Into<PathBuf>,
    ) -> Self {
        self.converter = Some(converter);
        self.work_dir = work_dir.into();
        self.notebooks_dir = notebooks_dir.into();
        self
    }

    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    /// Where the report for `stage_id` is written
    pub fn report_path(&self, stage_id: &str) -> PathBuf {
        self.reports_dir.join(format!("{}.html", stage_id))
    }

    async fn produce(&self, artifact: &ArtifactRef, dest: &Path) -> Result<(), RenderError> {
        match self.converter {
            Some(ref converter) => self.convert(converter, artifact, dest).await,
            None => {
                let page = self.builtin_page(artifact).await?;
                write_atomic(dest, page.as_bytes())?;
                Ok(())
            }
        }
    }

    async fn convert(
        &self,
        converter: &CommandSpec,
        artifact: &ArtifactRef,
        dest: &Path,
    ) -> Result<(), RenderError> {
        let input = match artifact.path {
            Some(ref path) if artifact.file_exists() => path.clone(),
            _ => return Err(RenderError::NoArtifact(artifact.stage_id.clone())),
        };

        // Stale reports must not pass for fresh output
        if dest.exists() {
            std::fs::remove_file(dest)?;
        }

        let vars = TemplateVars {
            stage: artifact.stage_id.clone(),
            work_dir: self.work_dir.clone(),
            notebooks: self.notebooks_dir.clone(),
            reports: self.reports_dir.clone(),
            input: Some(input),
            output: Some(dest.to_path_buf()),
        };

        run_command(converter, &vars, &self.work_dir, self.timeout).await?;

        if !dest.is_file() {
            return Err(RenderError::NoOutput(dest.to_path_buf()));
        }
        Ok(())
    }

    async fn builtin_page(&self, artifact: &ArtifactRef) -> Result<String, RenderError> {
        let body = match artifact.path {
            Some(ref path) if artifact.file_exists() => {
                let bytes = tokio::fs::read(path).await?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => None,
        };

        if body.is_none() && artifact.log.trim().is_empty() {
            return Err(RenderError::NoArtifact(artifact.stage_id.clone()));
        }

        let mut page = format!(
            "<html><head><meta charset=\"utf-8\"><title>{id}</title></head><body><h1>{id}</h1>",
            id = escape_html(&artifact.stage_id)
        );
        if let Some(body) = body {
            page.push_str("<h2>Output</h2><pre>");
            page.push_str(&escape_html(&body));
            page.push_str("</pre>");
        }
        if !artifact.log.trim().is_empty() {
            page.push_str("<h2>Log</h2><pre>");
            page.push_str(&escape_html(&artifact.log));
            page.push_str("</pre>");
        }
        page.push_str("</body></html>");
        Ok(page)
    }

    fn error_page(stage_id: &str, error: &RenderError) -> String {
        format!(
            "<html><body><h1>Error converting {} to HTML</h1><pre>{}</pre></body></html>",
            escape_html(stage_id),
            escape_html(&error.to_string())
        )
    }
}

#[async_trait]
impl Renderer for HtmlRenderer {
    fn name(&self) -> &str {
        "html"
    }

    async fn render(&self, artifact: &ArtifactRef) -> Result<PathBuf, RenderError> {
        let dest = self.report_path(&artifact.stage_id);

        match self.produce(artifact, &dest).await {
            Ok(()) => {
                debug!(stage = %artifact.stage_id, path = %dest.display(), "Report rendered");
                Ok(dest)
            }
            Err(e) => {
                warn!(stage = %artifact.stage_id, error = %e, "Report rendering failed");
                let page = Self::error_page(&artifact.stage_id, &e);
                match write_atomic(&dest, page.as_bytes()) {
                    Ok(()) => Err(RenderError::Degraded {
                        path: dest,
                        reason: e.to_string(),
                    }),
                    Err(_) => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>\"a\" & 'b'</b>"),
            "&lt;b&gt;&quot;a&quot; &amp; &#39;b&#39;&lt;/b&gt;"
        );
    }

    #[tokio::test]
    async fn test_builtin_render_embeds_artifact_and_log() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("a.ipynb");
        std::fs::write(&raw, "cell <output>").unwrap();

        let renderer = HtmlRenderer::new(temp.path().join("reports"));
        let artifact = ArtifactRef::at_path("a", &raw).with_log("all good");
        let path = renderer.render(&artifact).await.unwrap();

        assert_eq!(path, temp.path().join("reports").join("a.html"));
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("cell &lt;output&gt;"));
        assert!(html.contains("all good"));
    }

    #[tokio::test]
    async fn test_render_failure_writes_error_page() {
        let temp = TempDir::new().unwrap();
        let renderer = HtmlRenderer::new(temp.path());

        let err = renderer.render(&ArtifactRef::empty("b")).await.unwrap_err();
        let fallback = err.fallback_path().unwrap().to_path_buf();
        assert_eq!(fallback, temp.path().join("b.html"));

        let html = std::fs::read_to_string(fallback).unwrap();
        assert!(html.contains("Error converting b to HTML"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_converter_must_produce_output() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("c.ipynb");
        std::fs::write(&raw, "{}").unwrap();

        let renderer = HtmlRenderer::new(temp.path()).with_converter(
            CommandSpec::new("true", vec![]),
            temp.path(),
            temp.path(),
        );
        let err = renderer
            .render(&ArtifactRef::at_path("c", &raw))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no report"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_converter_output_is_returned() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("d.ipynb");
        std::fs::write(&raw, "{}").unwrap();

        let renderer = HtmlRenderer::new(temp.path()).with_converter(
            CommandSpec::new("cp", vec!["{input}".into(), "{output}".into()]),
            temp.path(),
            temp.path(),
        );
        let path = renderer.render(&ArtifactRef::at_path("d", &raw)).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }
}
