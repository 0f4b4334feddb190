use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub dpi: u32,
    pub language: String,
    pub page_segmentation_mode: u8,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            dpi: 400,
            language: "rus".to_string(),
            page_segmentation_mode: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrToolVersions {
    pub pdftoppm: Option<String>,
    pub tesseract: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrPageStat {
    pub page_number: usize,
    pub chars: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    pub pages: Vec<OcrPageStat>,
}

pub fn page_marker(page_number: usize) -> String {
    format!("=== Страница {page_number} ===")
}

pub fn annotate_pages(pages: &[String]) -> String {
    let mut out = String::new();
    for (index, text) in pages.iter().enumerate() {
        out.push_str(&page_marker(index + 1));
        out.push('\n');
        out.push_str(text.trim());
        out.push_str("\n\n");
    }
    out
}

pub fn ensure_tools() -> Result<()> {
    for program in ["pdftoppm", "tesseract"] {
        if !command_available(program) {
            bail!("{program} is required for OCR but was not found on PATH");
        }
    }
    Ok(())
}

pub fn tool_versions() -> OcrToolVersions {
    OcrToolVersions {
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        tesseract: command_version_optional("tesseract", &["--version"]),
    }
}

pub fn recognize_document(
    pdf_path: &Path,
    page_count: usize,
    settings: &OcrSettings,
) -> Result<OcrOutput> {
    ensure_tools()?;

    let mut texts = Vec::with_capacity(page_count);
    let mut pages = Vec::with_capacity(page_count);
    for page_number in 1..=page_count {
        match recognize_page(pdf_path, page_number, settings) {
            Ok(text) => {
                info!(page = page_number, chars = text.chars().count(), "page recognized");
                pages.push(OcrPageStat {
                    page_number,
                    chars: text.chars().count(),
                    error: None,
                });
                texts.push(text);
            }
            Err(error) => {
                warn!(page = page_number, error = %format!("{error:#}"), "OCR failed for page");
                pages.push(OcrPageStat {
                    page_number,
                    chars: 0,
                    error: Some(format!("{error:#}")),
                });
                texts.push(String::new());
            }
        }
    }

    Ok(OcrOutput {
        text: annotate_pages(&texts),
        pages,
    })
}

pub fn recognize_page(pdf_path: &Path, page_number: usize, settings: &OcrSettings) -> Result<String> {
    let pdf_stem = pdf_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("pdf");
    let safe_stem = pdf_stem
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();

    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let output_root = std::env::temp_dir().join(format!(
        "protocol_ocr_{}_{}_{}_{}",
        safe_stem,
        std::process::id(),
        page_number,
        stamp
    ));
    let png_path = PathBuf::from(format!("{}.png", output_root.display()));

    let pdftoppm_output = Command::new("pdftoppm")
        .arg("-r")
        .arg(settings.dpi.to_string())
        .arg("-f")
        .arg(page_number.to_string())
        .arg("-l")
        .arg(page_number.to_string())
        .arg("-singlefile")
        .arg("-png")
        .arg(pdf_path)
        .arg(&output_root)
        .output()
        .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

    if !pdftoppm_output.status.success() {
        let stderr = String::from_utf8_lossy(&pdftoppm_output.stderr);
        bail!(
            "pdftoppm returned non-zero exit status for {} page {}: {}",
            pdf_path.display(),
            page_number,
            stderr.trim()
        );
    }

    if !png_path.exists() {
        bail!(
            "pdftoppm did not produce expected image for {} page {}",
            pdf_path.display(),
            page_number
        );
    }

    let tesseract_output = Command::new("tesseract")
        .arg(&png_path)
        .arg("stdout")
        .arg("-l")
        .arg(&settings.language)
        .arg("--psm")
        .arg(settings.page_segmentation_mode.to_string())
        .output()
        .with_context(|| format!("failed to execute tesseract for {}", png_path.display()))?;

    let _ = fs::remove_file(&png_path);

    if !tesseract_output.status.success() {
        let stderr = String::from_utf8_lossy(&tesseract_output.stderr);
        bail!(
            "tesseract returned non-zero exit status for {} page {}: {}",
            pdf_path.display(),
            page_number,
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&tesseract_output.stdout)
        .replace('\u{0000}', "")
        .trim()
        .to_string())
}

pub fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_PAGE_MARKER_PATTERN, SegmentStrategy};
    use crate::pipeline::ExtractionPipeline;

    #[test]
    fn annotated_text_segments_back_into_pages() {
        let pages = vec![
            "  Иванов Иван Иванович  ".to_string(),
            String::new(),
            "Петров Пётр".to_string(),
        ];
        let text = annotate_pages(&pages);
        assert!(text.starts_with("=== Страница 1 ===\nИванов Иван Иванович\n"));

        let snapshot = crate::model::RegistrySnapshot::default();
        let config = crate::config::PipelineConfig {
            page_marker_pattern: DEFAULT_PAGE_MARKER_PATTERN.to_string(),
            segment_strategy: SegmentStrategy::Marker,
            ..Default::default()
        };
        let today = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
        let segmentation = ExtractionPipeline::new(&snapshot, &config, today)
            .expect("pipeline builds")
            .segment(&text);

        let numbers = segmentation
            .pages
            .iter()
            .map(|page| page.page_number)
            .collect::<Vec<u32>>();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(segmentation.pages[1].text, "Петров Пётр");
        assert!(segmentation.warnings.is_empty());
    }

    #[test]
    fn missing_program_is_not_available() {
        assert!(!command_available("protocol-intake-no-such-tool"));
        assert!(command_version_optional("protocol-intake-no-such-tool", &["-v"]).is_none());
    }
}
