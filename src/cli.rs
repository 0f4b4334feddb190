use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::config::SegmentStrategy;

#[derive(Parser, Debug)]
#[command(
    name = "protocol-intake",
    version,
    about = "Extract and confirm training records from scanned protocol documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load employees and directions into the registry.
    Import(ImportArgs),
    /// Run OCR over a PDF and write page-annotated text.
    Ocr(OcrArgs),
    /// Extract candidate records for human review.
    Parse(ParseArgs),
    /// Write a per-page diagnostic report.
    Analyze(AnalyzeArgs),
    /// Apply a reviewed candidates file.
    Confirm(ConfirmArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[arg(long, default_value = ".cache/protocol-intake")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// JSON array of `{id, full_name, position?, department?}`.
    #[arg(long)]
    pub employees: Option<PathBuf>,

    /// JSON array of `{id, name, description?}`.
    #[arg(long)]
    pub directions: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct OcrArgs {
    #[arg(long, default_value = ".cache/protocol-intake")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub pdf: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = "rus")]
    pub ocr_lang: String,

    #[arg(long, default_value_t = 400)]
    pub dpi: u32,

    #[arg(long, default_value_t = 6)]
    pub psm: u8,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Pipeline tuning JSON; built-in defaults when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub strategy: Option<SegmentStrategy>,

    /// Reference date for the exam-year window (YYYY-MM-DD); defaults to today.
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    #[arg(long, default_value = ".cache/protocol-intake")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Marker-annotated OCR text. When omitted, `--pdf` is recognized first.
    #[arg(long)]
    pub text: Option<PathBuf>,

    /// Source scan; registered as a document when given.
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = "rus")]
    pub ocr_lang: String,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = ".cache/protocol-intake")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Annotated OCR text to analyze.
    #[arg(long, conflicts_with = "document_id")]
    pub text: Option<PathBuf>,

    /// Analyze the OCR text stored for a registered document.
    #[arg(long)]
    pub document_id: Option<i64>,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ConfirmArgs {
    #[arg(long, default_value = ".cache/protocol-intake")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Reviewed candidates file written by `parse`.
    #[arg(long)]
    pub candidates: PathBuf,

    /// Source scan; defaults to the path recorded for the document.
    #[arg(long)]
    pub pdf: Option<PathBuf>,

    #[arg(long)]
    pub protocol_dir: Option<PathBuf>,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/protocol-intake")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
