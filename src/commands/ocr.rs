use anyhow::Result;
use tracing::{info, warn};

use super::file_stem;
use crate::artifacts::PdfArtifactStore;
use crate::cli::OcrArgs;
use crate::ocr::{OcrSettings, recognize_document, tool_versions};
use crate::store::DocumentStore;
use crate::util::write_text;

pub fn run(args: OcrArgs) -> Result<()> {
    let settings = OcrSettings {
        dpi: args.dpi,
        language: args.ocr_lang.clone(),
        page_segmentation_mode: args.psm,
    };
    let versions = tool_versions();
    info!(
        pdf = %args.pdf.display(),
        pdftoppm = %versions.pdftoppm.unwrap_or_default(),
        tesseract = %versions.tesseract.unwrap_or_default(),
        "starting OCR"
    );

    let documents = PdfArtifactStore::new(args.cache_root.join("protocols"));
    let source = documents.load_source_document(&args.pdf)?;
    let page_count = documents.page_count(&source);

    let output = recognize_document(&args.pdf, page_count, &settings)?;
    let failed = output.pages.iter().filter(|page| page.error.is_some()).count();
    if failed > 0 {
        warn!(failed, pages = page_count, "some pages could not be recognized");
    }

    let output_path = args.output.clone().unwrap_or_else(|| {
        args.cache_root
            .join("ocr")
            .join(format!("{}.txt", file_stem(&args.pdf)))
    });
    write_text(&output_path, &output.text)?;

    info!(
        pages = page_count,
        failed,
        output = %output_path.display(),
        "OCR text written"
    );
    Ok(())
}
