use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use lopdf::Document;
use tracing::debug;

use crate::store::DocumentStore;
use crate::util::ensure_directory;

#[derive(Debug, Clone)]
pub struct PdfArtifactStore {
    protocol_dir: PathBuf,
}

impl PdfArtifactStore {
    pub fn new(protocol_dir: impl Into<PathBuf>) -> Self {
        Self {
            protocol_dir: protocol_dir.into(),
        }
    }

    pub fn protocol_dir(&self) -> &Path {
        &self.protocol_dir
    }
}

impl DocumentStore for PdfArtifactStore {
    type Document = Document;

    fn load_source_document(&self, path: &Path) -> Result<Document> {
        Document::load(path).with_context(|| format!("failed to load PDF {}", path.display()))
    }

    fn page_count(&self, document: &Document) -> usize {
        document.get_pages().len()
    }

    fn extract_page(&self, document: &Document, page_number: u32) -> Result<Vec<u8>> {
        let pages = document.get_pages();
        if !pages.contains_key(&page_number) {
            bail!(
                "page {page_number} is outside the document ({} pages)",
                pages.len()
            );
        }

        let others = pages
            .keys()
            .copied()
            .filter(|number| *number != page_number)
            .collect::<Vec<u32>>();

        let mut single = document.clone();
        single.delete_pages(&others);
        single.prune_objects();

        let mut bytes = Vec::new();
        single
            .save_to(&mut bytes)
            .with_context(|| format!("failed to serialize page {page_number}"))?;
        debug!(page = page_number, bytes = bytes.len(), "extracted single page");
        Ok(bytes)
    }

    fn write_artifact(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf> {
        ensure_directory(&self.protocol_dir)?;
        let path = self.protocol_dir.join(file_name);
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write artifact {}", path.display()))?;
        Ok(path)
    }

    fn remove_artifact(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)
            .with_context(|| format!("failed to remove artifact {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) fn make_test_pdf(texts: &[&str]) -> Vec<u8> {
    use lopdf::{Object, Stream, dictionary};

    let mut doc = Document::with_version("1.4");

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for text in texts {
        let content = format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "F1" => font_id,
                },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("test PDF serializes");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_text(bytes: &[u8]) -> String {
        let document = Document::load_mem(bytes).expect("artifact parses");
        let pages = document.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().expect("one page");
        let content = document.get_page_content(page_id).expect("page content");
        String::from_utf8_lossy(&content).into_owned()
    }

    #[test]
    fn extract_page_keeps_only_the_requested_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("scan.pdf");
        fs::write(&source, make_test_pdf(&["page one", "page two", "page three"]))
            .expect("source written");

        let store = PdfArtifactStore::new(dir.path().join("protocols"));
        let document = store.load_source_document(&source).expect("source loads");
        assert_eq!(store.page_count(&document), 3);

        let bytes = store.extract_page(&document, 2).expect("page extracted");
        let text = page_text(&bytes);
        assert!(text.contains("page two"));
        assert!(!text.contains("page one"));

        // the loaded source is untouched
        assert_eq!(store.page_count(&document), 3);
    }

    #[test]
    fn extract_page_rejects_out_of_range_numbers() {
        let store = PdfArtifactStore::new("unused");
        let document = Document::load_mem(&make_test_pdf(&["only"])).expect("source parses");
        assert!(store.extract_page(&document, 0).is_err());
        assert!(store.extract_page(&document, 2).is_err());
    }

    #[test]
    fn write_and_remove_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PdfArtifactStore::new(dir.path().join("protocols"));

        let path = store.write_artifact(b"%PDF-1.4", "a.pdf").expect("written");
        assert_eq!(path, store.protocol_dir().join("a.pdf"));
        assert!(path.exists());

        assert!(store.remove_artifact(&path).expect("removed"));
        assert!(!path.exists());
        assert!(!store.remove_artifact(&path).expect("nothing to remove"));
    }

    #[test]
    fn unreadable_source_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("broken.pdf");
        fs::write(&source, b"not a pdf").expect("written");
        let store = PdfArtifactStore::new(dir.path());
        assert!(store.load_source_document(&source).is_err());
        assert!(store.load_source_document(&dir.path().join("missing.pdf")).is_err());
    }
}
