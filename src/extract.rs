//! Text extraction for uploaded files.
//!
//! The enrichment pipeline supplies raw bytes plus a declared content kind;
//! this module returns plain UTF-8 text. Plain text passes through, PDF text
//! is extracted page by page in page order, and DOCX text is pulled from the
//! word-processing XML body.

use std::io::Read;

use crate::error::{Error, Result};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Declared content kind of an uploaded file, selecting the extraction
/// strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    /// UTF-8 (or lossily-decoded) text: pass-through.
    PlainText,
    /// Paginated document; per-page text concatenated in page order.
    Pdf,
    /// Word-processor document; raw text of the XML body.
    Docx,
}

impl ContentKind {
    /// Detect the content kind from a filename extension. Anything not
    /// recognized as a binary document format is treated as plain text.
    pub fn from_filename(name: &str) -> Self {
        match name.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "pdf" => ContentKind::Pdf,
            Some(ext) if ext == "docx" => ContentKind::Docx,
            _ => ContentKind::PlainText,
        }
    }
}

/// Extract plain text from `bytes` according to `kind`.
pub fn extract_text(bytes: &[u8], kind: ContentKind) -> Result<String> {
    match kind {
        ContentKind::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ContentKind::Pdf => extract_pdf(bytes),
        ContentKind::Docx => extract_docx(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    // pdf-extract walks pages in order and concatenates their text.
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::Pipeline(format!("PDF extraction failed: {}", e)))
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| Error::Pipeline(format!("DOCX is not a valid archive: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| Error::Pipeline("DOCX has no word/document.xml".to_string()))?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| Error::Pipeline(format!("DOCX read failed: {}", e)))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(Error::Pipeline(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    body_text(&xml)
}

/// Collect the text runs (`w:t`) of the document body, separating paragraphs
/// with newlines.
fn body_text(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    // no trim_text: runs may carry significant leading/trailing spaces
    let mut buf = Vec::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text_run => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(Error::Pipeline(format!("DOCX XML parse failed: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}
