//! Text extraction from uploaded binary documents.
//!
//! The ingestion pipeline only sees the [`TextExtractor`] trait: bytes plus a
//! MIME type in, plain UTF-8 text out. [`BuiltinExtractor`] handles PDF,
//! DOCX, PPTX, and plain text in-process; scanned PDFs that yield no text go
//! through the `ocr` hook, which an external OCR engine can implement.

use std::io::Read;

/// MIME types accepted for upload.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_PPT: &str = "application/vnd.ms-powerpoint";
pub const MIME_TXT: &str = "text/plain";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("unable to extract text from file")]
    Empty,
    #[error("extraction failed: {0}")]
    Parse(String),
}

/// Guess the MIME type from a filename extension.
pub fn mime_from_filename(name: &str) -> &'static str {
    let ext = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "txt" => MIME_TXT,
        "pptx" => MIME_PPTX,
        "ppt" => MIME_PPT,
        _ => "application/octet-stream",
    }
}

/// Extraction seam between the ingestion pipeline and the document parsers.
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from `bytes`, dispatching on `mime`.
    fn extract(&self, bytes: &[u8], mime: &str) -> Result<String, ExtractError>;

    /// Fallback for PDFs whose text layer is empty (scanned documents).
    /// The default has no OCR engine and reports the text as missing.
    fn ocr(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
        Err(ExtractError::Empty)
    }
}

/// In-process extractor for the supported upload formats.
pub struct BuiltinExtractor;

impl TextExtractor for BuiltinExtractor {
    fn extract(&self, bytes: &[u8], mime: &str) -> Result<String, ExtractError> {
        let text = match mime {
            MIME_PDF => {
                let text = extract_pdf(bytes)?;
                if text.trim().is_empty() {
                    self.ocr(bytes)?
                } else {
                    text
                }
            }
            MIME_DOCX => extract_docx(bytes)?,
            MIME_PPTX | MIME_PPT => extract_pptx(bytes)?,
            MIME_TXT => String::from_utf8_lossy(bytes).into_owned(),
            other => return Err(ExtractError::UnsupportedType(other.to_string())),
        };

        // NUL bytes break downstream storage; strip them before validation
        let text: String = text.chars().filter(|c| *c != '\0').collect();
        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }
        Ok(text)
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Parse(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Parse(e.to_string()))?;
    let xml = read_zip_entry(&mut archive, "word/document.xml")?;
    collect_text_elements(&xml)
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Parse(e.to_string()))?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    // slide7.xml sorts after slide10.xml lexically; order by slide number
    slide_names.sort_by_key(|name| {
        name.trim_start_matches("ppt/slides/slide")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut out = String::new();
    for name in slide_names {
        let xml = read_zip_entry(&mut archive, &name)?;
        let text = collect_text_elements(&xml)?;
        if !out.is_empty() && !text.is_empty() {
            out.push(' ');
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn read_zip_entry(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Parse(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Parse(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Parse(format!(
            "ZIP entry {} exceeds size limit",
            name
        )));
    }
    Ok(out)
}

/// Walk OOXML and collect the contents of `t` elements (`w:t` in DOCX,
/// `a:t` in PPTX), joined by spaces.
fn collect_text_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                let text = te.unescape().unwrap_or_default();
                if !text.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(text.as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_returns_error() {
        let err = BuiltinExtractor
            .extract(b"foo", "application/octet-stream")
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType(_)));
    }

    #[test]
    fn invalid_pdf_returns_parse_error() {
        let err = BuiltinExtractor.extract(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn invalid_zip_returns_parse_error_for_docx() {
        let err = BuiltinExtractor
            .extract(b"not a zip", MIME_DOCX)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = BuiltinExtractor
            .extract("hello world".as_bytes(), MIME_TXT)
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn nul_bytes_are_stripped() {
        let text = BuiltinExtractor
            .extract(b"hel\x00lo", MIME_TXT)
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn whitespace_only_text_is_empty() {
        let err = BuiltinExtractor.extract(b"  \n\t ", MIME_TXT).unwrap_err();
        assert!(matches!(err, ExtractError::Empty));
    }

    #[test]
    fn mime_guessing_from_extension() {
        assert_eq!(mime_from_filename("paper.pdf"), MIME_PDF);
        assert_eq!(mime_from_filename("notes.TXT"), MIME_TXT);
        assert_eq!(mime_from_filename("slides.pptx"), MIME_PPTX);
        assert_eq!(mime_from_filename("report.docx"), MIME_DOCX);
        assert_eq!(mime_from_filename("blob"), "application/octet-stream");
    }
}
