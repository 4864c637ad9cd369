//! Format-specific text extraction for uploaded documents.
//!
//! Dispatches on the (lowercased) filename extension and returns plain
//! UTF-8 text. Extraction never panics; any failure is a typed error that
//! the ingestion pipeline surfaces as an upload validation rejection.

use std::io::Read;
use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file extension: .{0}")]
    UnsupportedExtension(String),
    #[error("file is not valid UTF-8 text")]
    InvalidUtf8,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Lowercased extension of a filename, without the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Extract plain text from uploaded bytes based on the filename extension.
pub fn extract_text(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    match extension {
        "txt" | "md" => std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| ExtractError::InvalidUtf8),
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_text_runs(&doc_xml)
}

/// Collect the text runs (`w:t` elements) from a WordprocessingML body,
/// separating paragraphs with newlines.
fn extract_text_runs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
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
    fn test_file_extension() {
        assert_eq!(file_extension("report.PDF"), Some("pdf".to_string()));
        assert_eq!(
            file_extension("statement.2024.txt"),
            Some("txt".to_string())
        );
        assert_eq!(file_extension("no_extension"), None);
    }

    #[test]
    fn test_plain_text_passes_through() {
        let text = extract_text("closing balance: $10".as_bytes(), "txt").unwrap();
        assert_eq!(text, "closing balance: $10");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = extract_text(&[0xff, 0xfe, 0x00], "txt").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUtf8));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let err = extract_text(b"binary", "exe").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension(_)));
    }

    #[test]
    fn test_invalid_pdf_rejected() {
        let err = extract_text(b"not a pdf", "pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_invalid_docx_rejected() {
        let err = extract_text(b"not a zip", "docx").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn test_docx_text_runs_extracted() {
        // A minimal, valid DOCX: one zip entry holding document.xml.
        let xml = br#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Opening balance</w:t></w:r></w:p>
    <w:p><w:r><w:t>Closing balance</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            use std::io::Write;
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(xml).unwrap();
            writer.finish().unwrap();
        }

        let text = extract_text(cursor.get_ref(), "docx").unwrap();
        assert!(text.contains("Opening balance"));
        assert!(text.contains("Closing balance"));
    }
}
