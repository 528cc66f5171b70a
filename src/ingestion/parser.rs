use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};

use crate::app::error::AppError;

/// Minimum extractable text length after trimming (spec.md §4.6 step 3).
const MIN_TEXT_CHARS: usize = 100;

/// `Parse` by content-type (spec.md §4.6 step 3). Each branch either
/// returns extracted text or a specific pipeline error (`PDF_ENCRYPTED`,
/// `PARSE_ERROR`); the caller applies the shared `INSUFFICIENT_TEXT`
/// length gate once, regardless of which branch ran.
pub fn parse(content_type: &str, bytes: &[u8]) -> Result<String, AppError> {
    let text = match normalize_content_type(content_type) {
        "pdf" => parse_pdf(bytes)?,
        "docx" => parse_docx(bytes)?,
        "txt" | "md" => parse_plain_text(bytes)?,
        other => return Err(AppError::ParseError(format!("unsupported content type: {other}"))),
    };

    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TEXT_CHARS {
        return Err(AppError::InsufficientText);
    }

    Ok(trimmed.to_string())
}

fn normalize_content_type(content_type: &str) -> &str {
    match content_type.to_ascii_lowercase().as_str() {
        "application/pdf" => "pdf",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "text/plain" => "txt",
        "text/markdown" => "md",
        other if other == "pdf" || other == "docx" || other == "txt" || other == "md" => {
            // already bare extensions; leak 'static via match arms below
            return bare_extension(other);
        }
        _ => "",
    }
}

fn bare_extension(s: &str) -> &'static str {
    match s {
        "pdf" => "pdf",
        "docx" => "docx",
        "txt" => "txt",
        "md" => "md",
        _ => "",
    }
}

fn parse_pdf(bytes: &[u8]) -> Result<String, AppError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| AppError::ParseError(format!("failed to load PDF: {e}")))?;

    if document.is_encrypted() {
        return Err(AppError::PdfEncrypted);
    }

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    document
        .extract_text(&page_numbers)
        .map_err(|e| AppError::ParseError(format!("failed to extract PDF text: {e}")))
}

fn parse_docx(bytes: &[u8]) -> Result<String, AppError> {
    let docx = read_docx(bytes).map_err(|e| AppError::ParseError(format!("failed to read DOCX: {e:?}")))?;

    let mut text = String::new();
    for child in docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            for run_child in paragraph.children {
                if let ParagraphChild::Run(run) = run_child {
                    for r in run.children {
                        if let RunChild::Text(t) = r {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            text.push('\n');
        }
    }

    Ok(text)
}

fn parse_plain_text(bytes: &[u8]) -> Result<String, AppError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| AppError::ParseError(format!("invalid UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_under_minimum_length_is_insufficient() {
        let err = parse("text/plain", b"too short").unwrap_err();
        assert!(matches!(err, AppError::InsufficientText));
    }

    #[test]
    fn plain_text_at_minimum_length_is_accepted() {
        let long_enough = "a".repeat(MIN_TEXT_CHARS);
        let result = parse("text/plain", long_enough.as_bytes()).unwrap();
        assert_eq!(result.chars().count(), MIN_TEXT_CHARS);
    }

    #[test]
    fn markdown_is_accepted_as_plain_text() {
        let long_enough = "# heading\n".to_string() + &"body text ".repeat(20);
        assert!(parse("text/markdown", long_enough.as_bytes()).is_ok());
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = parse("text/plain", &[0xff, 0xfe, 0xfd]).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[test]
    fn unsupported_content_type_is_a_parse_error() {
        let err = parse("image/png", b"not text").unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }
}
