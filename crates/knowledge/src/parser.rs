//! Source parsing and text extraction for files and URLs.

use motolaw_core::{AppError, AppResult};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Pdf,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") => Self::PlainText,
            Some("pdf") | Some("PDF") => Self::Pdf,
            _ => Self::Unknown,
        }
    }

    /// Detect content type from an HTTP `Content-Type` header value.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence {
            "text/html" | "application/xhtml+xml" => Self::Html,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            "text/plain" => Self::PlainText,
            "application/pdf" => Self::Pdf,
            _ => Self::Unknown,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Pdf => "pdf",
            Self::Unknown => "unknown",
        }
    }
}

/// Parse a source file and extract clean text.
pub fn parse_file(path: &Path) -> AppResult<(String, ContentType)> {
    let content_type = ContentType::from_path(path);

    if content_type == ContentType::Pdf {
        let bytes = fs::read(path)
            .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;
        return Ok((extract_pdf(&bytes)?, content_type));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    Ok((extract_text(&raw, content_type)?, content_type))
}

/// Fetch a URL and extract clean text.
pub async fn fetch_url(url: &str, timeout: Duration) -> AppResult<(String, ContentType)> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Knowledge(format!("Failed to build HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(AppError::Knowledge(format!(
            "Failed to fetch {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let content_type = match ContentType::from_mime(&mime) {
        ContentType::Unknown => ContentType::from_path(Path::new(&url.to_lowercase())),
        known => known,
    };

    tracing::debug!(url, content_type = content_type.as_str(), "Fetched URL");

    if content_type == ContentType::Pdf {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to read body of {}: {}", url, e)))?;
        let text = tokio::task::spawn_blocking(move || extract_pdf(&bytes))
            .await
            .map_err(|e| AppError::Knowledge(format!("PDF extraction task failed: {}", e)))??;
        return Ok((text, content_type));
    }

    let raw = response
        .text()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to read body of {}: {}", url, e)))?;

    Ok((extract_text(&raw, content_type)?, content_type))
}

/// Extract clean text from raw content of a given type.
pub fn extract_text(raw: &str, content_type: ContentType) -> AppResult<String> {
    let cleaned = match content_type {
        ContentType::Markdown => clean_markdown(raw),
        ContentType::Html => clean_html(raw),
        ContentType::PlainText => raw.trim().to_string(),
        ContentType::Pdf => {
            return Err(AppError::Knowledge(
                "PDF content must be extracted from bytes".to_string(),
            ))
        }
        ContentType::Unknown => {
            if is_likely_text(raw) {
                raw.trim().to_string()
            } else {
                return Err(AppError::Knowledge("Binary content not supported".to_string()));
            }
        }
    };

    Ok(cleaned)
}

/// Extract the text layer of a PDF document.
pub fn extract_pdf(bytes: &[u8]) -> AppResult<String> {
    // pdf-extract panics on some malformed documents
    let raw = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| AppError::Knowledge("Malformed PDF document".to_string()))?
        .map_err(|e| AppError::Knowledge(format!("Failed to extract PDF text: {:?}", e)))?;

    let text = collapse_whitespace(&raw);
    if text.is_empty() {
        return Err(AppError::Knowledge(
            "PDF has no extractable text layer".to_string(),
        ));
    }

    Ok(text)
}

/// Clean markdown by removing excess formatting.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        // Horizontal rules and code fences
        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if trimmed.is_empty() {
            // Keep paragraph breaks for the splitter
            if !result.ends_with("\n\n") && !result.is_empty() {
                result.push('\n');
            }
        } else {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Case-insensitive ASCII prefix check on a byte slice.
fn starts_with_tag(rest: &str, tag: &str) -> bool {
    rest.as_bytes()
        .get(..tag.len())
        .map(|prefix| prefix.eq_ignore_ascii_case(tag.as_bytes()))
        .unwrap_or(false)
}

/// Clean HTML by stripping tags, scripts and styles.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;
            let rest = &text[i..];

            if starts_with_tag(rest, "<script") {
                in_script = true;
            } else if starts_with_tag(rest, "</script") {
                in_script = false;
            } else if starts_with_tag(rest, "<style") {
                in_style = true;
            } else if starts_with_tag(rest, "</style") {
                in_style = false;
            } else if starts_with_tag(rest, "<p")
                || starts_with_tag(rest, "<br")
                || starts_with_tag(rest, "<li")
                || starts_with_tag(rest, "<h")
            {
                result.push('\n');
            }
        } else if ch == '>' {
            in_tag = false;
        } else if !in_tag && !in_script && !in_style {
            result.push(ch);
        }
    }

    collapse_whitespace(&result)
}

/// Collapse whitespace within lines and drop empty lines.
fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check if text is likely UTF-8 text (not binary).
fn is_likely_text(data: &str) -> bool {
    !data.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::minimal_pdf;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::from_path(Path::new("rules.md")),
            ContentType::Markdown
        );
        assert_eq!(
            ContentType::from_path(Path::new("rules.txt")),
            ContentType::PlainText
        );
        assert_eq!(
            ContentType::from_path(Path::new("motorcycle.pdf")),
            ContentType::Pdf
        );
        assert_eq!(
            ContentType::from_path(Path::new("notes.docx")),
            ContentType::Unknown
        );
        assert_eq!(
            ContentType::from_mime("text/html; charset=utf-8"),
            ContentType::Html
        );
        assert_eq!(ContentType::from_mime("application/pdf"), ContentType::Pdf);
        assert_eq!(ContentType::Pdf.as_str(), "pdf");
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# 駕照\n\n大型重型機車\n\n```rust\ncode\n```\n\n第二段";
        let output = clean_markdown(input);
        assert!(output.contains("駕照"));
        assert!(output.contains("大型重型機車"));
        assert!(output.contains("第二段"));
        assert!(!output.contains("```"));
    }

    #[test]
    fn test_clean_html() {
        let input = "<html><body><p>Hello <b>world</b></p></body></html>";
        assert_eq!(clean_html(input), "Hello world");
    }

    #[test]
    fn test_clean_html_multibyte_and_script() {
        let input = "<HTML><SCRIPT>var x = 1;</SCRIPT><p>高速公路</p><p>禁止行駛</p></HTML>";
        let output = clean_html(input);
        assert_eq!(output, "高速公路\n禁止行駛");
    }

    #[test]
    fn test_extract_rejects_binary() {
        assert!(extract_text("a\0b", ContentType::Unknown).is_err());
        assert_eq!(
            extract_text("  plain  ", ContentType::PlainText).unwrap(),
            "plain"
        );
    }

    #[test]
    fn test_parse_pdf_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("helmet.pdf");
        fs::write(&path, minimal_pdf("Helmet required on all roads")).unwrap();

        let (text, content_type) = parse_file(&path).unwrap();
        assert_eq!(content_type, ContentType::Pdf);
        assert!(text.contains("Helmet"));
        assert!(text.contains("roads"));
    }

    #[test]
    fn test_extract_pdf_rejects_garbage() {
        assert!(extract_pdf(b"%PDF-1.4 truncated").is_err());
        assert!(extract_text("%PDF-1.4", ContentType::Pdf).is_err());
    }

    #[test]
    fn test_parse_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rules.md");
        fs::write(&path, "## 標線\n\n黃線禁止超車").unwrap();

        let (text, content_type) = parse_file(&path).unwrap();
        assert_eq!(content_type, ContentType::Markdown);
        assert!(text.contains("黃線禁止超車"));
    }
}
