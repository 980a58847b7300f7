//! PDF text extraction backends.
//!
//! Default try order: pdftotext (poppler), Apache Tika over HTTP, then OCR
//! through pdftoppm + tesseract for scanned documents.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::process::Command;
use tracing::debug;

use crate::domain::{ExtractedText, ExtractionRequest, Payload, TaskType};

use super::process::{require_executable, run};
use super::Backend;

/// Page separator emitted by pdftotext
const FORM_FEED: char = '\x0c';

fn pdf_path(request: &ExtractionRequest) -> Result<&Path> {
    request
        .source
        .as_path()
        .context("PDF extraction needs a file path")
}

/// Split pdftotext output into text and a page count
fn split_pages(raw: &str) -> ExtractedText {
    let pages = raw
        .split(FORM_FEED)
        .filter(|page| !page.trim().is_empty())
        .count();
    let text = raw.replace(FORM_FEED, "\n");
    let extracted = ExtractedText::new(text.trim_end().to_string());
    if pages > 0 {
        extracted.with_pages(pages as u32)
    } else {
        extracted
    }
}

/// Text layer extraction via poppler's `pdftotext`
pub struct PdftotextBackend {
    binary: String,
}

impl PdftotextBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Backend for PdftotextBackend {
    fn name(&self) -> &str {
        "pdftotext"
    }

    fn task(&self) -> TaskType {
        TaskType::PdfText
    }

    async fn health_check(&self) -> Result<()> {
        require_executable(&self.binary).map(|_| ())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let path = pdf_path(request)?;
        let mut command = Command::new(&self.binary);
        command.arg("-layout").arg(path).arg("-");

        let output = run(&mut command, None, "pdftotext").await?;
        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(Payload::Text(split_pages(&raw)))
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {}: {}", css, e))
}

/// Visible text of an element, one trimmed line per non-blank line
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text, page count and tables from Tika's XHTML rendering
///
/// Tika wraps each page in `<div class="page">` and keeps tables as
/// `<table>` markup. Rows without any non-blank cell are dropped.
fn parse_xhtml(xhtml: &str) -> Result<ExtractedText> {
    let document = Html::parse_document(xhtml);
    let body = selector("body")?;
    let page = selector("div.page")?;
    let table = selector("table")?;
    let row = selector("tr")?;
    let cell = selector("td, th")?;

    let text = document
        .select(&body)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let tables: Vec<Vec<Vec<String>>> = document
        .select(&table)
        .map(|table| {
            table
                .select(&row)
                .map(|tr| tr.select(&cell).map(element_text).collect::<Vec<_>>())
                .filter(|cells| cells.iter().any(|c| !c.is_empty()))
                .collect::<Vec<_>>()
        })
        .filter(|rows| !rows.is_empty())
        .collect();

    let pages = document.select(&page).count();
    let mut extracted = ExtractedText::new(text);
    extracted.tables = tables;
    Ok(if pages > 0 {
        extracted.with_pages(pages as u32)
    } else {
        extracted
    })
}

/// Apache Tika server (`PUT /tika`), read back as XHTML
pub struct TikaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl TikaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Backend for TikaBackend {
    fn name(&self) -> &str {
        "tika"
    }

    fn task(&self) -> TaskType {
        TaskType::PdfText
    }

    async fn health_check(&self) -> Result<()> {
        self.client
            .get(format!("{}/tika", self.base_url))
            .send()
            .await
            .with_context(|| format!("Tika server unreachable at {}", self.base_url))?
            .error_for_status()
            .context("Tika health check failed")?;
        Ok(())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let path = pdf_path(request)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let xhtml = self
            .client
            .put(format!("{}/tika", self.base_url))
            .header(reqwest::header::ACCEPT, "text/html")
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes)
            .send()
            .await
            .context("Tika request failed")?
            .error_for_status()
            .context("Tika returned an error status")?
            .text()
            .await
            .context("Failed to read Tika response")?;

        let extracted = parse_xhtml(&xhtml)?;
        debug!(
            pages = ?extracted.pages,
            tables = extracted.tables.len(),
            "Parsed Tika XHTML"
        );
        Ok(Payload::Text(extracted))
    }
}

/// OCR: rasterize pages with `pdftoppm`, then run `tesseract` on each page
pub struct TesseractBackend {
    pdftoppm: String,
    tesseract: String,
    dpi: u32,
}

impl TesseractBackend {
    pub fn new(pdftoppm: impl Into<String>, tesseract: impl Into<String>, dpi: u32) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            tesseract: tesseract.into(),
            dpi,
        }
    }
}

#[async_trait]
impl Backend for TesseractBackend {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn task(&self) -> TaskType {
        TaskType::PdfText
    }

    async fn health_check(&self) -> Result<()> {
        require_executable(&self.pdftoppm)?;
        require_executable(&self.tesseract)?;
        Ok(())
    }

    async fn invoke(&self, request: &ExtractionRequest) -> Result<Payload> {
        let path = pdf_path(request)?;
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;
        let prefix = temp_dir.path().join("page");

        let mut rasterize = Command::new(&self.pdftoppm);
        rasterize
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(path)
            .arg(&prefix);
        run(&mut rasterize, None, "pdftoppm").await?;

        // pdftoppm zero-pads page numbers to a common width, so name order is page order
        let mut images: Vec<_> = std::fs::read_dir(temp_dir.path())
            .context("Failed to list rasterized pages")?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
            .collect();
        images.sort();
        debug!(pages = images.len(), "Rasterized PDF for OCR");

        let mut pages = Vec::with_capacity(images.len());
        for image in &images {
            let mut ocr = Command::new(&self.tesseract);
            ocr.arg(image).arg("stdout");
            let output = run(&mut ocr, None, "tesseract").await?;
            pages.push(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let text = pages.join("\n\n");
        Ok(Payload::Text(
            ExtractedText::new(text).with_pages(images.len() as u32),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_split_pages_counts_form_feeds() {
        let extracted = split_pages("page one\x0cpage two\x0c");
        assert_eq!(extracted.pages, Some(2));
        assert_eq!(extracted.text, "page one\npage two");
    }

    #[test]
    fn test_split_pages_blank_output() {
        let extracted = split_pages("\x0c\x0c");
        assert_eq!(extracted.pages, None);
        assert!(extracted.text.trim().is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_probe() {
        let backend = PdftotextBackend::new("/no/such/pdftotext");
        assert!(backend.health_check().await.is_err());
    }

    const TIKA_XHTML: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>catalog</title></head>
<body><div class="page"><p>  Catalog 2024
</p><p>Porcelain tiles</p></div>
<div class="page"><table><tbody>
<tr><th>Item</th><th>Price</th></tr>
<tr><td>Oak desk</td><td>450</td></tr>
<tr><td></td><td></td></tr>
</tbody></table></div>
</body></html>"#;

    #[tokio::test]
    async fn test_tika_extracts_text() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tika"))
            .and(header("accept", "text/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TIKA_XHTML))
            .mount(&server)
            .await;

        let temp = tempfile::TempDir::new().unwrap();
        let pdf = temp.path().join("catalog.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        let backend = TikaBackend::new(server.uri());
        let payload = backend.invoke(&ExtractionRequest::pdf(&pdf)).await.unwrap();
        let extracted = match payload {
            Payload::Text(extracted) => extracted,
            other => panic!("unexpected payload: {:?}", other),
        };

        assert!(extracted.text.starts_with("Catalog 2024\nPorcelain tiles"));
        assert_eq!(extracted.pages, Some(2));
        assert_eq!(
            extracted.tables,
            vec![vec![
                vec!["Item".to_string(), "Price".to_string()],
                vec!["Oak desk".to_string(), "450".to_string()],
            ]]
        );
    }

    #[test]
    fn test_xhtml_without_pages_or_tables() {
        let extracted =
            parse_xhtml("<html><body><p>  Spring\n</p><table><tr><td> </td></tr></table></body></html>")
                .unwrap();
        assert_eq!(extracted.text, "Spring");
        assert_eq!(extracted.pages, None);
        assert!(extracted.tables.is_empty());
    }

    #[tokio::test]
    async fn test_tika_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tika"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let temp = tempfile::TempDir::new().unwrap();
        let pdf = temp.path().join("broken.pdf");
        std::fs::write(&pdf, b"not a pdf").unwrap();

        let backend = TikaBackend::new(server.uri());
        assert!(backend.invoke(&ExtractionRequest::pdf(&pdf)).await.is_err());
    }
}
