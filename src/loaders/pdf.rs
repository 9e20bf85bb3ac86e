use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

use super::Document;
use crate::error::LoadError;

pub async fn load_pdf(path: &Path) -> Result<Document, LoadError> {
    let pages = extract_pdf_pages(path)
        .await
        .map_err(|err| LoadError::Pdf(format!("{err:#}")))?;

    let document = Document::from_fragments(pages);
    if document.is_empty() {
        return Err(LoadError::EmptyPdf);
    }
    Ok(document)
}

/// One entry per page. Uses poppler's `pdftotext` when it is installed and
/// falls back to `pdf-extract`.
async fn extract_pdf_pages(pdf_path: &Path) -> Result<Vec<String>> {
    let mut pages = Vec::new();

    if has_command("pdftotext").await {
        let page_count = get_pdf_page_count(pdf_path).await.unwrap_or(0);
        for page in 1..=page_count {
            let output = Command::new("pdftotext")
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg("-enc")
                .arg("UTF-8")
                .arg("-nopgbrk")
                .arg(pdf_path)
                .arg("-")
                .output()
                .await
                .with_context(|| format!("failed to run pdftotext for page {}", page))?;

            if !output.status.success() {
                continue;
            }

            pages.push(normalize_page(&String::from_utf8_lossy(&output.stdout)));
        }
    }

    if pages.iter().all(|page| page.is_empty()) {
        let pdf_path = pdf_path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&pdf_path))
            .await
            .context("PDF extraction task panicked")?
            .context("failed to extract text from PDF")?;

        pages = split_pages(&extracted);
    }

    Ok(pages)
}

fn split_pages(text: &str) -> Vec<String> {
    text.split('\u{000C}').map(normalize_page).collect()
}

fn normalize_page(input: &str) -> String {
    input
        .replace('\u{00A0}', " ")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

async fn get_pdf_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("pdfinfo exited with non-zero status"));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let regex = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?;
    let pages = regex
        .captures(&stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| anyhow::anyhow!("unable to parse page count from pdfinfo"))?;

    Ok(pages)
}

async fn has_command(binary: &str) -> bool {
    // pdftotext prints its version on stderr with a non-zero exit on some
    // builds, so probe PATH instead.
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}

/// A valid one-page PDF whose page has an empty content stream.
#[cfg(test)]
pub(crate) fn blank_pdf() -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> /Contents 4 0 R >>",
        "<< /Length 0 >>\nstream\n\nendstream",
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
    }

    let xref = pdf.len();
    let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        tail.push_str(&format!("{offset:010} 00000 n \n"));
    }
    tail.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(tail.as_bytes());
    pdf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_split_pages() {
        let pages = split_pages("Página 1  \nlinha\u{000C}\u{000C}Página\u{00A0}3\n");
        assert_eq!(pages, vec!["Página 1\nlinha", "", "Página 3"]);

        let document = Document::from_fragments(pages);
        assert_eq!(document.text(), "Página 1\nlinha\n\nPágina 3");
    }

    #[tokio::test]
    async fn blank_page_is_empty_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.pdf");
        std::fs::write(&path, blank_pdf()).unwrap();

        let err = load_pdf(&path).await.unwrap_err();
        assert!(matches!(err, LoadError::EmptyPdf));
    }

    #[tokio::test]
    async fn garbage_bytes_fail_terminally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let err = load_pdf(&path).await.unwrap_err();
        assert!(matches!(err, LoadError::Pdf(_) | LoadError::EmptyPdf));
    }
}
