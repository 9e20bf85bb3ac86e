pub mod pdf;
pub mod tabular;
pub mod text;
pub mod website;
pub mod youtube;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::error::LoadError;
use crate::models::SourceType;
use crate::prompt::escape_template;

pub use website::{HttpPageFetcher, PageFetcher, WebsiteLoader};
pub use youtube::{HttpTranscriptFetcher, TranscriptFetcher, YoutubeLoader};

/// Plain text extracted from one source. Fragments (pages, rows) are joined
/// with blank lines and carry no structure afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
}

impl Document {
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let text = fragments
            .into_iter()
            .map(|fragment| fragment.as_ref().trim().to_string())
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Text with template braces doubled, safe to embed in a prompt template.
    pub fn escaped(&self) -> String {
        escape_template(&self.text)
    }
}

/// What the user handed over for a source: a URL or video id, the raw bytes
/// of an uploaded file, a path to a local file, or nothing at all.
#[derive(Debug, Clone)]
pub enum SourceInput {
    Locator(String),
    Upload(Vec<u8>),
    Path(PathBuf),
    Missing,
}

#[derive(Clone)]
pub struct DocumentLoader {
    website: WebsiteLoader,
    youtube: YoutubeLoader,
    upload_dir: PathBuf,
}

impl DocumentLoader {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let pages = Arc::new(HttpPageFetcher::new(config.http_timeout)?);
        let transcripts = Arc::new(HttpTranscriptFetcher::new(config.http_timeout)?);
        Ok(Self::with_fetchers(config, pages, transcripts))
    }

    pub fn with_fetchers(
        config: &AppConfig,
        pages: Arc<dyn PageFetcher>,
        transcripts: Arc<dyn TranscriptFetcher>,
    ) -> Self {
        Self {
            website: WebsiteLoader::new(pages, config.website_retry.clone()),
            youtube: YoutubeLoader::new(transcripts, config.transcript_language.clone()),
            upload_dir: config.upload_dir.clone(),
        }
    }

    pub async fn load(&self, source: SourceType, input: SourceInput) -> Result<Document, LoadError> {
        let result = self.dispatch(source, input).await;
        match &result {
            Ok(document) => tracing::info!(
                "loaded {} document ({} chars)",
                source.label(),
                document.len()
            ),
            Err(err) => tracing::error!("failed to load {} document: {}", source.label(), err),
        }
        result
    }

    async fn dispatch(&self, source: SourceType, input: SourceInput) -> Result<Document, LoadError> {
        match (source, input) {
            (SourceType::Site, SourceInput::Locator(url)) if !url.trim().is_empty() => {
                self.website.load(&url).await
            }
            (SourceType::Youtube, SourceInput::Locator(video)) if !video.trim().is_empty() => {
                self.youtube.load(&video).await
            }
            (source, SourceInput::Upload(bytes)) if source.is_upload() => {
                self.load_upload(source, &bytes).await
            }
            (source, SourceInput::Path(path)) if source.is_upload() => {
                load_file(source, &path).await
            }
            (source, _) => Err(LoadError::MissingInput(source.label())),
        }
    }

    /// Writes the upload to a temp file, parses it, and removes the file
    /// whether or not parsing succeeded.
    async fn load_upload(&self, source: SourceType, bytes: &[u8]) -> Result<Document, LoadError> {
        let suffix = source.file_suffix().unwrap_or(".bin");
        let mut temp = tempfile::Builder::new()
            .prefix("oraculo-")
            .suffix(suffix)
            .tempfile_in(&self.upload_dir)
            .map_err(|err| parser_error(source, err.to_string()))?;

        temp.write_all(bytes)
            .and_then(|_| temp.flush())
            .map_err(|err| parser_error(source, err.to_string()))?;

        let result = load_file(source, temp.path()).await;

        let temp_path = temp.path().to_path_buf();
        if let Err(err) = temp.close() {
            tracing::warn!("failed to remove upload {}: {}", temp_path.display(), err);
        }

        result
    }
}

async fn load_file(source: SourceType, path: &Path) -> Result<Document, LoadError> {
    match source {
        SourceType::Pdf => pdf::load_pdf(path).await,
        SourceType::Txt => text::load_txt(path).await,
        SourceType::Csv => tabular::load_csv(path).await,
        SourceType::Site | SourceType::Youtube => Err(LoadError::MissingInput(source.label())),
    }
}

fn parser_error(source: SourceType, detail: String) -> LoadError {
    match source {
        SourceType::Pdf => LoadError::Pdf(detail),
        SourceType::Csv => LoadError::Csv(detail),
        SourceType::Youtube => LoadError::Transcript(detail),
        SourceType::Txt | SourceType::Site => LoadError::Txt(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoPages;

    #[async_trait]
    impl PageFetcher for NoPages {
        async fn fetch_text(&self, _url: &str, _user_agent: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    struct NoTranscripts;

    #[async_trait]
    impl TranscriptFetcher for NoTranscripts {
        async fn fetch_transcript(&self, _video_id: &str, _language: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn test_loader(upload_dir: &Path) -> DocumentLoader {
        let mut config = AppConfig::from_env();
        config.upload_dir = upload_dir.to_path_buf();
        config.website_retry.max_attempts = 5;
        config.website_retry.delay = Duration::ZERO;
        config.transcript_language = "pt".to_string();
        DocumentLoader::with_fetchers(&config, Arc::new(NoPages), Arc::new(NoTranscripts))
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false)
    }

    #[test]
    fn fragments_join_with_blank_lines() {
        let document = Document::from_fragments(["page one", "  ", "page two\n"]);
        assert_eq!(document.text(), "page one\n\npage two");
    }

    #[test]
    fn escaped_document_doubles_braces() {
        let document = Document::from_fragments(["see {user_notes}"]);
        assert_eq!(document.escaped(), "see {{user_notes}}");
    }

    #[tokio::test]
    async fn upload_is_parsed_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let loader = test_loader(dir.path());

        let document = loader
            .load(
                SourceType::Txt,
                SourceInput::Upload("Capítulo 1\nO começo.".as_bytes().to_vec()),
            )
            .await
            .unwrap();

        assert_eq!(document.text(), "Capítulo 1\nO começo.");
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn failed_upload_is_removed_too() {
        let dir = tempfile::tempdir().unwrap();
        let loader = test_loader(dir.path());

        let err = loader
            .load(SourceType::Csv, SourceInput::Upload(b"name,age\n".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::EmptyCsv));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn every_source_rejects_empty_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let loader = test_loader(dir.path());

        let site = loader
            .load(SourceType::Site, SourceInput::Locator("example.com".into()))
            .await
            .unwrap_err();
        assert!(matches!(site, LoadError::WebsiteUnavailable { attempts: 5 }));

        let video = loader
            .load(SourceType::Youtube, SourceInput::Locator("r_p_t9IRc0A".into()))
            .await
            .unwrap_err();
        assert!(matches!(video, LoadError::EmptyTranscript));

        let txt = loader
            .load(SourceType::Txt, SourceInput::Upload(b" \n\n ".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(txt, LoadError::EmptyTxt));

        let csv = loader
            .load(SourceType::Csv, SourceInput::Upload(b"a,b\n".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(csv, LoadError::EmptyCsv));

        let pdf = loader
            .load(SourceType::Pdf, SourceInput::Upload(pdf::blank_pdf()))
            .await
            .unwrap_err();
        assert!(matches!(pdf, LoadError::EmptyPdf));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn zero_byte_upload_reports_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = test_loader(dir.path());

        let txt = loader
            .load(SourceType::Txt, SourceInput::Upload(vec![]))
            .await
            .unwrap_err();
        assert_eq!(
            txt.to_string(),
            "O arquivo de texto está vazio ou não pôde ser carregado."
        );

        let csv = loader
            .load(SourceType::Csv, SourceInput::Upload(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(csv, LoadError::EmptyCsv));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn missing_input_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let loader = test_loader(dir.path());

        let err = loader
            .load(SourceType::Pdf, SourceInput::Missing)
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingInput("PDF")));

        let err = loader
            .load(SourceType::Site, SourceInput::Locator("  ".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingInput("Site")));

        let err = loader
            .load(SourceType::Site, SourceInput::Upload(b"<html></html>".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingInput("Site")));
    }
}
