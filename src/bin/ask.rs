use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

use oraculo::chat::{ChatService, InitializeRequest, Session};
use oraculo::config::AppConfig;
use oraculo::llm::ProviderFactory;
use oraculo::loaders::{DocumentLoader, SourceInput};
use oraculo::models::{Provider, SourceType};

#[derive(Parser, Debug)]
#[command(name = "oraculo-ask")]
#[command(about = "Ask one question about a website, YouTube video, or PDF/TXT/CSV file")]
struct Cli {
    /// site, youtube, pdf, txt or csv
    #[arg(long, value_parser = parse_source)]
    source: SourceType,
    /// URL, video id, or path to the local file
    #[arg(long)]
    input: String,
    /// groq or gemini
    #[arg(long, value_parser = parse_provider)]
    provider: Provider,
    /// Defaults to the first model offered by the provider
    #[arg(long)]
    model: Option<String>,
    /// Falls back to GROQ_API_KEY / GOOGLE_API_KEY
    #[arg(long)]
    api_key: Option<String>,
    question: String,
}

fn parse_source(value: &str) -> Result<SourceType, String> {
    SourceType::parse(value).ok_or_else(|| format!("unknown source type: {value}"))
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    Provider::parse(value).ok_or_else(|| format!("unknown provider: {value}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env();
    let loader = DocumentLoader::new(&config)?;
    let models = ProviderFactory::new(config.endpoints.clone())?;
    let chat = ChatService::new(loader, Arc::new(models));
    let session = Session::from_config(&config).shared();

    let input = if cli.source.is_upload() {
        SourceInput::Path(PathBuf::from(cli.input))
    } else {
        SourceInput::Locator(cli.input)
    };
    let model = match cli.model {
        Some(model) => model,
        None => cli
            .provider
            .models()
            .first()
            .map(|m| m.to_string())
            .unwrap_or_default(),
    };

    let ready = chat
        .initialize(
            &session,
            InitializeRequest {
                source: cli.source,
                input,
                provider: cli.provider,
                model,
                api_key: cli.api_key,
            },
        )
        .await?;
    tracing::info!(
        "loaded {} characters from {}",
        ready.document_chars,
        ready.source_type.label()
    );

    let mut reply = chat.reply(&session, &cli.question).await?;
    let mut stdout = std::io::stdout();
    while let Some(chunk) = reply.next().await {
        stdout.write_all(chunk?.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_is_required_and_model_is_optional() {
        assert!(Cli::try_parse_from(["oraculo-ask", "--source", "site", "--input", "a.com", "oi"]).is_err());

        let cli = Cli::try_parse_from([
            "oraculo-ask",
            "--source",
            "pdf",
            "--input",
            "manual.pdf",
            "--provider",
            "Google-Gemini",
            "qual o prazo?",
        ])
        .unwrap();
        assert_eq!(cli.source, SourceType::Pdf);
        assert_eq!(cli.provider, Provider::Gemini);
        assert_eq!(cli.model, None);
        assert_eq!(cli.question, "qual o prazo?");
    }
}
