use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use oraculo::chat::{ChatService, Session};
use oraculo::llm::ProviderFactory;
use oraculo::loaders::DocumentLoader;
use oraculo::{run_server, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let loader = DocumentLoader::new(&config)?;
    let models = ProviderFactory::new(config.endpoints.clone())?;
    let chat = ChatService::new(loader, Arc::new(models));
    let session = Session::from_config(&config).shared();

    run_server(config, chat, session).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
