use thiserror::Error;

use crate::models::Provider;

/// Terminal outcome of a document load. The `Display` text is what the user sees.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Nenhum arquivo ou URL foi informado para o tipo {0}.")]
    MissingInput(&'static str),
    #[error("Não foi possível carregar o site após várias tentativas.")]
    WebsiteUnavailable { attempts: usize },
    #[error("Não foi possível carregar a transcrição do vídeo.")]
    EmptyTranscript,
    #[error("Erro ao carregar a transcrição do vídeo: {0}")]
    Transcript(String),
    #[error("O arquivo CSV está vazio ou não pôde ser carregado.")]
    EmptyCsv,
    #[error("Erro ao carregar o arquivo CSV: {0}")]
    Csv(String),
    #[error("O arquivo PDF está vazio ou não pôde ser carregado.")]
    EmptyPdf,
    #[error("Erro ao carregar o arquivo PDF: {0}")]
    Pdf(String),
    #[error("O arquivo de texto está vazio ou não pôde ser carregado.")]
    EmptyTxt,
    #[error("Erro ao carregar o arquivo de texto: {0}")]
    Txt(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Por favor, inicialize o Morfeu na barra lateral 'Seleção do modelo'.")]
    NotInitialized,
    #[error("Digite uma mensagem.")]
    EmptyMessage,
    #[error("Adicione a api key para o provedor {}", .0.label())]
    MissingApiKey(Provider),
    #[error("O modelo {model} não está disponível para o provedor {}", .provider.label())]
    UnknownModel { provider: Provider, model: String },
    #[error("Erro ao consultar o modelo: {0:#}")]
    Model(anyhow::Error),
}
