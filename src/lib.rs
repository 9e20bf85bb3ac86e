pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod loaders;
pub mod models;
pub mod prompt;
pub mod server;

pub use config::AppConfig;
pub use server::run_server;
