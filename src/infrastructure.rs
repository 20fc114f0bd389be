//! Infrastructure layer for database access, configuration, and the
//! external catalog/translation providers.

pub mod catalog_provider;
pub mod config;
pub mod database_connection;
pub mod debug_artifacts;
pub mod job_item_repository;
pub mod job_repository;
pub mod logging;
pub mod translation_repository;
pub mod translator;

// Re-export commonly used items
pub use catalog_provider::{CatalogProvider, HttpCatalogProvider};
pub use config::{AppConfig, ArtifactConfig, CatalogConfig, DatabaseConfig, QueueConfig, TranslatorConfig};
pub use database_connection::DatabaseConnection;
pub use debug_artifacts::DebugArtifacts;
pub use job_item_repository::JobItemRepository;
pub use job_repository::JobRepository;
pub use translation_repository::{TranslationRecord, TranslationRepository};
pub use translator::{OpenAiTranslator, Translator};
