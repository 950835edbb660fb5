use std::sync::Arc;

use crate::config::Config;
use crate::drafts::DraftStore;
use crate::export::archive::ExportArchive;
use crate::export::Exporter;
use crate::generation::generator::SectionGenerator;
use crate::session::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Section generator over the text-generation capability; owns the retry policy.
    pub generator: SectionGenerator,
    /// Versioned draft persistence. Default: `FsDraftStore` under `DRAFTS_DIR`.
    pub drafts: Arc<dyn DraftStore>,
    pub sessions: SessionRegistry,
    pub exporter: Arc<Exporter>,
    /// Copies of rendered exports under `EXPORTS_DIR`.
    pub exports: Arc<ExportArchive>,
}

impl AppState {
    pub fn new(config: Config, generator: SectionGenerator, drafts: Arc<dyn DraftStore>) -> Self {
        let exporter = Arc::new(Exporter::from_config(&config.export));
        let exports = Arc::new(ExportArchive::new(&config.exports_dir));
        Self {
            config: Arc::new(config),
            generator,
            drafts,
            sessions: SessionRegistry::new(),
            exporter,
            exports,
        }
    }
}
