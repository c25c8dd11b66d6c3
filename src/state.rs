use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::config::Config;
use crate::extract::Extractor;
use crate::llm::{generator_from_config, Generator};
use crate::pipeline::Pipeline;
use crate::search::SearchService;
use crate::source::{GitHubBrowser, SourceBrowser};
use crate::store::{ArtifactStore, JsonFileStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ArtifactStore>,
    pub pipeline: Arc<Pipeline>,
    pub search: Arc<SearchService>,
}

impl AppState {
    /// Wire the production collaborators: GitHub, the configured model
    /// provider and the JSON store under `data_dir`.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating {}", config.data_dir.display()))?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        let browser = Arc::new(GitHubBrowser::new(http_client.clone(), config.github.clone()));
        let generator = generator_from_config(&http_client, &config.llm)?;
        let store = Arc::new(
            JsonFileStore::open(config.db_path())
                .with_context(|| format!("opening {}", config.db_path().display()))?,
        );

        Self::from_parts(config, browser, generator, store)
    }

    /// Build the state around caller-supplied collaborators.
    pub fn from_parts(
        config: Config,
        browser: Arc<dyn SourceBrowser>,
        generator: Arc<dyn Generator>,
        store: Arc<dyn ArtifactStore>,
    ) -> anyhow::Result<Self> {
        let extractor = Arc::new(Extractor::new()?);
        let pipeline = Arc::new(Pipeline::new(
            browser,
            generator.clone(),
            store.clone(),
            extractor,
            config.pipeline.clone(),
        ));
        let search = Arc::new(SearchService::new(
            generator,
            store.clone(),
            config.search.clone(),
        ));

        Ok(Self {
            config,
            store,
            pipeline,
            search,
        })
    }
}
