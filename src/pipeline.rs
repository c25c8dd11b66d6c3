//! Analysis pipeline.
//!
//! ```text
//!  none ──begin_analysis──▶ IN_PROGRESS ──▶ COMPLETED
//!                               │
//!                               └─────────▶ FAILED
//! ```
//!
//! Nine stages, each followed by a progress event:
//!
//! 1. fetch the file tree
//! 2. select important files
//! 3. fetch selected contents (batched), README and language stats
//! 4. feature summarizer
//! 5. structure summarizer
//! 6. tech-stack summarizer
//! 7. AST artifacts and code metrics, concurrently
//! 8. repository summary
//! 9. persist the COMPLETED analysis
//!
//! Summarizer failures are local: the stage's default is used and the
//! progress event is marked degraded. Any other error marks the analysis
//! FAILED and then propagates.

use std::sync::Arc;

use futures_util::stream::Stream;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{CoreError, CoreResult};
use crate::events::{event_channel, EventSink, EVENT_BUFFER};
use crate::extract::{detect_language, is_code_language, AstArtifact, Extractor};
use crate::llm::Generator;
use crate::metrics::{build_searchable_index, compute_metrics};
use crate::models::{Analysis, AnalysisEvent, AnalysisResult, AnalysisStatus, Repository};
use crate::selector::select_important_files;
use crate::source::SourceBrowser;
use crate::store::{AnalysisStart, ArtifactStore};
use crate::summarize::{
    summarize_features, summarize_repository, summarize_structure, summarize_tech_stack,
    Findings, RepoSnapshot, SourceFile, Summarized,
};

pub const TOTAL_STEPS: usize = 9;

/// How a call to [`Pipeline::analyze`] ended without error.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Completed(Analysis),
    /// Another run for the repository was already in progress; nothing ran
    AlreadyRunning(Analysis),
}

pub struct Pipeline {
    browser: Arc<dyn SourceBrowser>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn ArtifactStore>,
    extractor: Arc<Extractor>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        browser: Arc<dyn SourceBrowser>,
        generator: Arc<dyn Generator>,
        store: Arc<dyn ArtifactStore>,
        extractor: Arc<Extractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            browser,
            generator,
            store,
            extractor,
            config,
        }
    }

    /// Start an analysis in a detached task and return its event stream. The
    /// stream always ends with exactly one terminal event; dropping it does
    /// not stop the run.
    pub fn run_analysis(
        self: &Arc<Self>,
        repository_id: Uuid,
    ) -> impl Stream<Item = AnalysisEvent> + Send + 'static {
        let (sink, events) = event_channel(EVENT_BUFFER);
        let pipeline = Arc::clone(self);

        tokio::spawn(async move {
            let terminal = match pipeline.analyze(repository_id, &sink).await {
                Ok(AnalysisOutcome::Completed(analysis)) => AnalysisEvent::Complete {
                    analysis_id: analysis.id,
                    status: analysis.status,
                },
                Ok(AnalysisOutcome::AlreadyRunning(analysis)) => AnalysisEvent::InProgress {
                    analysis_id: analysis.id,
                },
                Err(failure) => AnalysisEvent::Failed {
                    analysis_id: failure.analysis_id,
                    status: AnalysisStatus::Failed,
                    error: failure.error.to_string(),
                },
            };
            sink.emit(terminal).await;
        });

        events
    }

    /// Run one analysis to its terminal state, reporting progress to `sink`.
    ///
    /// On a stage-fatal error the analysis record is already FAILED when the
    /// error is returned.
    pub async fn analyze(
        &self,
        repository_id: Uuid,
        sink: &EventSink<AnalysisEvent>,
    ) -> Result<AnalysisOutcome, AnalysisFailure> {
        let repository = self
            .store
            .get_repository(repository_id)
            .await
            .map_err(|e| AnalysisFailure::before_start(e.into()))?
            .ok_or_else(|| {
                AnalysisFailure::before_start(CoreError::repository_not_found(repository_id))
            })?;

        let analysis = match self
            .store
            .begin_analysis(repository_id)
            .await
            .map_err(|e| AnalysisFailure::before_start(e.into()))?
        {
            AnalysisStart::Started(analysis) => analysis,
            AnalysisStart::AlreadyRunning(running) => {
                tracing::info!(
                    "Analysis {} of {} already in progress",
                    running.id,
                    repository.full_name
                );
                return Ok(AnalysisOutcome::AlreadyRunning(running));
            }
        };

        tracing::info!("Analysis {} of {} started", analysis.id, repository.full_name);

        let outcome = match self.run_stages(&repository, sink).await {
            Ok(result) => self
                .store
                .finish_analysis(analysis.clone().completed(result))
                .await
                .map_err(CoreError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(completed) => {
                progress(sink, 9, "Analysis saved", false).await;
                tracing::info!("Analysis {} of {} completed", completed.id, repository.full_name);
                Ok(AnalysisOutcome::Completed(completed))
            }
            Err(e) => Err(self.fail(analysis, e).await),
        }
    }

    /// Mark the analysis FAILED with the error's message. A store failure here
    /// is logged; the original error is what the caller sees.
    async fn fail(&self, analysis: Analysis, error: CoreError) -> AnalysisFailure {
        tracing::error!("Analysis {} failed: {error}", analysis.id);
        let id = analysis.id;
        if let Err(e) = self
            .store
            .finish_analysis(analysis.failed(error.to_string()))
            .await
        {
            tracing::error!("Could not record failure of analysis {id}: {e}");
        }
        AnalysisFailure {
            analysis_id: Some(id),
            error,
        }
    }

    async fn run_stages(
        &self,
        repository: &Repository,
        sink: &EventSink<AnalysisEvent>,
    ) -> CoreResult<AnalysisResult> {
        let full_name = repository.full_name.as_str();
        let mut degraded_stages = Vec::new();

        // 1. tree
        let tree = self.browser.list_tree(full_name).await?;
        progress(sink, 1, &format!("Fetched file tree ({} entries)", tree.len()), false).await;

        // 2. selection
        let mut selected = select_important_files(&tree, self.config.medium_priority_cap);
        selected.truncate(self.config.max_selected_files);
        progress(sink, 2, &format!("Selected {} files", selected.len()), false).await;

        // 3. contents
        let snapshot = Arc::new(self.fetch_snapshot(full_name, &selected).await?);
        progress(
            sink,
            3,
            &format!("Fetched {} of {} files", snapshot.files.len(), selected.len()),
            false,
        )
        .await;

        // 4-6. summarizers
        let generator = self.generator.as_ref();

        let features = summarize_features(generator, &snapshot).await;
        report_summarizer(sink, 4, "features", &features, &mut degraded_stages).await;

        let structure = summarize_structure(generator, &snapshot).await;
        report_summarizer(sink, 5, "structure", &structure, &mut degraded_stages).await;

        let tech_stack = summarize_tech_stack(generator, &snapshot).await;
        report_summarizer(sink, 6, "tech_stack", &tech_stack, &mut degraded_stages).await;

        // 7. AST artifacts and metrics
        let extractor = Arc::clone(&self.extractor);
        let ast_snapshot = Arc::clone(&snapshot);
        let ast_task =
            tokio::task::spawn_blocking(move || extract_code_files(&extractor, &ast_snapshot.files));
        let metrics_snapshot = Arc::clone(&snapshot);
        let metrics_task =
            tokio::task::spawn_blocking(move || compute_metrics(&metrics_snapshot.files));
        let (ast_artifacts, code_metrics) = tokio::try_join!(ast_task, metrics_task)?;

        let parsed = ast_artifacts.iter().filter(|a| a.parse_success).count();
        progress(
            sink,
            7,
            &format!(
                "Parsed {parsed} of {} code files ({} lines of code)",
                ast_artifacts.len(),
                code_metrics.lines_of_code
            ),
            false,
        )
        .await;

        // 8. summary
        let searchable_index = build_searchable_index(
            &features.value,
            &structure.value,
            &tech_stack.value,
            &snapshot.files,
        );
        let summary = summarize_repository(
            generator,
            &snapshot,
            &Findings {
                features: &features.value,
                structure: &structure.value,
                tech_stack: &tech_stack.value,
                metrics: &code_metrics,
            },
        )
        .await;
        report_summarizer(sink, 8, "summary", &summary, &mut degraded_stages).await;

        Ok(AnalysisResult {
            features: features.value,
            structure: structure.value,
            tech_stack: tech_stack.value,
            ast_artifacts,
            complexity: code_metrics.complexity,
            code_metrics,
            searchable_index,
            summary: summary.value,
            degraded_stages,
        })
    }

    /// Fetch selected files in batches with a pause between batches, then the
    /// README and language stats. Paths the host could not serve are dropped.
    async fn fetch_snapshot(&self, full_name: &str, paths: &[String]) -> CoreResult<RepoSnapshot> {
        let batch_size = self.config.fetch_batch_size.max(1);
        let mut files = Vec::with_capacity(paths.len());

        for (i, batch) in paths.chunks(batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.fetch_batch_delay()).await;
            }
            let fetched = self.browser.get_file_contents(full_name, batch).await?;
            files.extend(fetched.into_iter().filter_map(|file| {
                file.content.map(|content| SourceFile {
                    path: file.path,
                    content,
                })
            }));
        }

        let missing = paths.len().saturating_sub(files.len());
        if missing > 0 {
            tracing::warn!("{missing} selected files of {full_name} could not be fetched");
        }

        let (readme, language_stats) = tokio::try_join!(
            self.browser.get_readme(full_name),
            self.browser.get_language_stats(full_name)
        )?;

        Ok(RepoSnapshot {
            full_name: full_name.to_string(),
            files,
            readme,
            language_stats,
        })
    }
}

/// A stage-fatal error, with the id of the analysis it failed when one had
/// been created.
#[derive(Debug)]
pub struct AnalysisFailure {
    pub analysis_id: Option<Uuid>,
    pub error: CoreError,
}

impl AnalysisFailure {
    fn before_start(error: CoreError) -> Self {
        Self {
            analysis_id: None,
            error,
        }
    }
}

impl std::fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for AnalysisFailure {}

/// Artifacts for the code files of a snapshot; config, docs and data files
/// are left out. Never fails: unparseable files get degraded artifacts.
fn extract_code_files(extractor: &Extractor, files: &[SourceFile]) -> Vec<AstArtifact> {
    extractor.extract_all(
        files
            .iter()
            .filter(|f| is_code_language(&detect_language(&f.path)))
            .map(|f| (f.path.as_str(), f.content.as_str())),
    )
}

async fn progress(sink: &EventSink<AnalysisEvent>, step_index: usize, message: &str, degraded: bool) {
    sink.emit(AnalysisEvent::Progress {
        step_index,
        total_steps: TOTAL_STEPS,
        message: message.to_string(),
        degraded,
    })
    .await;
}

async fn report_summarizer<T>(
    sink: &EventSink<AnalysisEvent>,
    step_index: usize,
    stage: &str,
    outcome: &Summarized<T>,
    degraded_stages: &mut Vec<String>,
) {
    let message = match &outcome.error {
        None => format!("{} ready", stage_title(stage)),
        Some(e) => {
            degraded_stages.push(stage.to_string());
            format!("{} unavailable, using defaults: {e}", stage_title(stage))
        }
    };
    progress(sink, step_index, &message, outcome.is_degraded()).await;
}

fn stage_title(stage: &str) -> &'static str {
    match stage {
        "features" => "Feature analysis",
        "structure" => "Structure analysis",
        "tech_stack" => "Tech stack analysis",
        "summary" => "Summary",
        _ => "Stage",
    }
}
