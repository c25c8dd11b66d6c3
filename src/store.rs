//! Artifact Store capability and its JSON-file implementation.
//!
//! The store owns the single-flight guard: [`ArtifactStore::begin_analysis`]
//! looks for a running analysis and creates a new one in the same critical
//! section, so two concurrent starts for one repository yield one record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Analysis, AnalysisStatus, Repository};

/// Outcome of the conditional create behind "start analysis".
#[derive(Debug, Clone)]
pub enum AnalysisStart {
    /// A fresh IN_PROGRESS record was created
    Started(Analysis),
    /// The repository already had one; nothing was created
    AlreadyRunning(Analysis),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get_repository(&self, id: Uuid) -> Result<Option<Repository>, StoreError>;

    async fn find_repository_by_name(
        &self,
        full_name: &str,
    ) -> Result<Option<Repository>, StoreError>;

    /// Insert or replace by id.
    async fn save_repository(&self, repository: Repository) -> Result<Repository, StoreError>;

    async fn list_repositories(&self) -> Result<Vec<Repository>, StoreError>;

    /// Return the repository's IN_PROGRESS analysis if there is one, otherwise
    /// create one. Atomic with respect to other calls on the same store.
    async fn begin_analysis(&self, repository_id: Uuid) -> Result<AnalysisStart, StoreError>;

    /// Write the terminal state of a running analysis. A COMPLETED analysis
    /// also stamps the repository's `last_analyzed_at`. Rejects records that
    /// are not terminal or whose stored copy already is.
    async fn finish_analysis(&self, analysis: Analysis) -> Result<Analysis, StoreError>;

    async fn get_analysis(&self, id: Uuid) -> Result<Option<Analysis>, StoreError>;

    /// Most recently started analysis of a repository, in any state.
    async fn latest_analysis(&self, repository_id: Uuid) -> Result<Option<Analysis>, StoreError>;

    /// Each repository paired with its most recent COMPLETED analysis, in
    /// repository order. Repositories without one are left out.
    async fn latest_completed_analyses(
        &self,
        repository_ids: Option<&[Uuid]>,
    ) -> Result<Vec<(Repository, Analysis)>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    repositories: Vec<Repository>,
    analyses: Vec<Analysis>,
}

/// All records in one JSON document, rewritten atomically (temp file +
/// rename) on every mutation.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    data: RwLock<StoreData>,
}

impl JsonFileStore {
    /// Load `path` if it exists, otherwise start empty. Analyses left
    /// IN_PROGRESS by a previous process are marked FAILED.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut data: StoreData = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            StoreData::default()
        };

        let mut interrupted = 0;
        for analysis in data.analyses.iter_mut().filter(|a| !a.is_terminal()) {
            *analysis = analysis
                .clone()
                .failed("interrupted: the server stopped before the analysis finished");
            interrupted += 1;
        }
        if interrupted > 0 {
            tracing::warn!("Marked {interrupted} interrupted analyses as FAILED");
        }

        let store = Self {
            path: Some(path),
            data: RwLock::new(data),
        };
        if interrupted > 0 {
            store.persist(&store.data.read())?;
        }
        tracing::info!(
            "Loaded {} repositories and {} analyses",
            store.data.read().repositories.len(),
            store.data.read().analyses.len()
        );
        Ok(store)
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(StoreData::default()),
        }
    }

    fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(data)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Apply `f` to a copy of the data, persist the copy, then publish it.
    /// A failed write leaves the in-memory state untouched.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.data.write();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl ArtifactStore for JsonFileStore {
    async fn get_repository(&self, id: Uuid) -> Result<Option<Repository>, StoreError> {
        Ok(self
            .data
            .read()
            .repositories
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_repository_by_name(
        &self,
        full_name: &str,
    ) -> Result<Option<Repository>, StoreError> {
        Ok(self
            .data
            .read()
            .repositories
            .iter()
            .find(|r| r.full_name.eq_ignore_ascii_case(full_name))
            .cloned())
    }

    async fn save_repository(&self, repository: Repository) -> Result<Repository, StoreError> {
        self.mutate(|data| {
            match data.repositories.iter_mut().find(|r| r.id == repository.id) {
                Some(existing) => *existing = repository.clone(),
                None => data.repositories.push(repository.clone()),
            }
            Ok(repository)
        })
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, StoreError> {
        Ok(self.data.read().repositories.clone())
    }

    async fn begin_analysis(&self, repository_id: Uuid) -> Result<AnalysisStart, StoreError> {
        self.mutate(|data| {
            if !data.repositories.iter().any(|r| r.id == repository_id) {
                return Err(StoreError::Missing {
                    entity: "repository",
                    id: repository_id,
                });
            }
            if let Some(running) = data
                .analyses
                .iter()
                .find(|a| a.repository_id == repository_id && !a.is_terminal())
            {
                return Ok(AnalysisStart::AlreadyRunning(running.clone()));
            }
            let analysis = Analysis::start(repository_id);
            data.analyses.push(analysis.clone());
            Ok(AnalysisStart::Started(analysis))
        })
    }

    async fn finish_analysis(&self, analysis: Analysis) -> Result<Analysis, StoreError> {
        if !analysis.is_terminal() {
            return Err(StoreError::AnalysisNotTerminal(analysis.id));
        }
        self.mutate(|data| {
            let stored = data
                .analyses
                .iter_mut()
                .find(|a| a.id == analysis.id)
                .ok_or(StoreError::Missing {
                    entity: "analysis",
                    id: analysis.id,
                })?;
            if stored.is_terminal() {
                return Err(StoreError::AnalysisTerminal(analysis.id));
            }
            *stored = analysis.clone();

            if analysis.status == AnalysisStatus::Completed {
                if let Some(repo) = data
                    .repositories
                    .iter_mut()
                    .find(|r| r.id == analysis.repository_id)
                {
                    repo.last_analyzed_at = Some(analysis.completed_at.unwrap_or_else(Utc::now));
                }
            }
            Ok(analysis)
        })
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<Analysis>, StoreError> {
        Ok(self
            .data
            .read()
            .analyses
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn latest_analysis(&self, repository_id: Uuid) -> Result<Option<Analysis>, StoreError> {
        Ok(self
            .data
            .read()
            .analyses
            .iter()
            .filter(|a| a.repository_id == repository_id)
            .max_by_key(|a| a.started_at)
            .cloned())
    }

    async fn latest_completed_analyses(
        &self,
        repository_ids: Option<&[Uuid]>,
    ) -> Result<Vec<(Repository, Analysis)>, StoreError> {
        let data = self.data.read();
        let pairs = data
            .repositories
            .iter()
            .filter(|r| repository_ids.map(|ids| ids.contains(&r.id)).unwrap_or(true))
            .filter_map(|repo| {
                data.analyses
                    .iter()
                    .filter(|a| a.repository_id == repo.id && a.status == AnalysisStatus::Completed)
                    .max_by_key(|a| a.completed_at)
                    .map(|a| (repo.clone(), a.clone()))
            })
            .collect();
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::AnalysisResult;

    async fn store_with_repo() -> (JsonFileStore, Repository) {
        let store = JsonFileStore::in_memory();
        let repo = store
            .save_repository(Repository::new("acme/shop"))
            .await
            .unwrap();
        (store, repo)
    }

    #[tokio::test]
    async fn test_begin_analysis_is_single_flight() {
        let (store, repo) = store_with_repo().await;

        let first = store.begin_analysis(repo.id).await.unwrap();
        let second = store.begin_analysis(repo.id).await.unwrap();

        let AnalysisStart::Started(started) = first else {
            panic!("first call should start");
        };
        let AnalysisStart::AlreadyRunning(running) = second else {
            panic!("second call should find the running analysis");
        };
        assert_eq!(started.id, running.id);
    }

    #[tokio::test]
    async fn test_concurrent_begins_create_one_record() {
        let (store, repo) = store_with_repo().await;
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.begin_analysis(repo.id).await.unwrap() })
            })
            .collect();
        let mut started = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), AnalysisStart::Started(_)) {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(store.data.read().analyses.len(), 1);
    }

    #[tokio::test]
    async fn test_begin_analysis_for_unknown_repository() {
        let store = JsonFileStore::in_memory();
        let err = store.begin_analysis(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing { entity: "repository", .. }));
    }

    #[tokio::test]
    async fn test_terminal_analysis_is_immutable() {
        let (store, repo) = store_with_repo().await;
        let AnalysisStart::Started(analysis) = store.begin_analysis(repo.id).await.unwrap() else {
            panic!("expected a fresh analysis");
        };

        let done = analysis.clone().completed(AnalysisResult::default());
        store.finish_analysis(done).await.unwrap();

        let again = analysis.failed("late failure");
        let err = store.finish_analysis(again).await.unwrap_err();
        assert!(matches!(err, StoreError::AnalysisTerminal(_)));

        let repo = store.get_repository(repo.id).await.unwrap().unwrap();
        assert!(repo.last_analyzed_at.is_some());
    }

    #[tokio::test]
    async fn test_new_analysis_after_terminal_one() {
        let (store, repo) = store_with_repo().await;
        let AnalysisStart::Started(first) = store.begin_analysis(repo.id).await.unwrap() else {
            panic!("expected a fresh analysis");
        };
        store.finish_analysis(first.clone().failed("boom")).await.unwrap();

        let AnalysisStart::Started(second) = store.begin_analysis(repo.id).await.unwrap() else {
            panic!("a terminal analysis must not block a new one");
        };
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_latest_completed_skips_failed_and_filters_ids() {
        let store = JsonFileStore::in_memory();
        let a = store.save_repository(Repository::new("acme/a")).await.unwrap();
        let b = store.save_repository(Repository::new("acme/b")).await.unwrap();

        for (repo, ok) in [(&a, true), (&b, false)] {
            let AnalysisStart::Started(analysis) = store.begin_analysis(repo.id).await.unwrap()
            else {
                panic!("expected a fresh analysis");
            };
            let terminal = if ok {
                analysis.completed(AnalysisResult::default())
            } else {
                analysis.failed("boom")
            };
            store.finish_analysis(terminal).await.unwrap();
        }

        let all = store.latest_completed_analyses(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0.id, a.id);

        let only_b = store
            .latest_completed_analyses(Some(std::slice::from_ref(&b.id)))
            .await
            .unwrap();
        assert!(only_b.is_empty());
    }

    #[tokio::test]
    async fn test_persists_and_recovers_interrupted_analyses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let repo_id = {
            let store = JsonFileStore::open(&path).unwrap();
            let repo = store
                .save_repository(Repository::new("acme/shop"))
                .await
                .unwrap();
            store.begin_analysis(repo.id).await.unwrap();
            repo.id
        };

        let reopened = JsonFileStore::open(&path).unwrap();
        let latest = reopened.latest_analysis(repo_id).await.unwrap().unwrap();
        assert_eq!(latest.status, AnalysisStatus::Failed);
        assert!(matches!(
            reopened.begin_analysis(repo_id).await.unwrap(),
            AnalysisStart::Started(_)
        ));
    }
}
