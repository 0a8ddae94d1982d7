//! Question store implementations.
//!
//! [`MemoryStore`] keeps every collection in process memory. [`JsonFileStore`]
//! wraps it and mirrors each domain collection to `<dir>/<Collection>.json`,
//! rewriting the file after every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::{Mutex, RwLock};

use crate::model::{Domain, Evaluation, Question};
use crate::traits::{QuestionStore, RecordOutcome};

/// In-memory question store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<Domain, Vec<Question>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with questions.
    pub fn with_questions(questions: Vec<Question>) -> Self {
        let mut collections: BTreeMap<Domain, Vec<Question>> = BTreeMap::new();
        for q in questions {
            upsert(&mut collections, q);
        }
        Self {
            collections: RwLock::new(collections),
        }
    }

    /// Insert or replace questions by id. Returns the domains touched,
    /// including any domain a re-imported id moved out of.
    pub async fn insert_many(&self, questions: Vec<Question>) -> Vec<Domain> {
        let mut collections = self.collections.write().await;
        let mut touched = Vec::new();
        for q in questions {
            let domain = q.domain;
            let moved_from = upsert(&mut collections, q);
            for d in std::iter::once(domain).chain(moved_from) {
                if !touched.contains(&d) {
                    touched.push(d);
                }
            }
        }
        touched
    }

    /// Look up a question by id across all collections.
    pub async fn get(&self, question_id: &str) -> Option<Question> {
        let collections = self.collections.read().await;
        collections
            .values()
            .flatten()
            .find(|q| q.id == question_id)
            .cloned()
    }

    /// Total number of stored questions.
    pub async fn len(&self) -> usize {
        self.collections.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Apply an evaluation. Returns the question's domain and the evaluation
    /// it replaced.
    async fn apply(
        &self,
        question_id: &str,
        evaluation: Evaluation,
    ) -> Option<(Domain, Option<Evaluation>)> {
        let mut collections = self.collections.write().await;
        let question = collections
            .values_mut()
            .flatten()
            .find(|q| q.id == question_id)?;
        let previous = question.evaluation.replace(evaluation);
        Some((question.domain, previous))
    }

    /// Put back an evaluation displaced by [`MemoryStore::apply`].
    async fn restore(&self, question_id: &str, previous: Option<Evaluation>) {
        let mut collections = self.collections.write().await;
        if let Some(question) = collections
            .values_mut()
            .flatten()
            .find(|q| q.id == question_id)
        {
            question.evaluation = previous;
        }
    }
}

/// Insert or replace by id. Ids are unique across the whole store, so a
/// question re-imported under another domain leaves its old collection.
/// Returns that old domain.
fn upsert(collections: &mut BTreeMap<Domain, Vec<Question>>, question: Question) -> Option<Domain> {
    let mut moved_from = None;
    for (domain, collection) in collections.iter_mut() {
        if *domain == question.domain {
            continue;
        }
        let before = collection.len();
        collection.retain(|q| q.id != question.id);
        if collection.len() != before {
            tracing::warn!(
                "question {} moved from {domain} to {}",
                question.id,
                question.domain
            );
            moved_from = Some(*domain);
        }
    }

    let collection = collections.entry(question.domain).or_default();
    match collection.iter_mut().find(|q| q.id == question.id) {
        Some(existing) => *existing = question,
        None => collection.push(question),
    }
    moved_from
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn list_all(&self, domain: Domain) -> Result<Vec<Question>> {
        let collections = self.collections.read().await;
        Ok(collections.get(&domain).cloned().unwrap_or_default())
    }

    async fn sample_random(&self, domain: Domain, n: usize) -> Result<Vec<Question>> {
        let collections = self.collections.read().await;
        let Some(all) = collections.get(&domain) else {
            return Ok(Vec::new());
        };
        let mut rng = rand::thread_rng();
        Ok(all.choose_multiple(&mut rng, n).cloned().collect())
    }

    async fn record_result(&self, question_id: &str, evaluation: Evaluation) -> Result<RecordOutcome> {
        Ok(match self.apply(question_id, evaluation).await {
            Some(_) => RecordOutcome::Updated,
            None => RecordOutcome::Missing,
        })
    }
}

/// Question store persisted as one JSON file per domain collection.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    inner: MemoryStore,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or create) a store directory and load every collection in it.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create store directory: {}", dir.display()))?;

        let mut questions = Vec::new();
        for domain in Domain::ALL {
            let path = collection_path(&dir, domain);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read collection: {}", path.display()))?;
            let mut loaded: Vec<Question> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse collection: {}", path.display()))?;
            for q in &mut loaded {
                if q.domain != domain {
                    tracing::warn!(
                        "question {} in {} claims domain {}, keeping it in {}",
                        q.id,
                        path.display(),
                        q.domain,
                        domain
                    );
                    q.domain = domain;
                }
            }
            questions.extend(loaded);
        }

        tracing::debug!("opened store at {} ({} questions)", dir.display(), questions.len());
        Ok(Self {
            dir,
            inner: MemoryStore::with_questions(questions),
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the collection files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert or replace questions by id and persist the touched collections.
    pub async fn insert_many(&self, questions: Vec<Question>) -> Result<usize> {
        let count = questions.len();
        let touched = self.inner.insert_many(questions).await;
        for domain in touched {
            self.flush(domain).await?;
        }
        Ok(count)
    }

    pub async fn get(&self, question_id: &str) -> Option<Question> {
        self.inner.get(question_id).await
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.is_empty().await
    }

    async fn flush(&self, domain: Domain) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let questions = self.inner.list_all(domain).await?;
        let json = serde_json::to_string_pretty(&questions)
            .with_context(|| format!("failed to serialize collection {domain}"))?;

        let path = collection_path(&self.dir, domain);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

fn collection_path(dir: &Path, domain: Domain) -> PathBuf {
    dir.join(format!("{}.json", domain.collection()))
}

#[async_trait]
impl QuestionStore for JsonFileStore {
    async fn list_all(&self, domain: Domain) -> Result<Vec<Question>> {
        self.inner.list_all(domain).await
    }

    async fn sample_random(&self, domain: Domain, n: usize) -> Result<Vec<Question>> {
        self.inner.sample_random(domain, n).await
    }

    async fn record_result(&self, question_id: &str, evaluation: Evaluation) -> Result<RecordOutcome> {
        let Some((domain, previous)) = self.inner.apply(question_id, evaluation).await else {
            return Ok(RecordOutcome::Missing);
        };
        if let Err(e) = self.flush(domain).await {
            // Keep memory in line with what is on disk.
            self.inner.restore(question_id, previous).await;
            return Err(e);
        }
        Ok(RecordOutcome::Updated)
    }
}
