//! Per-domain accuracy and latency statistics.
//!
//! Reads the evaluation fields the run controller writes. A question counts
//! as correct when its normalized answer matches the expected answer,
//! case-insensitively. Both accuracy and mean latency are taken over every
//! question in the domain, so unevaluated questions count as wrong and as
//! zero latency.

use serde::{Deserialize, Serialize};

use crate::model::{Domain, Question};
use crate::traits::QuestionStore;

/// Summary of one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAnalysis {
    pub domain: Domain,
    /// Questions in the domain.
    pub count: usize,
    /// Questions with an evaluation recorded.
    pub evaluated: usize,
    /// Questions answered correctly.
    pub correct: usize,
    /// `correct / count`.
    pub accuracy: f64,
    /// Mean answer-service latency in milliseconds.
    pub avg_response_time: f64,
}

/// Summarize a domain's questions. Returns `None` for an empty domain.
pub fn summarize(domain: Domain, questions: &[Question]) -> Option<DomainAnalysis> {
    if questions.is_empty() {
        return None;
    }

    let count = questions.len();
    let evaluated = questions.iter().filter(|q| q.evaluation.is_some()).count();
    let correct = questions.iter().filter(|q| q.is_correct()).count();
    let total_latency: u64 = questions
        .iter()
        .filter_map(|q| q.evaluation.as_ref())
        .map(|e| e.latency_ms)
        .sum();

    Some(DomainAnalysis {
        domain,
        count,
        evaluated,
        correct,
        accuracy: correct as f64 / count as f64,
        avg_response_time: total_latency as f64 / count as f64,
    })
}

/// Analyze every known domain in the store, skipping empty ones.
pub async fn analyze(store: &dyn QuestionStore) -> anyhow::Result<Vec<DomainAnalysis>> {
    let mut results = Vec::new();
    for domain in Domain::ALL {
        let questions = store.list_all(domain).await?;
        if let Some(analysis) = summarize(domain, &questions) {
            results.push(analysis);
        }
    }
    Ok(results)
}
