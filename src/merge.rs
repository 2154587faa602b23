//! Merging resolver candidates with the scraped enrichment record.

use crate::error::{ImportError, Result};
use crate::oracle::CompletionOracle;
use crate::parse::parse_records;
use crate::types::{CandidateRecord, EnrichmentRecord, MergedRecord, Record};
use std::collections::HashSet;
use std::sync::Arc;

/// Combines candidates and enrichment data into canonical records.
#[derive(Clone)]
pub struct RecordMerger {
    oracle: Arc<dyn CompletionOracle>,
    model: String,
}

impl RecordMerger {
    pub fn new(oracle: Arc<dyn CompletionOracle>, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    /// Merge `candidates` with `enrichment` in one oracle call.
    ///
    /// Each merged record paired with a candidate by title or position is
    /// reconciled with it: a missing `itemType` is restored and dropped
    /// candidate creators are put back. Unpaired records are kept as returned.
    pub async fn merge(
        &self,
        candidates: &[CandidateRecord],
        enrichment: &EnrichmentRecord,
    ) -> Result<Vec<MergedRecord>> {
        if candidates.is_empty() {
            return Err(ImportError::EmptyInput);
        }

        let prompt = build_prompt(candidates, enrichment)?;
        let raw = self
            .oracle
            .complete(&self.model, &prompt)
            .await
            .map_err(|e| ImportError::MergeService(Box::new(e)))?;
        tracing::debug!(model = %self.model, bytes = raw.len(), "merge reply received");

        let mut merged = parse_records(&raw)
            .map_err(|diagnostic| ImportError::MergeParse { raw, diagnostic })?;

        let pairing = pair(&merged, candidates);
        let unpaired = pairing.iter().filter(|p| p.is_none()).count();
        if unpaired > 0 {
            tracing::warn!(
                candidates = candidates.len(),
                merged = merged.len(),
                unpaired,
                "merged records without a matching candidate; skipping their reconciliation"
            );
        }
        for (record, index) in merged.iter_mut().zip(pairing) {
            if let Some(index) = index {
                reconcile(record, &candidates[index]);
            }
        }

        tracing::info!(count = merged.len(), url = %enrichment.url, "merged records");
        Ok(merged)
    }

    /// Pass candidates through unchanged, for runs without enrichment data.
    pub fn merge_without_enrichment(
        &self,
        candidates: &[CandidateRecord],
    ) -> Result<Vec<MergedRecord>> {
        if candidates.is_empty() {
            return Err(ImportError::EmptyInput);
        }
        Ok(candidates.to_vec())
    }
}

/// The merge prompt: rules, the candidate list and the enrichment record.
pub fn build_prompt(candidates: &[CandidateRecord], enrichment: &EnrichmentRecord) -> Result<String> {
    let candidates_json = serde_json::to_string_pretty(candidates)?;
    let enrichment_json = serde_json::to_string_pretty(&enrichment.to_value())?;

    Ok(format!(
        "Combine the reference data below into complete Zotero records.\n\n\
         Rules:\n\
         1. Keep the itemType of each reference.\n\
         2. Keep every author of each reference; add authors from the additional data only if they are new.\n\
         3. Use the most complete version of title, abstractNote, url, DOI, tags, notes and extra.\n\
         4. On any conflict, prefer the more complete information.\n\
         5. Use only fields that are valid in Zotero.\n\n\
         References:\n{}\n\n\
         Additional data:\n{}\n\n\
         Return ONLY the combined JSON, with no explanations.\n",
        candidates_json, enrichment_json
    ))
}

/// Lowercased, whitespace-collapsed title used to match records.
fn title_key(record: &Record) -> Option<String> {
    let key = record
        .title()?
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    (!key.is_empty()).then_some(key)
}

/// Find the candidate each merged record came from.
///
/// A title shared by exactly one merged record and exactly one candidate
/// pairs those two. With equal counts and no title pair out of position,
/// records pair by position, so a rewritten title still reconciles.
/// Otherwise only the title pairs are kept.
fn pair(merged: &[Record], candidates: &[CandidateRecord]) -> Vec<Option<usize>> {
    let merged_keys: Vec<Option<String>> = merged.iter().map(title_key).collect();
    let candidate_keys: Vec<Option<String>> = candidates.iter().map(title_key).collect();
    let occurrences = |keys: &[Option<String>], key: &str| {
        keys.iter().filter(|k| k.as_deref() == Some(key)).count()
    };

    let by_title: Vec<Option<usize>> = merged_keys
        .iter()
        .map(|key| {
            let key = key.as_deref()?;
            if occurrences(&merged_keys, key) != 1 || occurrences(&candidate_keys, key) != 1 {
                return None;
            }
            candidate_keys.iter().position(|k| k.as_deref() == Some(key))
        })
        .collect();

    let in_position = by_title
        .iter()
        .enumerate()
        .all(|(i, index)| index.map_or(true, |j| j == i));
    if merged.len() == candidates.len() && in_position {
        (0..merged.len()).map(Some).collect()
    } else {
        by_title
    }
}

/// Restore what a merged record must keep from its candidate.
fn reconcile(merged: &mut Record, candidate: &CandidateRecord) {
    if merged
        .item_type
        .as_deref()
        .map_or(true, |t| t.trim().is_empty())
    {
        merged.item_type = candidate.item_type.clone();
    }

    let candidate_keys: HashSet<String> =
        candidate.creators.iter().map(|c| c.identity_key()).collect();
    let added = std::mem::take(&mut merged.creators)
        .into_iter()
        .filter(|c| !candidate_keys.contains(&c.identity_key()));
    merged.creators = candidate.creators.iter().cloned().chain(added).collect();
}
