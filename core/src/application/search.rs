// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! TF-IDF semantic retrieval over the tool registry (§4.5). Built lazily
//! on first query, rebuilt explicitly when the registry changes.

use std::collections::HashMap;

use crate::domain::policy::{evaluate_policy, governance_penalty, GovernanceMode, PolicyAction};
use crate::domain::tool::{AllowedInMode, RiskLevel, ToolCandidate, ToolRecord};

const DEFAULT_TOP_K: usize = 8;

fn tokenize(text: &str) -> Vec<String> {
    let lowercase = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in lowercase.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Tokens for one record's indexed text, with `description_1line` and
/// `tags` double-weighted per §4.5.
fn document_tokens(record: &ToolRecord) -> Vec<String> {
    let mut tokens = tokenize(&record.description_1line);
    tokens.extend(tokenize(&record.description_1line));
    tokens.extend(tokenize(&record.description_full));
    for tag in &record.tags {
        let tag_tokens = tokenize(tag);
        tokens.extend(tag_tokens.clone());
        tokens.extend(tag_tokens);
    }
    tokens
}

#[derive(Clone)]
struct SparseVector {
    weights: HashMap<String, f32>,
}

impl SparseVector {
    fn l2_normalize(mut self) -> Self {
        let magnitude: f32 = self.weights.values().map(|w| w * w).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for w in self.weights.values_mut() {
                *w /= magnitude;
            }
        }
        self
    }

    fn cosine_similarity(&self, other: &SparseVector) -> f32 {
        let (smaller, larger) = if self.weights.len() < other.weights.len() {
            (self, other)
        } else {
            (other, self)
        };
        smaller
            .weights
            .iter()
            .map(|(term, w)| w * larger.weights.get(term).copied().unwrap_or(0.0))
            .sum()
    }
}

pub struct SearchIndex {
    idf: HashMap<String, f32>,
    document_vectors: HashMap<String, SparseVector>,
}

impl SearchIndex {
    /// Builds (or rebuilds) the index over the current registry contents.
    pub fn build<'a>(records: impl Iterator<Item = &'a ToolRecord>) -> Self {
        let records: Vec<&ToolRecord> = records.collect();
        let n = records.len();

        let mut document_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_token_lists: Vec<(String, Vec<String>)> = Vec::with_capacity(n);
        for record in &records {
            let tokens = document_tokens(record);
            let unique: std::collections::HashSet<&str> =
                tokens.iter().map(String::as_str).collect();
            for term in unique {
                *document_freq.entry(term.to_string()).or_insert(0) += 1;
            }
            doc_token_lists.push((record.tool_id.clone(), tokens));
        }

        let idf: HashMap<String, f32> = document_freq
            .into_iter()
            .map(|(term, df)| {
                let smoothed = ((n as f32 + 1.0) / (df as f32 + 1.0)).ln() + 1.0;
                (term, smoothed)
            })
            .collect();

        let mut document_vectors = HashMap::with_capacity(n);
        for (tool_id, tokens) in doc_token_lists {
            let vector = tf_idf_vector(&tokens, &idf).l2_normalize();
            document_vectors.insert(tool_id, vector);
        }

        Self { idf, document_vectors }
    }

    pub fn is_empty(&self) -> bool {
        self.document_vectors.is_empty()
    }

    fn query_vector(&self, query: &str) -> SparseVector {
        let tokens = tokenize(query);
        tf_idf_vector(&tokens, &self.idf).l2_normalize()
    }
}

fn tf_idf_vector(tokens: &[String], idf: &HashMap<String, f32>) -> SparseVector {
    let mut term_freq: HashMap<String, f32> = HashMap::new();
    for token in tokens {
        *term_freq.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    let weights = term_freq
        .into_iter()
        .map(|(term, tf)| {
            let weight = tf * idf.get(&term).copied().unwrap_or(1.0);
            (term, weight)
        })
        .collect();
    SparseVector { weights }
}

/// Ranks registry candidates against `query`, applying the governance
/// penalty from §4.5 before ordering. Returns at most `top_k` results,
/// descending score, ties broken by `tool_id`.
pub fn search(
    index: &SearchIndex,
    records: &[&ToolRecord],
    query: &str,
    mode: GovernanceMode,
    top_k: Option<usize>,
) -> Vec<ToolCandidate> {
    if query.trim().is_empty() || index.is_empty() {
        return vec![];
    }

    let query_vector = index.query_vector(query);
    if query_vector.weights.is_empty() {
        return vec![];
    }

    let mut candidates: Vec<ToolCandidate> = records
        .iter()
        .filter_map(|record| {
            let doc_vector = index.document_vectors.get(&record.tool_id)?;
            let raw_score = query_vector.cosine_similarity(doc_vector);
            let decision = evaluate_policy(mode, record.risk_level, &record.tool_id);
            let final_score = raw_score * (1.0 - governance_penalty(decision.action));
            Some(ToolCandidate {
                tool_id: record.tool_id.clone(),
                server_id: record.server_id.clone(),
                description_1line: record.description_1line.clone(),
                tags: record.tags.clone(),
                risk_level: record.risk_level,
                relevance_score: final_score.clamp(0.0, 1.0),
                allowed_in_mode: allowed_in_mode(decision.action),
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.tool_id.cmp(&b.tool_id))
    });
    candidates.truncate(top_k.unwrap_or(DEFAULT_TOP_K));
    candidates
}

fn allowed_in_mode(action: PolicyAction) -> AllowedInMode {
    match action {
        PolicyAction::Allow => AllowedInMode::Allowed,
        PolicyAction::RequireApproval => AllowedInMode::RequiresApproval,
        PolicyAction::Block => AllowedInMode::Blocked,
    }
}
