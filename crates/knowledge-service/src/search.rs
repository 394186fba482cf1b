//! Free-text search across a database's collections.
//!
//! Each call loads the searched collections and the graph, runs the rankers
//! over the combined corpus, fuses, and attaches the documents back to the
//! fused ids.

use std::collections::HashMap;

use knowledge_graph::graph_score;
use knowledge_search::{fuse_enhanced, fuse_two_way, Bm25, EnhancedScores, HybridScores, ScoredDoc, SearchMode};
use knowledge_storage::ResourceKind;
use knowledge_types::{doc_id, Document, FusionWeights};
use knowledge_vector::{RebuildSummary, RecommendationOutcome, VectorSearchOutcome};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::engine::KnowledgeEngine;
use crate::error::ServiceError;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub collection: String,
    pub scores: HybridScores,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedSearchHit {
    pub document: Document,
    pub collection: String,
    pub scores: EnhancedScores,
    pub hybrid_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchHit {
    pub collection: String,
    pub doc_id: String,
    pub similarity: f64,
    pub keywords: Vec<String>,
    /// `None` when the index is stale and the document is gone
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarDocument {
    pub document: Document,
    pub similarity: f64,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum SimilarOutcome {
    DocumentNotFound,
    NoIndex,
    Found(Vec<SimilarDocument>),
}

/// Documents of the searched collections, flattened, with their owners.
struct Corpus {
    collections: Vec<String>,
    documents: Vec<Document>,
    owners: Vec<usize>,
    positions: HashMap<String, usize>,
}

impl Corpus {
    fn get(&self, id: &str) -> Option<(&Document, &str)> {
        let &pos = self.positions.get(id)?;
        Some((&self.documents[pos], &self.collections[self.owners[pos]]))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn require_query(query: &str) -> Result<(), ServiceError> {
    if query.trim().is_empty() {
        return Err(ServiceError::InvalidInput("Search query is required".to_string()));
    }
    Ok(())
}

impl KnowledgeEngine {
    fn effective_limit(&self, limit: Option<usize>) -> usize {
        limit
            .filter(|&l| l > 0)
            .unwrap_or(self.settings.search.default_limit)
    }

    fn target_collections(
        &self,
        tenant: &str,
        database: &str,
        collections: Option<&[String]>,
    ) -> Result<Vec<String>, ServiceError> {
        match collections {
            Some(names) if !names.is_empty() => Ok(names.to_vec()),
            _ => self.list_collections(tenant, database),
        }
    }

    fn load_corpus(
        &self,
        tenant: &str,
        database: &str,
        collections: Option<&[String]>,
    ) -> Result<Corpus, ServiceError> {
        let collections = self.target_collections(tenant, database, collections)?;
        let mut corpus = Corpus {
            collections: Vec::with_capacity(collections.len()),
            documents: Vec::new(),
            owners: Vec::new(),
            positions: HashMap::new(),
        };
        for (owner, name) in collections.into_iter().enumerate() {
            let key = self.collection_key(tenant, database, &name)?;
            for doc in self.load_documents(&key)? {
                if let Some(id) = doc_id(&doc) {
                    corpus.positions.insert(id.to_string(), corpus.documents.len());
                }
                corpus.documents.push(doc);
                corpus.owners.push(owner);
            }
            corpus.collections.push(name);
        }
        Ok(corpus)
    }

    fn keyword_ranking(&self, query: &str, corpus: &Corpus) -> Vec<ScoredDoc> {
        let settings = &self.settings.search;
        Bm25::new(settings.bm25_k1, settings.bm25_b).score(query, &corpus.documents)
    }

    fn graph_ranking(
        &self,
        tenant: &str,
        database: &str,
        query: &str,
        corpus: &Corpus,
    ) -> Result<Vec<ScoredDoc>, ServiceError> {
        let graph = self.graph(tenant, database)?;
        Ok(graph_score(&graph, query, self.settings.search.graph_depth, &corpus.documents)
            .into_iter()
            .map(|(id, hits)| ScoredDoc::new(id, hits as f64))
            .collect())
    }

    /// Keyword, graph or hybrid search over every collection of a database,
    /// or only the listed ones.
    #[instrument(skip(self, collections))]
    pub fn search(
        &self,
        tenant: &str,
        database: &str,
        query: &str,
        mode: SearchMode,
        collections: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        require_query(query)?;
        let limit = self.effective_limit(limit);
        let corpus = self.load_corpus(tenant, database, collections)?;

        let fused: Vec<(String, HybridScores)> = match mode {
            SearchMode::Keyword => self
                .keyword_ranking(query, &corpus)
                .into_iter()
                .take(limit)
                .map(|r| {
                    let keyword = round2(r.score);
                    (r.doc_id, HybridScores { keyword, graph: 0.0, hybrid: keyword })
                })
                .collect(),
            SearchMode::Graph => self
                .graph_ranking(tenant, database, query, &corpus)?
                .into_iter()
                .take(limit)
                .map(|r| (r.doc_id, HybridScores { keyword: 0.0, graph: r.score, hybrid: r.score }))
                .collect(),
            SearchMode::Hybrid => {
                let keyword = self.keyword_ranking(query, &corpus);
                let graph = self.graph_ranking(tenant, database, query, &corpus)?;
                fuse_two_way(&keyword, &graph, limit)
                    .into_iter()
                    .map(|hit| (hit.doc_id, hit.scores))
                    .collect()
            }
        };

        let hits: Vec<SearchHit> = fused
            .into_iter()
            .filter_map(|(id, scores)| {
                corpus.get(&id).map(|(doc, collection)| SearchHit {
                    document: doc.clone(),
                    collection: collection.to_string(),
                    scores,
                })
            })
            .collect();
        debug!(%mode, results = hits.len(), "Search complete");
        Ok(hits)
    }

    /// Three-way search fusing keyword, graph and vector rankings. Each
    /// ranking contributes at most `2 * limit` candidates. Collections
    /// without a vector index contribute no vector scores.
    #[instrument(skip(self, weights, collections))]
    pub fn enhanced_search(
        &self,
        tenant: &str,
        database: &str,
        query: &str,
        weights: Option<FusionWeights>,
        collections: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<EnhancedSearchHit>, ServiceError> {
        require_query(query)?;
        let weights = weights.unwrap_or(self.settings.search.weights);
        weights.validate().map_err(ServiceError::InvalidInput)?;
        let limit = self.effective_limit(limit);
        let candidates = limit.saturating_mul(2);
        let corpus = self.load_corpus(tenant, database, collections)?;

        let mut keyword = self.keyword_ranking(query, &corpus);
        keyword.truncate(candidates);
        let mut graph = self.graph_ranking(tenant, database, query, &corpus)?;
        graph.truncate(candidates);

        let mut vector = Vec::new();
        for collection in &corpus.collections {
            let outcome = self
                .indexes
                .vector_search(tenant, database, collection, query, candidates)?;
            vector.extend(
                outcome
                    .into_hits()
                    .into_iter()
                    .filter(|hit| corpus.positions.contains_key(&hit.doc_id))
                    .map(|hit| ScoredDoc::new(hit.doc_id, hit.similarity)),
            );
        }

        let hits: Vec<EnhancedSearchHit> = fuse_enhanced(&keyword, &graph, &vector, &weights, limit)
            .into_iter()
            .filter_map(|hit| {
                corpus.get(&hit.doc_id).map(|(doc, collection)| EnhancedSearchHit {
                    document: doc.clone(),
                    collection: collection.to_string(),
                    scores: hit.scores,
                    hybrid_score: hit.hybrid_score,
                })
            })
            .collect();
        debug!(
            keyword = keyword.len(),
            graph = graph.len(),
            vector = vector.len(),
            results = hits.len(),
            "Enhanced search complete"
        );
        Ok(hits)
    }

    /// Vector search over several collections, merged by similarity.
    pub fn vector_search_all(
        &self,
        tenant: &str,
        database: &str,
        query: &str,
        collections: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<VectorSearchHit>, ServiceError> {
        require_query(query)?;
        let limit = self.effective_limit(limit);
        let collections = self.target_collections(tenant, database, collections)?;

        let mut hits = Vec::new();
        for (collection, outcome) in self
            .indexes
            .batch_vector_search(tenant, database, &collections, query, limit)?
        {
            if matches!(outcome, VectorSearchOutcome::NoIndex) {
                continue;
            }
            let key = self.collection_key(tenant, database, &collection)?;
            let documents = self.load_documents(&key)?;
            for hit in outcome.into_hits() {
                let document = documents.iter().find(|d| doc_id(d) == Some(&hit.doc_id)).cloned();
                hits.push(VectorSearchHit {
                    collection: collection.clone(),
                    doc_id: hit.doc_id,
                    similarity: hit.similarity,
                    keywords: hit.keywords,
                    document,
                });
            }
        }

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Documents most similar to `id` within its collection.
    pub fn similar_documents(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        id: &str,
        limit: Option<usize>,
    ) -> Result<SimilarOutcome, ServiceError> {
        let limit = self.effective_limit(limit);
        let key = self.collection_key(tenant, database, collection)?;
        let documents = self.load_documents(&key)?;

        let found = match self
            .indexes
            .recommendations(tenant, database, collection, &documents, id, limit)?
        {
            RecommendationOutcome::DocumentNotFound => return Ok(SimilarOutcome::DocumentNotFound),
            RecommendationOutcome::NoIndex => return Ok(SimilarOutcome::NoIndex),
            RecommendationOutcome::Found(found) => found,
        };

        let similar = found
            .recommendations
            .into_iter()
            .filter_map(|hit| {
                documents
                    .iter()
                    .find(|d| doc_id(d) == Some(&hit.doc_id))
                    .map(|doc| SimilarDocument {
                        document: doc.clone(),
                        similarity: hit.similarity,
                        keywords: hit.keywords,
                    })
            })
            .collect();
        Ok(SimilarOutcome::Found(similar))
    }

    /// Rebuild a collection's vector and field indexes from its current
    /// documents.
    pub fn rebuild_indexes(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<RebuildSummary, ServiceError> {
        let key = self.collection_key(tenant, database, collection)?;
        self.locks.with_lock(ResourceKind::Collection, &key, || {
            let documents = self.load_documents(&key)?;
            Ok(self
                .indexes
                .rebuild_indexes(tenant, database, collection, &documents)?)
        })
    }
}
