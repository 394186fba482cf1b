//! Score fusion.
//!
//! Two-way: keyword and graph scores are each divided by their ranking's own
//! maximum, then combined as `0.4 * keyword + 0.6 * graph`.
//!
//! Enhanced (three-way): keyword and graph scores are divided by
//! [`ENHANCED_SCALE`], vector similarity is used as is, each is clamped to
//! [0, 1], and the weighted sum is reported alongside percentages. Component
//! percentages stay within 0-100; the hybrid percentage is the weighted sum
//! as is, so weights adding up to more than 1 can push it past 100.
//!
//! In both modes a document missing from a ranking scores 0 there.

use std::collections::HashMap;

use knowledge_types::FusionWeights;
use serde::Serialize;

use crate::types::ScoredDoc;

/// Keyword weight in two-way fusion.
pub const KEYWORD_WEIGHT: f64 = 0.4;

/// Graph weight in two-way fusion.
pub const GRAPH_WEIGHT: f64 = 0.6;

/// Divisor mapping raw keyword and graph scores onto roughly [0, 1].
pub const ENHANCED_SCALE: f64 = 10.0;

/// Normalized component scores of a two-way fused hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HybridScores {
    pub keyword: f64,
    pub graph: f64,
    pub hybrid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedHit {
    pub doc_id: String,
    pub scores: HybridScores,
}

/// Percentages of an enhanced hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnhancedScores {
    pub keyword: u8,
    pub graph: u8,
    pub vector: u8,
    /// Not clamped; see the module docs
    pub hybrid: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedHit {
    pub doc_id: String,
    pub scores: EnhancedScores,
    /// Weighted sum before rounding; the sort key
    pub hybrid_score: f64,
}

/// Accumulates per-document component scores in first-seen order.
struct Accumulator<const N: usize> {
    order: Vec<String>,
    scores: HashMap<String, [f64; N]>,
}

impl<const N: usize> Accumulator<N> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            scores: HashMap::new(),
        }
    }

    fn set(&mut self, doc_id: &str, component: usize, value: f64) {
        let entry = self.scores.entry(doc_id.to_string()).or_insert_with(|| {
            self.order.push(doc_id.to_string());
            [0.0; N]
        });
        entry[component] = value;
    }

    fn into_rows(mut self) -> Vec<(String, [f64; N])> {
        self.order
            .into_iter()
            .filter_map(|id| self.scores.remove(&id).map(|s| (id, s)))
            .collect()
    }
}

fn max_score(results: &[ScoredDoc]) -> f64 {
    let max = results.iter().map(|r| r.score).fold(0.0f64, f64::max);
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

/// Fuse keyword and graph rankings, best first, truncated to `limit`.
pub fn fuse_two_way(keyword: &[ScoredDoc], graph: &[ScoredDoc], limit: usize) -> Vec<FusedHit> {
    let mut acc = Accumulator::<2>::new();
    let max_kw = max_score(keyword);
    for r in keyword {
        acc.set(&r.doc_id, 0, r.score / max_kw);
    }
    let max_gr = max_score(graph);
    for r in graph {
        acc.set(&r.doc_id, 1, r.score / max_gr);
    }

    let mut hits: Vec<FusedHit> = acc
        .into_rows()
        .into_iter()
        .map(|(doc_id, [kw, gr])| FusedHit {
            doc_id,
            scores: HybridScores {
                keyword: kw,
                graph: gr,
                hybrid: KEYWORD_WEIGHT * kw + GRAPH_WEIGHT * gr,
            },
        })
        .collect();
    hits.sort_by(|a, b| b.scores.hybrid.total_cmp(&a.scores.hybrid));
    hits.truncate(limit);
    hits
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn percent(value: f64) -> u8 {
    (clamp_unit(value) * 100.0).round() as u8
}

/// Weights are validated non-negative, so only NaN needs guarding.
fn raw_percent(value: f64) -> u32 {
    if value.is_nan() {
        0
    } else {
        (value * 100.0).round() as u32
    }
}

/// Fuse keyword, graph and vector rankings with caller weights.
pub fn fuse_enhanced(
    keyword: &[ScoredDoc],
    graph: &[ScoredDoc],
    vector: &[ScoredDoc],
    weights: &FusionWeights,
    limit: usize,
) -> Vec<EnhancedHit> {
    let mut acc = Accumulator::<3>::new();
    for r in keyword {
        acc.set(&r.doc_id, 0, clamp_unit(r.score / ENHANCED_SCALE));
    }
    for r in graph {
        acc.set(&r.doc_id, 1, clamp_unit(r.score / ENHANCED_SCALE));
    }
    for r in vector {
        acc.set(&r.doc_id, 2, clamp_unit(r.score));
    }

    let mut hits: Vec<EnhancedHit> = acc
        .into_rows()
        .into_iter()
        .map(|(doc_id, [kw, gr, vec])| {
            let hybrid = kw * weights.keyword + gr * weights.graph + vec * weights.vector;
            EnhancedHit {
                doc_id,
                scores: EnhancedScores {
                    keyword: percent(kw),
                    graph: percent(gr),
                    vector: percent(vec),
                    hybrid: raw_percent(hybrid),
                },
                hybrid_score: hybrid,
            }
        })
        .collect();
    hits.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scored(items: &[(&str, f64)]) -> Vec<ScoredDoc> {
        items.iter().map(|(id, s)| ScoredDoc::new(*id, *s)).collect()
    }

    #[test]
    fn test_two_way_normalizes_by_own_max() {
        let kw = scored(&[("a", 4.0), ("b", 2.0)]);
        let gr = scored(&[("b", 3.0), ("c", 1.0)]);
        let hits = fuse_two_way(&kw, &gr, 10);

        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        // b: .4*.5 + .6*1 = .8; a: .4; c: .6*(1/3) = .2
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!((hits[0].scores.hybrid - 0.8).abs() < 1e-9);
        assert!((hits[1].scores.keyword - 1.0).abs() < 1e-9);
        assert_eq!(hits[1].scores.graph, 0.0);
    }

    #[test]
    fn test_two_way_limit_and_empty() {
        assert!(fuse_two_way(&[], &[], 5).is_empty());
        let kw = scored(&[("a", 1.0), ("b", 0.5), ("c", 0.2)]);
        assert_eq!(fuse_two_way(&kw, &[], 2).len(), 2);
    }

    #[test]
    fn test_enhanced_clamps_and_reports_percentages() {
        let kw = scored(&[("a", 25.0)]);
        let gr = scored(&[("a", 5.0), ("b", 2.0)]);
        let vec = scored(&[("b", 0.9), ("c", 0.3)]);
        let hits = fuse_enhanced(&kw, &gr, &vec, &FusionWeights::default(), 10);

        let a = hits.iter().find(|h| h.doc_id == "a").unwrap();
        assert_eq!(
            a.scores,
            EnhancedScores {
                keyword: 100,
                graph: 50,
                vector: 0,
                hybrid: 45
            }
        );
        let b = hits.iter().find(|h| h.doc_id == "b").unwrap();
        // .3*.2 + .4*.9 = .42
        assert!((b.hybrid_score - 0.42).abs() < 1e-9);
        assert_eq!(hits[0].doc_id, "a");
    }

    #[test]
    fn test_enhanced_scores_bounded_for_unit_weights() {
        let kw = scored(&[("a", 1e6), ("b", 3.0)]);
        let gr = scored(&[("a", 1e6), ("c", 40.0)]);
        let vec = scored(&[("a", 1.5), ("b", -0.2)]);
        for weights in [
            FusionWeights { keyword: 1.0, graph: 0.0, vector: 0.0 },
            FusionWeights { keyword: 0.2, graph: 0.5, vector: 0.3 },
            FusionWeights::default(),
        ] {
            for hit in fuse_enhanced(&kw, &gr, &vec, &weights, 10) {
                assert!((0.0..=1.0 + 1e-12).contains(&hit.hybrid_score));
                assert!(hit.scores.hybrid <= 100);
            }
        }
    }

    #[test]
    fn test_enhanced_hybrid_percent_follows_weights_past_one() {
        let kw = scored(&[("a", 10.0)]);
        let gr = scored(&[("a", 10.0)]);
        let vec = scored(&[("a", 1.0)]);
        let weights = FusionWeights {
            keyword: 1.0,
            graph: 0.5,
            vector: 0.25,
        };
        let hits = fuse_enhanced(&kw, &gr, &vec, &weights, 10);
        assert!((hits[0].hybrid_score - 1.75).abs() < 1e-9);
        assert_eq!(hits[0].scores.hybrid, 175);
        assert_eq!(hits[0].scores.keyword, 100);
    }
}
