//! Candidate pool and lexical prefilter
//!
//! The pool is every paragraph of the question's candidate documents, in
//! context order, or the whole arena for open-retrieval questions. When it
//! exceeds the candidate cap, paragraphs sharing the most question tokens
//! are kept.

use crate::graph::{LinkGraph, ParagraphIdx};
use bridgehop_common::Question;
use std::collections::BTreeSet;
use tracing::debug;

/// Paragraphs considered for one question, in pool order
pub fn candidate_pool(graph: &LinkGraph, question: &Question, cap: usize) -> Vec<ParagraphIdx> {
    let pool: Vec<ParagraphIdx> = if question.is_open_retrieval() {
        graph.all_paragraphs().collect()
    } else {
        let mut seen = BTreeSet::new();
        question
            .candidate_documents
            .iter()
            .filter_map(|id| graph.document_index(id))
            .filter(|doc| seen.insert(*doc))
            .flat_map(|doc| graph.document(doc).paragraph_indices())
            .collect()
    };

    if pool.len() <= cap {
        return pool;
    }

    let before = pool.len();
    let kept = prefilter(graph, &question.text, pool, cap);
    debug!(question_id = %question.id, before, after = kept.len(), "Candidate pool prefiltered");
    kept
}

/// Keep the `cap` paragraphs with the highest question-token overlap, ties
/// by pool order, returned in pool order
fn prefilter(graph: &LinkGraph, question: &str, pool: Vec<ParagraphIdx>, cap: usize) -> Vec<ParagraphIdx> {
    let query = tokens(question);

    let mut ranked: Vec<(usize, usize, ParagraphIdx)> = pool
        .into_iter()
        .enumerate()
        .map(|(position, p)| {
            let overlap = tokens(&graph.paragraph(p).text).intersection(&query).count();
            (overlap, position, p)
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked.truncate(cap);
    ranked.sort_by_key(|&(_, position, _)| position);
    ranked.into_iter().map(|(_, _, p)| p).collect()
}

/// Lowercased alphanumeric words longer than two characters
fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{extraction, record};
    use bridgehop_common::entities::Normalizer;

    fn graph() -> LinkGraph {
        let ex = extraction(vec![
            record(
                "A",
                &[
                    ("The weather is mild.", "The weather is mild."),
                    ("Obama was born in Hawaii.", "Obama was born in Hawaii."),
                ],
            ),
            record("B", &[("Hawaii is a state.", "Hawaii is a state.")]),
            record("C", &[("Unrelated text.", "Unrelated text.")]),
        ]);
        LinkGraph::build(&ex, &Normalizer::default()).unwrap()
    }

    fn ids(graph: &LinkGraph, pool: &[ParagraphIdx]) -> Vec<String> {
        pool.iter().map(|&p| graph.paragraph_id(p).to_string()).collect()
    }

    #[test]
    fn test_pool_follows_context_order() {
        let g = graph();
        let q = Question::new("q", "Where was Obama born?", ["B", "A", "Missing", "B"]);
        let pool = candidate_pool(&g, &q, 300);
        assert_eq!(ids(&g, &pool), vec!["B#0", "A#0", "A#1"]);
    }

    #[test]
    fn test_open_retrieval_uses_arena() {
        let g = graph();
        let q = Question::new("q", "Where was Obama born?", Vec::<String>::new());
        assert_eq!(candidate_pool(&g, &q, 300).len(), 4);
    }

    #[test]
    fn test_prefilter_keeps_overlap_in_pool_order() {
        let g = graph();
        let q = Question::new("q", "Was Obama born in Hawaii?", Vec::<String>::new());
        let pool = candidate_pool(&g, &q, 2);
        // A#1 shares "obama", "born", "hawaii"; B#0 shares "hawaii"
        assert_eq!(ids(&g, &pool), vec!["A#1", "B#0"]);
    }

    #[test]
    fn test_tokens() {
        let t = tokens("Where was Obama's birthplace?");
        assert!(t.contains("obama"));
        assert!(t.contains("birthplace"));
        assert!(!t.contains("s"));
    }
}
