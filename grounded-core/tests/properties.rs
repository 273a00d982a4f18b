//! Property tests for search ordering, prompt budgets and the validation gate.

use async_trait::async_trait;
use grounded_core::corpus::Chunk;
use grounded_core::index::VectorIndex;
use grounded_core::rag::embedder::{self, EmbeddingProvider};
use grounded_core::rag::prompt::PromptBuilder;
use grounded_core::rag::retriever::RetrievalHit;
use grounded_core::rag::validator::{cosine_similarity, SemanticValidator};
use proptest::prelude::*;
use std::sync::Arc;

/// Generate a non-zero embedding of the given dimension.
fn arb_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter("non-zero embedding", |v| {
        v.iter().map(|x| x * x).sum::<f32>().sqrt() > 1e-3
    })
}

/// Generate a non-zero embedding whose components reach `1e18..1e38`, far
/// enough that their products overflow `f32`.
fn arb_large_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    (arb_embedding(dim), 1e18f32..1e38f32)
        .prop_map(|(v, scale)| v.into_iter().map(|x| x * scale).collect())
}

/// Embeds every text to the same fixed vector.
struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn encode(&self, texts: &[&str]) -> embedder::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| self.0.clone()).collect())
    }

    fn model_id(&self) -> &str {
        "fixed"
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// *For any* index and query, search returns `min(k, n)` neighbors ordered by
/// ascending distance, ties broken by ascending position, and repeated
/// searches return identical results.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_ascending_and_bounded_by_k(
            rows in proptest::collection::vec(arb_embedding(DIM), 1..40),
            query in arb_embedding(DIM),
            k in 1usize..50,
        ) {
            let index = VectorIndex::build(rows.clone()).unwrap();
            let neighbors = index.search(&query, k).unwrap();

            prop_assert_eq!(neighbors.len(), k.min(rows.len()));

            for window in neighbors.windows(2) {
                let (a, b) = (&window[0], &window[1]);
                prop_assert!(
                    a.distance < b.distance
                        || (a.distance == b.distance && a.position < b.position),
                    "out of order: {:?} before {:?}",
                    a,
                    b,
                );
            }

            for neighbor in &neighbors {
                let expected = squared_l2(&query, &rows[neighbor.position]);
                prop_assert!((neighbor.distance - expected).abs() <= 1e-4 * expected.max(1.0));
            }

            prop_assert_eq!(neighbors, index.search(&query, k).unwrap());
        }

        #[test]
        fn duplicated_rows_tie_by_position(
            row in arb_embedding(DIM),
            copies in 2usize..10,
        ) {
            let index = VectorIndex::build(vec![row.clone(); copies]).unwrap();
            let positions: Vec<usize> = index
                .search(&row, copies)
                .unwrap()
                .iter()
                .map(|n| n.position)
                .collect();
            prop_assert_eq!(positions, (0..copies).collect::<Vec<_>>());
        }
    }
}

/// *For any* two non-zero vectors, cosine similarity lies in `[-1, 1]` and is
/// symmetric.
mod prop_cosine_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn cosine_is_bounded_and_symmetric(
            (a, b) in (1usize..32).prop_flat_map(|dim| (arb_embedding(dim), arb_embedding(dim))),
        ) {
            let ab = cosine_similarity(&a, &b).unwrap();
            let ba = cosine_similarity(&b, &a).unwrap();

            prop_assert!((-1.0..=1.0).contains(&ab));
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn cosine_of_vector_with_itself_is_one(a in arb_embedding(16)) {
            let aa = cosine_similarity(&a, &a).unwrap();
            prop_assert!((aa - 1.0).abs() < 1e-5);
        }

        #[test]
        fn cosine_is_bounded_for_large_components(
            (a, b) in (1usize..32).prop_flat_map(|dim| (arb_large_embedding(dim), arb_large_embedding(dim))),
        ) {
            let ab = cosine_similarity(&a, &b).unwrap();
            prop_assert!(ab.is_finite());
            prop_assert!((-1.0..=1.0).contains(&ab));
        }
    }
}

/// *For any* answer and evidence, an answer accepted at a threshold is also
/// accepted at every lower threshold.
mod prop_threshold_monotonicity {
    use super::*;

    const DIM: usize = 6;

    fn hits(embeddings: Vec<Vec<f32>>) -> Vec<RetrievalHit> {
        embeddings
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| RetrievalHit {
                chunk: Chunk::new(i as u64, "doc.txt", i as u32, format!("chunk{i}")),
                distance: 0.0,
                embedding,
            })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn raising_threshold_never_accepts_more(
            answer in arb_embedding(DIM),
            evidence in proptest::collection::vec(arb_embedding(DIM), 1..8),
            low in -1.0f32..1.0f32,
            delta in 0.0f32..1.0f32,
        ) {
            let high = (low + delta).min(1.0);
            let validator = SemanticValidator::new(Arc::new(FixedEmbedder(answer)), 5000);
            let evidence = hits(evidence);

            let rt = tokio::runtime::Runtime::new().unwrap();
            let (at_low, at_high) = rt.block_on(async {
                let at_low = validator.validate("answer", &evidence, low).await.unwrap();
                let at_high = validator.validate("answer", &evidence, high).await.unwrap();
                (at_low, at_high)
            });

            prop_assert_eq!(at_low.average_similarity, at_high.average_similarity);
            prop_assert!(!at_high.accepted || at_low.accepted);
            prop_assert_eq!(at_low.accepted, at_low.average_similarity >= low);
        }

        #[test]
        fn large_components_never_bypass_the_gate(
            answer in arb_large_embedding(DIM),
            evidence in proptest::collection::vec(arb_large_embedding(DIM), 1..8),
            threshold in -1.0f32..1.0f32,
        ) {
            let validator = SemanticValidator::new(Arc::new(FixedEmbedder(answer)), 5000);
            let evidence = hits(evidence);

            let rt = tokio::runtime::Runtime::new().unwrap();
            let validation = rt
                .block_on(validator.validate("answer", &evidence, threshold))
                .unwrap();

            prop_assert!(validation.average_similarity.is_finite());
            prop_assert_eq!(validation.accepted, validation.average_similarity >= threshold);
        }
    }
}

/// *For any* budget, a successfully built prompt fits within it and includes
/// a leading run of the ranked chunks.
mod prop_prompt_budget {
    use super::*;

    fn arb_chunks() -> impl Strategy<Value = Vec<Chunk>> {
        proptest::collection::vec("[a-zA-Z éü]{1,80}", 1..10).prop_map(|texts| {
            texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| Chunk::new(i as u64, "doc.txt", i as u32, text))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn built_prompt_fits_budget(
            chunks in arb_chunks(),
            question in "[a-z ?]{1,40}",
            budget in 0usize..1500,
        ) {
            let builder = PromptBuilder::new();
            if let Ok(prompt) = builder.build(&question, &chunks, budget) {
                prop_assert!(prompt.text.chars().count() <= budget);
                prop_assert!(prompt.included >= 1 && prompt.included <= chunks.len());

                for chunk in &chunks[..prompt.included] {
                    prop_assert!(prompt.text.contains(&chunk.text));
                }

                prop_assert_eq!(builder.build(&question, &chunks, budget).unwrap(), prompt);
            }
        }
    }
}
