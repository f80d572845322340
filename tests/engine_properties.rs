//! Invariants that must hold for arbitrary inputs.

use std::sync::Arc;

use proptest::prelude::*;
use sentiflow_lib::analysis::{LexiconScorer, TextPreprocessor};
use sentiflow_lib::engine::{BatchConfig, BatchEngine, StreamConfig, StreamEngine};
use sentiflow_lib::queue::BoundedQueue;

fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("!!".to_string()),
        "(love|hate|good|bad|fine|very|not|the|product|day)( (love|hate|good|bad|fine|very|not|the|product|day)){0,6}",
        "[a-zA-Z0-9 #@.!?]{0,40}",
    ]
}

fn batch_engine(batch_size: usize, worker_count: usize) -> BatchEngine {
    BatchEngine::new(
        BatchConfig {
            batch_size,
            worker_count,
        },
        Arc::new(TextPreprocessor::default()),
        Arc::new(LexiconScorer::default()),
    )
    .unwrap()
}

fn stream_engine(window_size: usize) -> StreamEngine {
    StreamEngine::new(
        StreamConfig { window_size },
        Arc::new(TextPreprocessor::default()),
        Arc::new(LexiconScorer::default()),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn batch_returns_one_result_per_input(
        texts in prop::collection::vec(text_strategy(), 0..40),
        batch_size in 1usize..9,
        worker_count in 1usize..4,
    ) {
        let engine = batch_engine(batch_size, worker_count);
        let output = engine.process_large_dataset(&texts);
        let stats = &output.statistics;

        prop_assert_eq!(output.results.len(), texts.len());
        prop_assert_eq!(stats.total_items, texts.len());
        prop_assert_eq!(stats.chunk_count, texts.len().div_ceil(batch_size));
        prop_assert_eq!(
            stats.sentiment_distribution.total() as usize,
            stats.total_items - stats.error_count
        );
        prop_assert!(stats.average_score.is_finite());
        prop_assert!(stats.throughput.is_finite());

        let ordered = output.into_input_order();
        for (result, text) in ordered.iter().zip(&texts) {
            prop_assert_eq!(&result.original_text, text);
            prop_assert!((0.0..=1.0).contains(&result.confidence));
            prop_assert!((-1.0..=1.0).contains(&result.score));
        }
    }

    #[test]
    fn stream_window_never_exceeds_capacity(
        texts in prop::collection::vec(text_strategy(), 0..30),
        window_size in 1usize..8,
    ) {
        let engine = stream_engine(window_size);
        let mut scored = Vec::new();
        for text in &texts {
            let result = engine.process_stream_item(text, None);
            if !result.is_error() {
                scored.push(result.original_text.clone());
            }
        }

        let window = engine.get_window_stats();
        prop_assert!(window.sample_count <= window_size);
        prop_assert_eq!(window.sample_count, scored.len().min(window_size));
        prop_assert_eq!(window.sentiment_distribution.total() as usize, window.sample_count);
        prop_assert!(!window.average_score.is_nan());

        let expected: Vec<String> = scored[scored.len() - window.sample_count..].to_vec();
        let actual: Vec<String> = engine
            .window_results()
            .into_iter()
            .map(|result| result.original_text)
            .collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(engine.get_stats().total_processed as usize, scored.len());
    }

    #[test]
    fn queue_keeps_newest_items(
        capacity in 1usize..16,
        pushes in 0usize..48,
    ) {
        let queue = BoundedQueue::new(capacity).unwrap();
        for n in 0..pushes {
            let len = queue.push(n);
            prop_assert!(len <= capacity);
        }

        let stats = queue.stats();
        prop_assert_eq!(stats.len, pushes.min(capacity));
        prop_assert_eq!(stats.evicted as usize, pushes.saturating_sub(capacity));

        let mut drained = Vec::new();
        while let Some(n) = queue.pop(std::time::Duration::ZERO) {
            drained.push(n);
        }
        let expected: Vec<usize> = (pushes.saturating_sub(capacity)..pushes).collect();
        prop_assert_eq!(drained, expected);
    }
}
