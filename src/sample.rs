//! Labelled demo texts from a few sources, for the binary and for tests.

use rand::{seq::SliceRandom, Rng};
use serde_json::json;

use crate::queue::QueueItem;

/// `(text, source)` pairs covering positive, negative, neutral, mixed and
/// news-style inputs.
pub const SAMPLE_TEXTS: &[(&str, &str)] = &[
    ("I absolutely love this product! It's amazing and exceeded all my expectations!", "twitter"),
    ("Best purchase I've ever made. Highly recommend to everyone!", "twitter"),
    ("Exceptional quality and fantastic customer service. Five stars!", "review"),
    ("This is incredible! So happy with my decision to buy this.", "twitter"),
    ("Outstanding performance. Worth every penny!", "review"),
    ("Terrible product. Complete waste of money and time.", "twitter"),
    ("Worst experience ever. Very disappointed with the quality.", "review"),
    ("Do not buy this! Poor quality and overpriced.", "twitter"),
    ("Horrible customer service. Will never buy from them again.", "review"),
    ("This is garbage. Broke after one day of use.", "twitter"),
    ("It's okay. Nothing special but does the job.", "review"),
    ("Average product. Not bad, not great.", "twitter"),
    ("Decent quality for the price. Could be better.", "review"),
    ("It works as advertised. No complaints, no praises.", "twitter"),
    ("Standard product. Meets basic expectations.", "review"),
    ("Good features but poor execution. Has potential.", "review"),
    ("Love the design but hate the functionality.", "twitter"),
    ("Great concept, disappointing results.", "review"),
    ("Nice packaging but product quality is questionable.", "twitter"),
    ("Excellent idea, mediocre implementation.", "review"),
    ("New AI breakthrough announced by researchers today.", "news"),
    ("Tech stock prices showing mixed results this quarter.", "news"),
    ("Innovation in renewable energy technology continues to advance.", "news"),
    ("Economic indicators suggest moderate growth ahead.", "news"),
    ("Latest smartphone release generates significant buzz.", "news"),
];

/// The first `n` sample texts, cycling through the set.
pub fn sample_texts(n: usize) -> Vec<String> {
    SAMPLE_TEXTS
        .iter()
        .cycle()
        .take(n)
        .map(|(text, _)| (*text).to_string())
        .collect()
}

/// `n` randomly chosen samples as queue items, tagged with their position
/// in the sample set.
pub fn sample_items<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<QueueItem> {
    let indexes: Vec<usize> = (0..SAMPLE_TEXTS.len()).collect();
    let mut items = Vec::with_capacity(n);

    for _ in 0..n {
        let Some(&index) = indexes.choose(rng) else {
            break;
        };
        let (text, source) = SAMPLE_TEXTS[index];
        let priority: u8 = rng.gen_range(1..=3);
        items.push(
            QueueItem::new(text, source)
                .with_metadata("sample_index", json!(index))
                .with_metadata("priority", json!(priority)),
        );
    }

    items
}
