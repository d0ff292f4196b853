//! Token-level text similarity used by the generation metrics.
//!
//! These are the simplified unigram/bigram/LCS approximations of BLEU and
//! ROUGE, not the reference implementations.

use statrs::statistics::Statistics;
use std::collections::{HashMap, HashSet};

/// Lower-cased whitespace tokenization.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|s| s.to_lowercase()).collect()
}

/// Adjacent token pairs joined by a single space.
pub fn bigrams(tokens: &[String]) -> Vec<String> {
    tokens
        .windows(2)
        .map(|window| format!("{} {}", window[0], window[1]))
        .collect()
}

/// Clipped unigram precision with a brevity penalty of `exp(1 - ref/pred)`
/// when the prediction is shorter than the reference.
pub fn bleu(prediction: &str, reference: &str) -> f64 {
    let pred_tokens = tokenize(prediction);
    let ref_tokens = tokenize(reference);

    if pred_tokens.is_empty() || ref_tokens.is_empty() {
        return 0.0;
    }

    let mut ref_counts: HashMap<&str, usize> = HashMap::new();
    for token in &ref_tokens {
        *ref_counts.entry(token.as_str()).or_insert(0) += 1;
    }

    let mut matches = 0;
    for token in &pred_tokens {
        if let Some(count) = ref_counts.get_mut(token.as_str()) {
            if *count > 0 {
                matches += 1;
                *count -= 1;
            }
        }
    }

    let precision = matches as f64 / pred_tokens.len() as f64;

    let brevity_penalty = if pred_tokens.len() < ref_tokens.len() {
        (1.0 - ref_tokens.len() as f64 / pred_tokens.len() as f64).exp()
    } else {
        1.0
    };

    brevity_penalty * precision
}

/// Share of reference tokens that occur anywhere in the prediction. Each
/// reference occurrence counts on its own.
pub fn token_overlap(prediction: &[String], reference: &[String]) -> f64 {
    if prediction.is_empty() || reference.is_empty() {
        return 0.0;
    }

    let predicted: HashSet<&str> = prediction.iter().map(String::as_str).collect();
    let overlap = reference
        .iter()
        .filter(|token| predicted.contains(token.as_str()))
        .count();

    overlap as f64 / reference.len() as f64
}

/// ROUGE-1 and ROUGE-2 as token overlap over unigrams and bigrams.
pub fn rouge_n(prediction: &str, reference: &str, n: usize) -> f64 {
    let pred_tokens = tokenize(prediction);
    let ref_tokens = tokenize(reference);

    match n {
        1 => token_overlap(&pred_tokens, &ref_tokens),
        2 if pred_tokens.len() > 1 && ref_tokens.len() > 1 => {
            token_overlap(&bigrams(&pred_tokens), &bigrams(&ref_tokens))
        }
        _ => 0.0,
    }
}

/// Length of the longest common subsequence, O(m·n) dynamic programming.
pub fn lcs_length(a: &[String], b: &[String]) -> usize {
    let m = a.len();
    let n = b.len();

    if m == 0 || n == 0 {
        return 0;
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];

    for i in 1..=m {
        for j in 1..=n {
            if a[i - 1] == b[j - 1] {
                dp[i][j] = dp[i - 1][j - 1] + 1;
            } else {
                dp[i][j] = dp[i - 1][j].max(dp[i][j - 1]);
            }
        }
    }

    dp[m][n]
}

/// `LCS / max(|prediction|, |reference|)` over the token sequences.
pub fn rouge_l_tokens(prediction: &[String], reference: &[String]) -> f64 {
    if prediction.is_empty() || reference.is_empty() {
        return 0.0;
    }

    let lcs = lcs_length(prediction, reference);
    lcs as f64 / prediction.len().max(reference.len()) as f64
}

pub fn rouge_l(prediction: &str, reference: &str) -> f64 {
    rouge_l_tokens(&tokenize(prediction), &tokenize(reference))
}

/// Type-token ratio.
pub fn lexical_diversity(text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }

    let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    unique.len() as f64 / tokens.len() as f64
}

/// `1 - CV/2` over the word counts of the period-separated sentences,
/// floored at 0. Texts with fewer than two sentences score 1.0.
pub fn coherence(text: &str) -> f64 {
    let sentences: Vec<&str> = text.split('.').collect();
    if sentences.len() < 2 {
        return 1.0;
    }

    let lengths: Vec<f64> = sentences
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.split_whitespace().count() as f64)
        .collect();

    if lengths.len() < 2 {
        return 1.0;
    }

    let mean = lengths.iter().mean();
    if mean <= 0.0 {
        return 1.0;
    }
    let cv = lengths.iter().population_std_dev() / mean;

    (1.0 - cv / 2.0).max(0.0)
}

pub fn relevance(prediction: &str, reference: &str) -> f64 {
    token_overlap(&tokenize(prediction), &tokenize(reference))
}
