//! Greedy CTC decoding for sequence recognizers.

use super::backend::RecognitionGuess;

/// Characters a plate recognizer emits, in class order after the blank.
pub const PLATE_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Decode a `[steps, classes]` row-major probability matrix. Class 0 is the
/// blank; class `k` maps to `charset[k - 1]`.
///
/// Confidence is the mean winning probability over the emitted characters.
/// Returns `None` when nothing but blanks was emitted.
pub fn greedy_decode(
    probs: &[f32],
    steps: usize,
    classes: usize,
    charset: &[char],
) -> Option<RecognitionGuess> {
    if classes == 0 || probs.len() < steps * classes {
        return None;
    }
    let mut text = String::new();
    let mut score_sum = 0.0f32;
    let mut prev = 0usize;
    for t in 0..steps {
        let row = &probs[t * classes..(t + 1) * classes];
        let (best, best_prob) = row
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
        if best != 0 && best != prev {
            if let Some(ch) = charset.get(best - 1) {
                text.push(*ch);
                score_sum += best_prob;
            }
        }
        prev = best;
    }
    if text.is_empty() {
        return None;
    }
    let confidence = score_sum / text.chars().count() as f32;
    Some(RecognitionGuess::new(text, confidence))
}
