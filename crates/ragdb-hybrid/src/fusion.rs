//! Score fusion for the hybrid re-rank.

/// `clamp(alpha * semantic + (1 - alpha) * bm25, 0, 1)` per candidate.
///
/// Missing lexical scores count as 0. Non-finite inputs score 0.
pub fn fuse(semantic: &[f32], bm25: &[f32], alpha: f32) -> Vec<f32> {
    let alpha = alpha.clamp(0.0, 1.0);
    semantic
        .iter()
        .enumerate()
        .map(|(i, &sem)| {
            let lex = bm25.get(i).copied().unwrap_or(0.0);
            let combined = alpha * finite(sem) + (1.0 - alpha) * finite(lex);
            combined.clamp(0.0, 1.0)
        })
        .collect()
}

fn finite(x: f32) -> f32 {
    if x.is_finite() { x } else { 0.0 }
}

/// Indices of `scores` ordered best first. Equal scores keep their input
/// order, so ties resolve to the semantic ranking.
pub fn rank_descending(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuse_weights_and_clamps() {
        let out = fuse(&[1.0, 0.5, 0.0], &[0.0, 1.0, 1.0], 0.6);
        assert!((out[0] - 0.6).abs() < 1e-6);
        assert!((out[1] - 0.7).abs() < 1e-6);
        assert!((out[2] - 0.4).abs() < 1e-6);

        let out = fuse(&[1.5, f32::NAN], &[1.0], 0.5);
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn alpha_one_is_pure_semantic() {
        assert_eq!(fuse(&[0.3, 0.8], &[1.0, 0.0], 1.0), vec![0.3, 0.8]);
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        assert_eq!(rank_descending(&[0.5, 0.9, 0.5, 0.9]), vec![1, 3, 0, 2]);
        assert!(rank_descending(&[]).is_empty());
    }
}
