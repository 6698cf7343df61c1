//! Cosine distance and top-k ranking

use super::SimilarityHit;

/// `1 - cosine_similarity`; `None` when the lengths differ.
/// A zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(1.0);
    }

    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Some((1.0 - similarity) as f32)
}

/// Rank candidates by distance to `query`, keeping at most `k`.
///
/// Candidates without a vector or with the wrong dimensionality are skipped.
/// The sort is stable, so equal distances keep candidate order.
pub fn rank_by_distance<'a, T, I>(query: &[f32], candidates: I, k: usize) -> Vec<SimilarityHit<T>>
where
    T: Clone + 'a,
    I: IntoIterator<Item = (&'a T, Option<&'a [f32]>)>,
{
    let mut hits: Vec<SimilarityHit<T>> = candidates
        .into_iter()
        .filter_map(|(entity, vector)| {
            let distance = cosine_distance(query, vector?)?;
            Some(SimilarityHit {
                entity: entity.clone(),
                distance,
            })
        })
        .collect();

    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits.truncate(k);
    hits
}
