use crate::error::{Error, Result};

/// Cosine similarity of two equal-length vectors. Zero vectors score 0.
pub fn cosine(query: &[f32], stored: &[f32]) -> Result<f32> {
    if query.len() != stored.len() {
        return Err(Error::DimensionMismatch { expected: query.len(), actual: stored.len() });
    }
    let (mut dot, mut nq, mut ns) = (0f32, 0f32, 0f32);
    for (a, b) in query.iter().zip(stored) {
        dot += a * b;
        nq += a * a;
        ns += b * b;
    }
    let denom = nq.sqrt() * ns.sqrt();
    Ok(if denom <= f32::EPSILON { 0.0 } else { dot / denom })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal() {
        assert!((cosine(&[1.0, 0.0], &[2.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 3.0]).unwrap().abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
    }

    #[test]
    fn cosine_rejects_length_skew() {
        assert!(matches!(
            cosine(&[1.0, 0.0, 0.0], &[1.0, 0.0]),
            Err(Error::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
