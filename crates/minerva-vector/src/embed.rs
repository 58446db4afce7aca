use crate::error::VectorError;
use crate::Result;

/// Turns text into an embedding vector.
///
/// Empty (or whitespace-only) input must be rejected with
/// [`VectorError::EmptyInput`]; implementations must never substitute a zero
/// vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batched embedding. The default loops; providers with a batch endpoint
    /// override it.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize;
}

/// Deterministic token-hash embedder.
///
/// No model dependency: each whitespace token bumps a hashed bucket, and the
/// result is L2-normalised. Good enough for tests and for keeping similarity
/// search available when no provider is configured; not a semantic model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self { dimension }
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(VectorError::EmptyInput);
        }

        let mut out = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let bucket = fnv1a(token.as_bytes()) as usize % self.dimension;
            out[bucket] += 1.0;
        }

        let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut out {
                *v /= norm;
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_a_typed_error() {
        let embedder = HashEmbedder::default();
        assert!(matches!(embedder.embed(""), Err(VectorError::EmptyInput)));
        assert!(matches!(embedder.embed("   "), Err(VectorError::EmptyInput)));
    }

    #[test]
    fn embedding_is_deterministic_and_normalised() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("order service persists orders").unwrap();
        let b = embedder.embed("order service persists orders").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn batch_default_matches_single() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["alpha beta", "gamma"]).unwrap();
        assert_eq!(batch[0], embedder.embed("alpha beta").unwrap());
        assert_eq!(batch[1], embedder.embed("gamma").unwrap());
    }
}
