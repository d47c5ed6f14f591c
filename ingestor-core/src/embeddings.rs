//! Embedding client contract (§4.7).
//!
//! The trait is the whole boundary; swapping in a real model is an external
//! config concern out of scope for this document. `HashingEmbeddingClient`
//! is the one reference implementation: deterministic feature hashing, no
//! ML runtime involved, named after the teacher's own `"hash-based-v1"`
//! placeholder.

use crate::error::{CoreError, Result};
use crate::util::tokenize;

pub const MAX_BATCH_SIZE: usize = 32;

pub trait EmbeddingClient: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_batch(&[text.to_string()])?.into_iter().next().unwrap_or_default())
    }

    /// Batch embed, input order preserved. Batches larger than
    /// `MAX_BATCH_SIZE` are rejected rather than silently split, so callers
    /// control their own chunking.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic feature-hashing embedder: tokenize, hash each token into a
/// fixed-width signed bucket vector, L2-normalize. Not a real semantic
/// model — its purpose is giving the rest of the system a concrete,
/// order-preserving, dependency-free implementation to build and test
/// against.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashingEmbeddingClient {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingClient for HashingEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.len() > MAX_BATCH_SIZE {
            return Err(CoreError::invalid(
                "embedding_batch",
                format!("batch of {} exceeds max {}", texts.len(), MAX_BATCH_SIZE),
            ));
        }
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

impl HashingEmbeddingClient {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0f32; self.dimension];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            // The top bit of the hash picks a sign, spreading a token's
            // contribution across +/- rather than always adding.
            let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }
        l2_normalize(&mut buckets);
        buckets
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_l2_normalized() {
        let client = HashingEmbeddingClient::new(64);
        let vector = client.embed("the quick brown fox jumps").unwrap();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn same_text_is_deterministic() {
        let client = HashingEmbeddingClient::new(64);
        let a = client.embed("hello world").unwrap();
        let b = client.embed("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn batch_preserves_input_order() {
        let client = HashingEmbeddingClient::new(32);
        let inputs = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
        let batch = client.embed_batch(&inputs).unwrap();
        for (text, vector) in inputs.iter().zip(batch.iter()) {
            assert_eq!(*vector, client.embed(text).unwrap());
        }
    }

    #[test]
    fn oversize_batch_is_rejected() {
        let client = HashingEmbeddingClient::default();
        let inputs: Vec<String> = (0..33).map(|i| format!("text-{i}")).collect();
        assert!(client.embed_batch(&inputs).is_err());
    }
}
