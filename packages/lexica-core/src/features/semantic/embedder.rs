//! Embedding contract and the in-tree deterministic embedder.
//!
//! Real sentence-transformer models are external collaborators; the core only
//! consumes this trait. [`HashEmbedder`] is the offline implementation:
//! character n-gram hashing into a fixed-dimension space, L2-normalized,
//! deterministic across runs.

use rayon::prelude::*;

use crate::features::semantic::SemanticError;

/// Minimum encode batch size any embedder must support.
pub const MIN_BATCH_SIZE: usize = 32;

/// Text → dense vector contract.
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Preferred encode batch size (at least [`MIN_BATCH_SIZE`]).
    fn batch_size(&self) -> usize {
        MIN_BATCH_SIZE
    }

    /// Encode a batch to float32 vectors of `dimension()` length.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        Ok(self
            .embed_batch(std::slice::from_ref(&text.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_else(|| vec![0.0; self.dimension()]))
    }
}

/// L2-normalize a vector in place; zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Deterministic character-trigram hashing embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model_name: String,
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model_name: format!("hash-trigram-{}", dimension),
            dimension,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let chars: Vec<char> = format!("^{}$", text).chars().collect();

        if chars.len() < 3 {
            let slot = (fnv1a(text.as_bytes()) % self.dimension as u64) as usize;
            vector[slot] = 1.0;
            return vector;
        }

        for window in chars.windows(3) {
            let gram: String = window.iter().collect();
            let hash = fnv1a(gram.as_bytes());
            let slot = (hash % self.dimension as u64) as usize;
            // Sign bit from a higher hash bit spreads mass across the axis
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        Ok(texts.par_iter().map(|t| self.embed_one(t)).collect())
    }
}
