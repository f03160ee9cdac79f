//! Dense-vector index structures with size-driven type selection.
//!
//! All distances are squared L2; for unit vectors `similarity = 1 − d/2`
//! equals cosine similarity. Index type escalates with vocabulary size:
//! exact flat storage, then scalar quantization (FP16 / INT8), then IVF with
//! PQ-coded residuals. Training (k-means) is deterministic: evenly spaced
//! seeding, fixed iteration count, no randomness.

use serde::{Deserialize, Serialize};

use crate::features::semantic::SemanticError;

/// Index families, escalating by corpus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Flat,
    Fp16Flat,
    Int8Flat,
    IvfPq,
    OpqIvfPq,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Flat => "Flat",
            IndexKind::Fp16Flat => "FP16",
            IndexKind::Int8Flat => "INT8",
            IndexKind::IvfPq => "IVF-PQ",
            IndexKind::OpqIvfPq => "OPQ-IVF-PQ",
        }
    }
}

/// Pick the index family for a vocabulary size.
pub fn select_index_kind(num_vectors: usize) -> IndexKind {
    if num_vectors <= 10_000 {
        IndexKind::Flat
    } else if num_vectors <= 25_000 {
        IndexKind::Fp16Flat
    } else if num_vectors <= 50_000 {
        IndexKind::Int8Flat
    } else if num_vectors <= 250_000 {
        IndexKind::IvfPq
    } else {
        IndexKind::OpqIvfPq
    }
}

/// IVF cluster count for a vocabulary size.
pub fn ivf_nlist(num_vectors: usize) -> usize {
    (num_vectors / 100).clamp(1, 4096)
}

/// IVF probe count for a cluster count.
pub fn ivf_nprobe(nlist: usize) -> usize {
    (nlist / 8).clamp(1, 128)
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FP16 conversion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x007f_ffff;

    if exp == 255 {
        // Inf / NaN
        return sign | 0x7c00 | if mant != 0 { 0x0200 } else { 0 };
    }

    let exp16 = exp - 127 + 15;
    if exp16 >= 31 {
        return sign | 0x7c00;
    }
    if exp16 <= 0 {
        if exp16 < -10 {
            return sign;
        }
        let mant = mant | 0x0080_0000;
        let shift = (14 - exp16) as u32;
        let half_mant = (mant >> shift) as u16;
        let round_bit = 1u32 << (shift - 1);
        if mant & round_bit != 0 {
            return sign | (half_mant + 1);
        }
        return sign | half_mant;
    }

    let half = sign | ((exp16 as u16) << 10) | ((mant >> 13) as u16);
    if mant & 0x1000 != 0 {
        half + 1
    } else {
        half
    }
}

fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = ((bits & 0x8000) as u32) << 16;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let mant = (bits & 0x03ff) as u32;

    let out = if exp == 0 {
        if mant == 0 {
            sign
        } else {
            // Subnormal half → normalized single
            let mut exp32: i32 = 127 - 15 + 1;
            let mut mant = mant;
            while mant & 0x0400 == 0 {
                mant <<= 1;
                exp32 -= 1;
            }
            mant &= 0x03ff;
            sign | ((exp32 as u32) << 23) | (mant << 13)
        }
    } else if exp == 31 {
        sign | 0x7f80_0000 | (mant << 13)
    } else {
        sign | ((exp + 127 - 15) << 23) | (mant << 13)
    };
    f32::from_bits(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deterministic k-means
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const KMEANS_ITERATIONS: usize = 10;

/// Lloyd's k-means with evenly spaced seeding. Returns row-major centroids.
fn kmeans(vectors: &[f32], dim: usize, k: usize) -> Vec<f32> {
    let n = vectors.len() / dim;
    let k = k.min(n).max(1);

    let mut centroids: Vec<f32> = (0..k)
        .flat_map(|i| {
            let src = (i * n) / k;
            vectors[src * dim..(src + 1) * dim].to_vec()
        })
        .collect();

    let mut assignments = vec![0usize; n];
    for _ in 0..KMEANS_ITERATIONS {
        for (i, assignment) in assignments.iter_mut().enumerate() {
            let v = &vectors[i * dim..(i + 1) * dim];
            let mut best = 0usize;
            let mut best_dist = f32::MAX;
            for c in 0..k {
                let dist = squared_l2(v, &centroids[c * dim..(c + 1) * dim]);
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            *assignment = best;
        }

        let mut sums = vec![0.0f32; k * dim];
        let mut counts = vec![0usize; k];
        for (i, &c) in assignments.iter().enumerate() {
            counts[c] += 1;
            for d in 0..dim {
                sums[c * dim + d] += vectors[i * dim + d];
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for d in 0..dim {
                    centroids[c * dim + d] = sums[c * dim + d] / counts[c] as f32;
                }
            }
            // Empty clusters keep their previous centroid
        }
    }
    centroids
}

fn nearest_centroids(query: &[f32], centroids: &[f32], dim: usize, count: usize) -> Vec<usize> {
    let k = centroids.len() / dim;
    let mut scored: Vec<(usize, f32)> = (0..k)
        .map(|c| (c, squared_l2(query, &centroids[c * dim..(c + 1) * dim])))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(count).map(|(c, _)| c).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Index variants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Product-quantization parameters for IVF residual coding.
const PQ_CODEBOOK_SIZE: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VectorIndex {
    Flat {
        dim: usize,
        vectors: Vec<f32>,
    },
    Fp16Flat {
        dim: usize,
        vectors: Vec<u16>,
    },
    Int8Flat {
        dim: usize,
        scales: Vec<f32>,
        vectors: Vec<i8>,
    },
    IvfPq {
        dim: usize,
        nlist: usize,
        nprobe: usize,
        /// Coarse centroids, row-major `nlist × dim`.
        centroids: Vec<f32>,
        /// Vector ids per inverted list.
        lists: Vec<Vec<u32>>,
        /// Sub-quantizer count; `dim % m == 0`.
        m: usize,
        /// Residual codebooks, `m × 256 × (dim/m)`.
        codebooks: Vec<f32>,
        /// PQ codes, `n × m`.
        codes: Vec<u8>,
        /// OPQ slot: identity rotation when true (trained rotation is a
        /// recorded parameter, not applied).
        opq: bool,
    },
}

impl VectorIndex {
    /// Train and populate an index over unit vectors.
    pub fn build(kind: IndexKind, vectors: &[Vec<f32>], dim: usize) -> Result<VectorIndex, SemanticError> {
        for v in vectors {
            if v.len() != dim {
                return Err(SemanticError::DimensionMismatch {
                    expected: dim,
                    actual: v.len(),
                });
            }
        }
        let flat: Vec<f32> = vectors.iter().flatten().copied().collect();

        let index = match kind {
            IndexKind::Flat => VectorIndex::Flat { dim, vectors: flat },
            IndexKind::Fp16Flat => VectorIndex::Fp16Flat {
                dim,
                vectors: flat.iter().map(|&x| f32_to_f16_bits(x)).collect(),
            },
            IndexKind::Int8Flat => {
                let n = vectors.len();
                let mut scales = Vec::with_capacity(n);
                let mut quantized = Vec::with_capacity(flat.len());
                for v in vectors {
                    let max_abs = v.iter().fold(0.0f32, |acc, x| acc.max(x.abs()));
                    let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 1.0 };
                    scales.push(scale);
                    quantized.extend(v.iter().map(|&x| (x / scale).round().clamp(-127.0, 127.0) as i8));
                }
                VectorIndex::Int8Flat {
                    dim,
                    scales,
                    vectors: quantized,
                }
            }
            IndexKind::IvfPq | IndexKind::OpqIvfPq => {
                Self::build_ivf_pq(&flat, dim, vectors.len(), kind == IndexKind::OpqIvfPq)?
            }
        };
        Ok(index)
    }

    fn build_ivf_pq(flat: &[f32], dim: usize, n: usize, opq: bool) -> Result<VectorIndex, SemanticError> {
        if n == 0 {
            return Err(SemanticError::EmptyIndex);
        }

        let nlist = ivf_nlist(n);
        let nprobe = ivf_nprobe(nlist);
        let centroids = kmeans(flat, dim, nlist);

        // Assign vectors to lists and collect residuals
        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); nlist];
        let mut residuals = vec![0.0f32; flat.len()];
        for i in 0..n {
            let v = &flat[i * dim..(i + 1) * dim];
            let c = nearest_centroids(v, &centroids, dim, 1)[0];
            lists[c].push(i as u32);
            for d in 0..dim {
                residuals[i * dim + d] = v[d] - centroids[c * dim + d];
            }
        }

        // Sub-quantizer split
        let m = [8usize, 4, 2, 1]
            .into_iter()
            .find(|m| dim % m == 0)
            .unwrap_or(1);
        let dsub = dim / m;
        let k = PQ_CODEBOOK_SIZE.min(n);

        // Train one codebook per subspace over the residuals
        let mut codebooks = vec![0.0f32; m * k * dsub];
        for sub in 0..m {
            let sub_vectors: Vec<f32> = (0..n)
                .flat_map(|i| residuals[i * dim + sub * dsub..i * dim + (sub + 1) * dsub].to_vec())
                .collect();
            let trained = kmeans(&sub_vectors, dsub, k);
            codebooks[sub * k * dsub..sub * k * dsub + trained.len()].copy_from_slice(&trained);
        }

        // Encode
        let mut codes = vec![0u8; n * m];
        for i in 0..n {
            for sub in 0..m {
                let r = &residuals[i * dim + sub * dsub..i * dim + (sub + 1) * dsub];
                let book = &codebooks[sub * k * dsub..(sub + 1) * k * dsub];
                let code = nearest_centroids(r, book, dsub, 1)[0];
                codes[i * m + sub] = code as u8;
            }
        }

        Ok(VectorIndex::IvfPq {
            dim,
            nlist,
            nprobe,
            centroids,
            lists,
            m,
            codebooks,
            codes,
            opq,
        })
    }

    pub fn dim(&self) -> usize {
        match self {
            VectorIndex::Flat { dim, .. }
            | VectorIndex::Fp16Flat { dim, .. }
            | VectorIndex::Int8Flat { dim, .. }
            | VectorIndex::IvfPq { dim, .. } => *dim,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VectorIndex::Flat { dim, vectors } => vectors.len() / dim,
            VectorIndex::Fp16Flat { dim, vectors } => vectors.len() / dim,
            VectorIndex::Int8Flat { scales, .. } => scales.len(),
            VectorIndex::IvfPq { m, codes, .. } => codes.len() / m,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reconstruct(&self, i: usize, out: &mut [f32]) {
        match self {
            VectorIndex::Flat { dim, vectors } => {
                out.copy_from_slice(&vectors[i * dim..(i + 1) * dim]);
            }
            VectorIndex::Fp16Flat { dim, vectors } => {
                for (d, slot) in out.iter_mut().enumerate() {
                    *slot = f16_bits_to_f32(vectors[i * dim + d]);
                }
            }
            VectorIndex::Int8Flat { dim, scales, vectors } => {
                let scale = scales[i];
                for (d, slot) in out.iter_mut().enumerate() {
                    *slot = vectors[i * dim + d] as f32 * scale;
                }
            }
            VectorIndex::IvfPq { .. } => unreachable!("IVF reconstruction handled in search"),
        }
    }

    /// K nearest neighbors by squared L2 distance, ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, SemanticError> {
        if query.len() != self.dim() {
            return Err(SemanticError::DimensionMismatch {
                expected: self.dim(),
                actual: query.len(),
            });
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u32, f32)> = match self {
            VectorIndex::Flat { .. } | VectorIndex::Fp16Flat { .. } | VectorIndex::Int8Flat { .. } => {
                let dim = self.dim();
                let mut buf = vec![0.0f32; dim];
                (0..self.len())
                    .map(|i| {
                        self.reconstruct(i, &mut buf);
                        (i as u32, squared_l2(query, &buf))
                    })
                    .collect()
            }
            VectorIndex::IvfPq {
                dim,
                nprobe,
                centroids,
                lists,
                m,
                codebooks,
                codes,
                ..
            } => {
                let dsub = dim / m;
                let codebook_k = codebooks.len() / (m * dsub);
                let mut reconstructed = vec![0.0f32; *dim];
                let mut scored = Vec::new();

                for c in nearest_centroids(query, centroids, *dim, *nprobe) {
                    for &i in &lists[c] {
                        let i_usize = i as usize;
                        // centroid + decoded residual
                        for d in 0..*dim {
                            reconstructed[d] = centroids[c * dim + d];
                        }
                        for sub in 0..*m {
                            let code = codes[i_usize * m + sub] as usize;
                            let entry =
                                &codebooks[sub * codebook_k * dsub + code * dsub..][..dsub];
                            for d in 0..dsub {
                                reconstructed[sub * dsub + d] += entry[d];
                            }
                        }
                        scored.push((i, squared_l2(query, &reconstructed)));
                    }
                }
                scored
            }
        };

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
