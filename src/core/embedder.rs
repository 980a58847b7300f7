//! Deterministic fallback embedder.
//!
//! Produces a content-addressed pseudo-embedding: the SHA-512 digest of the
//! text is stretched to the requested dimension and normalized to unit length.
//!
//! Identical text always yields a bit-identical vector. Similar texts do NOT
//! yield similar vectors; this is not a semantic embedding. It exists so the
//! pipeline keeps producing storable, comparable vectors when no trained
//! encoder is installed.

use sha2::{Digest, Sha512};

/// Number of bytes in a SHA-512 digest (the window count)
pub const DIGEST_WINDOWS: usize = 64;

/// Embed `text` into a unit vector of `dimension` components.
///
/// Component `i` reads digest byte `i mod 64` and maps it from `[0, 255]`
/// to `[-1, 1]`. A dimension of 0 yields an empty vector.
pub fn embed(text: &str, dimension: usize) -> Vec<f32> {
    let digest = Sha512::digest(text.as_bytes());

    let raw: Vec<f64> = (0..dimension)
        .map(|i| {
            let byte = digest[i % DIGEST_WINDOWS];
            (byte as f64 / 255.0) * 2.0 - 1.0
        })
        .collect();

    let magnitude = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
    if magnitude == 0.0 {
        return raw.into_iter().map(|v| v as f32).collect();
    }

    raw.into_iter().map(|v| (v / magnitude) as f32).collect()
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 for mismatched lengths, empty input or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0) as f32
}

/// Euclidean norm, accumulated in f64
pub fn norm(vector: &[f32]) -> f64 {
    vector.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt()
}
