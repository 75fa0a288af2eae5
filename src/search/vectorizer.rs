//! Hashing-trick vectors weighted by corpus IDF.
//!
//! Tokens are folded into a fixed number of slots by hash. Distinct tokens that
//! land in the same slot share it; there is no vocabulary map.

use crate::core::config::VECTOR_DIMENSION;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Token -> inverse document frequency
pub type IdfTable = BTreeMap<String, f32>;

/// Slot a token accumulates into
pub fn token_slot(token: &str) -> usize {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(token.as_bytes());
    (hasher.finish() % VECTOR_DIMENSION as u64) as usize
}

/// Compute IDF over a corpus of token lists, one list per chunk.
///
/// `idf = ln((N + 1) / (df + 1)) + 1`, which stays positive even for a token
/// present in every chunk.
pub fn compute_idf<'a, I>(documents: I) -> IdfTable
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut document_frequency: HashMap<&'a str, usize> = HashMap::new();
    let mut total = 0usize;

    for tokens in documents {
        total += 1;
        let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for token in unique {
            *document_frequency.entry(token).or_insert(0) += 1;
        }
    }

    let n = total as f32;
    document_frequency
        .into_iter()
        .map(|(token, df)| {
            let weight = ((n + 1.0) / (df as f32 + 1.0)).ln() + 1.0;
            (token.to_string(), weight)
        })
        .collect()
}

/// Build a unit-length vector from a token multiset.
///
/// Term frequency is multiplied by the token's IDF (1.0 when the table does not
/// know it). An empty token list yields the zero vector.
pub fn build_vector(tokens: &[String], idf: &IdfTable) -> Vec<f32> {
    let mut term_frequency: HashMap<&str, u32> = HashMap::new();
    for token in tokens {
        *term_frequency.entry(token.as_str()).or_insert(0) += 1;
    }

    let mut vector = vec![0f32; VECTOR_DIMENSION];
    for (token, count) in term_frequency {
        let weight = idf.get(token).copied().unwrap_or(1.0);
        vector[token_slot(token)] += count as f32 * weight;
    }

    normalize(&mut vector);
    vector
}

/// Scale a vector to unit length in place; the zero vector is left alone
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
