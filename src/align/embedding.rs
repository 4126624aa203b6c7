use std::time::Duration;

use serde::Deserialize;

/// Sentence embedding access for the semantic aligner. One instance is
/// created per job and dropped once paragraph and cell alignment finishes.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Vectors are L2-normalized by every implementation, so cosine similarity is
/// a plain dot product.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Deterministic in-process fallback: hashed character trigrams projected
/// into a fixed-dimension space. Coarse, but stable across runs and good
/// enough to pair cognates and shared tokens; the glossary bonus carries the
/// rest.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(16) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let folded = text.to_lowercase();
        let chars: Vec<char> = std::iter::once(' ')
            .chain(folded.chars())
            .chain(std::iter::once(' '))
            .collect();
        if chars.len() < 3 {
            return v;
        }
        for window in chars.windows(3) {
            let tri: String = window.iter().collect();
            let idx = (fnv1a(tri.as_bytes()) % self.dim as u64) as usize;
            v[idx] += 1.0;
        }
        normalize(&mut v);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    vectors: Vec<Vec<f32>>,
}

/// Remote embedding service: POST `{texts}` -> `{vectors}`.
pub struct HttpEmbedder {
    url: String,
    agent: ureq::Agent,
}

impl HttpEmbedder {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(timeout)
            .build();
        Self {
            url: url.to_string(),
            agent,
        }
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let response = self
            .agent
            .post(&self.url)
            .send_json(serde_json::json!({ "texts": texts }))?;
        let mut parsed: EmbedResponse = response.into_json()?;
        if parsed.vectors.len() != texts.len() {
            anyhow::bail!(
                "embedding service returned {} vectors for {} texts",
                parsed.vectors.len(),
                texts.len()
            );
        }
        for v in &mut parsed.vectors {
            normalize(v);
        }
        Ok(parsed.vectors)
    }
}
