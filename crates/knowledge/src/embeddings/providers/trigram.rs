//! Deterministic character-trigram embeddings for offline use.

use crate::embeddings::provider::EmbeddingProvider;
use motolaw_core::AppResult;
use std::collections::HashMap;

const STOP_WORDS: [&str; 20] = [
    "the", "is", "at", "on", "an", "as", "are", "was", "for", "to", "of", "in", "and", "or",
    "with", "by", "from", "this", "that", "it",
];

/// Hashes character trigrams and whole tokens into a fixed-size vector.
///
/// Tokens are maximal runs of alphanumeric characters, so unsegmented CJK
/// text becomes one long token whose trigrams still overlap with any query
/// sharing a phrase. Vectors are unit-normalized.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
}

impl TrigramProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, feature: &str, seed: u64) -> usize {
        let hash = feature
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(seed).wrapping_add(b as u64));
        (hash % self.dimensions as u64) as usize
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let lower = text.to_lowercase();
        let mut token_freq: HashMap<&str, u32> = HashMap::new();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
            .filter(|t| !t.is_ascii() || t.len() > 2)
        {
            *token_freq.entry(token).or_insert(0) += 1;
        }

        for (token, freq) in &token_freq {
            let chars: Vec<char> = token.chars().collect();
            let weight = (*freq as f32).sqrt();

            if chars.len() < 3 {
                embedding[self.bucket(token, 37)] += weight;
            } else {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    embedding[self.bucket(&trigram, 37)] += weight;
                }
            }

            embedding[self.bucket(token, 31)] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_trigram_embed_is_normalized() {
        let provider = TrigramProvider::new(384);
        let embedding = provider.embed("helmet rules for riders").await.unwrap();

        assert_eq!(embedding.len(), 384);
        assert!((norm(&embedding) - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_trigram_deterministic() {
        let provider = TrigramProvider::new(384);
        let a = provider.embed("駕照更換規定").await.unwrap();
        let b = provider.embed("駕照更換規定").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_trigram_empty_text_is_zero_vector() {
        let provider = TrigramProvider::new(64);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_trigram_shared_cjk_phrase_scores_higher() {
        let provider = TrigramProvider::new(384);
        let texts = vec![
            "駕照更換規定?".to_string(),
            "大型重型機車駕照更換規定如下".to_string(),
            "高速公路服務區營業時間".to_string(),
        ];
        let v = provider.embed_batch(&texts).await.unwrap();

        let related = cosine_similarity(&v[0], &v[1]);
        let unrelated = cosine_similarity(&v[0], &v[2]);
        assert!(related > unrelated);
    }
}
