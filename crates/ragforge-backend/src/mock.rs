//! Deterministic scripted backend for tests.
//!
//! Embeddings are a hashed bag-of-words projection, so identical texts
//! map to identical vectors and overlapping texts land close together.
//! Generation pops scripted responses in FIFO order and records every
//! call for assertions.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;
use ragforge_core::{Error, Result};

use crate::types::{GenerationChunk, GenerationStream};
use crate::LanguageBackend;

pub struct MockBackend {
    dim: usize,
    responses: Mutex<VecDeque<String>>,
    embed_batches: Mutex<Vec<usize>>,
    generate_prompts: Mutex<Vec<String>>,
    failing_embeds: Mutex<usize>,
}

impl MockBackend {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            responses: Mutex::new(VecDeque::new()),
            embed_batches: Mutex::new(Vec::new()),
            generate_prompts: Mutex::new(Vec::new()),
            failing_embeds: Mutex::new(0),
        }
    }

    /// Queue scripted generation responses, consumed in order.
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses
            .lock()
            .extend(responses.into_iter().map(Into::into));
        self
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().push_back(response.into());
    }

    /// Make the next `n` embed calls fail with a retryable error.
    pub fn fail_next_embeds(&self, n: usize) {
        *self.failing_embeds.lock() = n;
    }

    /// Number of embed batches received.
    pub fn embed_call_count(&self) -> usize {
        self.embed_batches.lock().len()
    }

    /// Sizes of the embed batches received, in order.
    pub fn embed_batch_sizes(&self) -> Vec<usize> {
        self.embed_batches.lock().clone()
    }

    pub fn generate_call_count(&self) -> usize {
        self.generate_prompts.lock().len()
    }

    pub fn generate_prompts(&self) -> Vec<String> {
        self.generate_prompts.lock().clone()
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let slot = (hasher.finish() % self.dim as u64) as usize;
            v[slot] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            // Empty text still needs a unit vector.
            v[0] = 1.0;
        }
        v
    }

    fn next_response(&self) -> String {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| "mock answer".to_string())
    }
}

#[async_trait::async_trait]
impl LanguageBackend for MockBackend {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        {
            let mut failing = self.failing_embeds.lock();
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::provider_retryable("scripted embed failure", Some(503)));
            }
        }
        self.embed_batches.lock().push(texts.len());
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn generate(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
        self.generate_prompts.lock().push(prompt.to_string());
        Ok(self.next_response())
    }

    fn generate_stream(&self, prompt: &str, _system: Option<&str>) -> GenerationStream {
        self.generate_prompts.lock().push(prompt.to_string());
        let response = self.next_response();
        Box::pin(async_stream::stream! {
            for word in response.split_inclusive(' ') {
                yield Ok(GenerationChunk::delta(word));
            }
            yield Ok(GenerationChunk {
                delta: String::new(),
                finish_reason: Some("stop".into()),
                usage: None,
            });
        })
    }
}
