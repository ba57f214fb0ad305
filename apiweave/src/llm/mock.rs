//! Mock gateway for tests and examples: scripted chat replies, deterministic embeddings.
//!
//! Replies are consumed in order; the last one repeats once the script runs out.
//! Prompts are recorded so tests can assert on what each component asked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{LlmError, LlmGateway};

/// One recorded chat call.
#[derive(Clone, Debug)]
pub struct RecordedPrompt {
    pub system: String,
    pub user: String,
}

/// Deterministic bag-of-tokens embedding: same text, same vector; shared tokens,
/// nearby vectors. L2-normalized so cosine similarity is just a dot product.
pub fn deterministic_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim.max(1)];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in token.to_lowercase().bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        let idx = (hash % v.len() as u64) as usize;
        v[idx] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Scripted [`LlmGateway`] fake.
pub struct MockGateway {
    replies: Vec<String>,
    cursor: AtomicUsize,
    /// Remaining leading chat calls that fail with a transient error.
    transient_failures: AtomicUsize,
    fail_embeddings: bool,
    embedding_dim: usize,
    prompts: Mutex<Vec<RecordedPrompt>>,
    embed_calls: AtomicUsize,
}

impl MockGateway {
    /// Every chat call returns `reply`.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self::with_replies([reply.into()])
    }

    /// Chat calls consume `replies` in order; the last repeats.
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            cursor: AtomicUsize::new(0),
            transient_failures: AtomicUsize::new(0),
            fail_embeddings: false,
            embedding_dim: 8,
            prompts: Mutex::new(Vec::new()),
            embed_calls: AtomicUsize::new(0),
        }
    }

    /// The first `n` chat calls fail with a transient transport error.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.transient_failures = AtomicUsize::new(n);
        self
    }

    /// All embed calls fail (exercise degraded scoring paths).
    pub fn with_failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim.max(1);
        self
    }

    /// All chat prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    /// Number of chat calls made (including the ones that failed).
    pub fn chat_calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmGateway for MockGateway {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        _temperature: f32,
        _max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        self.prompts.lock().expect("prompts lock").push(RecordedPrompt {
            system: system.to_string(),
            user: user.to_string(),
        });

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LlmError::Transport("mock transient failure".to_string()));
        }

        if self.replies.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        let i = i.min(self.replies.len() - 1);
        Ok(self.replies[i].clone())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings {
            return Err(LlmError::Transport("mock embedding failure".to_string()));
        }
        Ok(deterministic_embedding(text, self.embedding_dim))
    }
}
