use crate::error::SummariseError;

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: None,
        }
    }
}

/// The LLM provider seam. Implementations are external to the core; tests
/// use deterministic fakes.
pub trait Summariser: Send + Sync {
    fn generate(&self, prompt: &str, options: &SummaryOptions) -> Result<String, SummariseError>;

    /// Batched generation. The default loops and stops at the first fatal
    /// error; providers with a batch endpoint override it.
    fn generate_batch(
        &self,
        prompts: &[&str],
        options: &SummaryOptions,
    ) -> Vec<Result<String, SummariseError>> {
        prompts
            .iter()
            .map(|prompt| self.generate(prompt, options))
            .collect()
    }
}
