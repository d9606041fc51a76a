//! Narrative synthesis: scorecard in, typed narrative sections out.
//!
//! Builds the prompt from a [`Scorecard`], calls the [`NarrativeGenerator`],
//! and parses the delimited reply into a [`NarrativeBundle`]. Scores are never
//! touched here; a failed narrative leaves the scorecard valid.

pub mod parse;
pub mod prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::generator::{GenerationRequest, GeneratorError, NarrativeGenerator};
use crate::scoring::Scorecard;

pub use parse::{match_practice, parse_practices, parse_sections, Practice, Section, Sections};
pub use prompt::{NarrativePrompt, PromptTemplate, DEFAULT_PROMPT};

pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

#[derive(Debug, Error)]
pub enum NarrativeGenerationError {
    #[error("narrative generator failed: {0}")]
    Generator(#[from] GeneratorError),

    #[error("reply from {model} contained none of the section markers ({reply_chars} chars)")]
    NoSections { model: String, reply_chars: usize },
}

impl NarrativeGenerationError {
    /// Whether asking again may give a usable narrative.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Generator(e) => e.is_retryable(),
            Self::NoSections { .. } => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NarrativeConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.4,
            max_tokens: Some(4_096),
        }
    }
}

impl NarrativeConfig {
    /// Defaults overridden by `FEEDBACK360_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("FEEDBACK360_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Some(t) = std::env::var("FEEDBACK360_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
        {
            config.temperature = t.clamp(0.0, 2.0);
        }
        if let Some(n) = std::env::var("FEEDBACK360_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            config.max_tokens = (n > 0).then_some(n);
        }
        config
    }
}

/// Parsed narrative for one participant's report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeBundle {
    pub sections: Sections,
    pub practices: Vec<Practice>,
    /// Model that wrote the narrative; empty when unavailable.
    pub model: String,
    /// BLAKE3 hash of the prompt the narrative was generated from.
    pub prompt_hash: String,
    /// The generator stopped on its token limit.
    pub truncated: bool,
}

impl NarrativeBundle {
    /// Bundle for a scoring-only report.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_available(&self) -> bool {
        !self.sections.is_empty()
    }

    /// Parse a raw reply. Fails only when no section marker is present.
    pub fn from_reply(
        reply: &str,
        model: impl Into<String>,
        prompt_hash: impl Into<String>,
    ) -> Result<Self, NarrativeGenerationError> {
        let model = model.into();
        let sections = parse_sections(reply);
        if sections.is_empty() {
            return Err(NarrativeGenerationError::NoSections {
                model,
                reply_chars: reply.chars().count(),
            });
        }
        if sections.found() < Section::ALL.len() {
            let missing: Vec<_> = Section::ALL
                .iter()
                .filter(|s| sections.get(**s).is_none())
                .map(|s| s.marker())
                .collect();
            warn!(model = %model, ?missing, "narrative reply is missing sections");
        }
        let practices = sections
            .development_practices
            .as_deref()
            .map(parse_practices)
            .unwrap_or_default();
        Ok(Self {
            sections,
            practices,
            model,
            prompt_hash: prompt_hash.into(),
            truncated: false,
        })
    }

    pub fn practice_for(&self, feedback_text: &str) -> Option<&Practice> {
        match_practice(&self.practices, feedback_text)
    }
}

/// Prompt, call, parse.
#[derive(Clone)]
pub struct NarrativeSynthesizer {
    generator: Arc<dyn NarrativeGenerator>,
    config: NarrativeConfig,
    template: PromptTemplate,
}

impl NarrativeSynthesizer {
    pub fn new(generator: Arc<dyn NarrativeGenerator>, config: NarrativeConfig) -> Self {
        Self {
            generator,
            config,
            template: DEFAULT_PROMPT,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn config(&self) -> &NarrativeConfig {
        &self.config
    }

    pub fn prompt(&self, participant_name: &str, scorecard: &Scorecard) -> NarrativePrompt {
        self.template.render(participant_name, scorecard)
    }

    pub async fn synthesize(
        &self,
        participant_name: &str,
        scorecard: &Scorecard,
    ) -> Result<NarrativeBundle, NarrativeGenerationError> {
        let prompt = self.prompt(participant_name, scorecard);
        let prompt_hash = prompt.hash();
        debug!(
            template = prompt.template_slug,
            prompt_hash = %prompt_hash,
            develop_items = scorecard.develop_items().count(),
            "requesting narrative"
        );

        let mut request =
            GenerationRequest::new(&self.config.model, prompt.to_messages(), "narrative")
                .temperature(self.config.temperature);
        if let Some(max) = self.config.max_tokens {
            request = request.max_tokens(max);
        }

        let reply = self.generator.generate(request).await?;
        let mut bundle = NarrativeBundle::from_reply(&reply.content, &self.config.model, prompt_hash)?;
        bundle.truncated = reply.truncated();
        if bundle.truncated {
            warn!(model = %self.config.model, "narrative reply hit the token limit");
        }

        let unmatched = scorecard
            .develop_items()
            .filter(|c| bundle.practice_for(&c.feedback_text).is_none())
            .count();
        info!(
            model = %self.config.model,
            sections = bundle.sections.found(),
            practices = bundle.practices.len(),
            unmatched_develop_items = unmatched,
            "narrative parsed"
        );
        Ok(bundle)
    }
}
