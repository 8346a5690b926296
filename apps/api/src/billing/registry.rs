//! Model Registry — the one place model identifiers, prices and tiers live.
//!
//! Identifiers are parsed into [`ModelId`] at the HTTP boundary, so an unknown
//! model never reaches a generator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelId {
    Gpt41Nano,
    Gpt41Mini,
    Gpt41,
    O4MiniHigh,
    ClaudeHaiku35,
    ClaudeSonnet4,
    ClaudeOpus4,
}

impl ModelId {
    pub const ALL: [ModelId; 7] = [
        ModelId::Gpt41Nano,
        ModelId::Gpt41Mini,
        ModelId::Gpt41,
        ModelId::O4MiniHigh,
        ModelId::ClaudeHaiku35,
        ModelId::ClaudeSonnet4,
        ModelId::ClaudeOpus4,
    ];

    /// The provider-facing model string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt41Nano => "gpt-4.1-nano",
            ModelId::Gpt41Mini => "gpt-4.1-mini",
            ModelId::Gpt41 => "gpt-4.1",
            ModelId::O4MiniHigh => "o4-mini-high",
            ModelId::ClaudeHaiku35 => "claude-3-5-haiku-20241022",
            ModelId::ClaudeSonnet4 => "claude-sonnet-4-20250514",
            ModelId::ClaudeOpus4 => "claude-opus-4-20250514",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| GenerationError::Validation(format!("Unknown model '{s}'")))
    }
}

impl Serialize for ModelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Standard,
    Advanced,
    Premium,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub label: &'static str,
    pub provider: Provider,
    pub credit_cost: u32,
    pub tier: ModelTier,
}

/// Static, read-only price list.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// The production catalogue.
    pub fn standard() -> Self {
        use ModelId::*;
        let entry = |id, label, provider, credit_cost, tier| ModelDescriptor {
            id,
            label,
            provider,
            credit_cost,
            tier,
        };
        Self {
            models: vec![
                entry(Gpt41Nano, "GPT-4.1 Nano", Provider::OpenAi, 1, ModelTier::Fast),
                entry(Gpt41Mini, "GPT-4.1 Mini", Provider::OpenAi, 1, ModelTier::Standard),
                entry(Gpt41, "GPT-4.1", Provider::OpenAi, 2, ModelTier::Advanced),
                entry(O4MiniHigh, "o4-mini (high reasoning)", Provider::OpenAi, 3, ModelTier::Premium),
                entry(ClaudeHaiku35, "Claude 3.5 Haiku", Provider::Anthropic, 1, ModelTier::Fast),
                entry(ClaudeSonnet4, "Claude Sonnet 4", Provider::Anthropic, 2, ModelTier::Advanced),
                entry(ClaudeOpus4, "Claude Opus 4", Provider::Anthropic, 5, ModelTier::Premium),
            ],
        }
    }

    /// A registry restricted to the given descriptors.
    pub fn with_models(models: Vec<ModelDescriptor>) -> Self {
        Self { models }
    }

    pub fn get(&self, id: ModelId) -> Result<&ModelDescriptor, GenerationError> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| GenerationError::Validation(format!("Model '{id}' is not available")))
    }

    /// Resolves a raw identifier from a request.
    pub fn resolve(&self, raw: &str) -> Result<&ModelDescriptor, GenerationError> {
        self.get(raw.parse()?)
    }

    pub fn credit_cost(&self, id: ModelId) -> Result<u32, GenerationError> {
        self.get(id).map(|m| m.credit_cost)
    }

    pub fn exists(&self, raw: &str) -> bool {
        self.resolve(raw).is_ok()
    }

    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
