//! Prompt composer
//!
//! Assembles the system instruction from an ordered table of layers under a
//! token budget. Mandatory layers (persona, active skill) are always
//! included; optional layers are added in priority order and shed in-order
//! when the budget runs out. Composition is a pure function of the layer set
//! and budget, so the same inputs always produce the same hash.

use crate::models::IntentLabel;
use crate::prompts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// One named block of instructional context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptLayer {
    /// Fixed priority rank; lower = higher priority
    pub index: u8,
    pub name: String,
    pub body: String,
    pub required: bool,
}

impl PromptLayer {
    pub fn new(index: u8, name: impl Into<String>, body: impl Into<String>, required: bool) -> Self {
        Self {
            index,
            name: name.into(),
            body: body.into(),
            required,
        }
    }

    pub fn token_estimate(&self) -> usize {
        estimate_tokens(&self.body)
    }
}

/// Deterministic length-based token approximation (~4 chars per token).
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

/// Summary of one included layer, kept for the turn log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSummary {
    pub name: String,
    pub index: u8,
    pub token_estimate: usize,
}

/// Result of composition, ready for the model and the turn log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedPrompt {
    pub system_message: String,
    pub included: Vec<LayerSummary>,
    /// Layer names dropped to fit the budget, in shedding order
    pub shed_layers: Vec<String>,
    pub total_tokens: usize,
    /// First 16 hex chars of the SHA-256 of the final content
    pub hash: String,
    /// True when the mandatory layers alone exceeded the budget
    pub over_budget: bool,
    pub prompt_version: String,
}

/// Prompt composer
pub struct PromptComposer;

impl PromptComposer {
    /// Compose the final system message from candidate layers.
    ///
    /// Mandatory layers are included first regardless of budget; optional
    /// layers are then considered in ascending priority index and shed
    /// individually when adding them would exceed the budget. No reordering
    /// for fit: a skipped layer never makes room for a lower-priority one.
    pub fn compose(mut layers: Vec<PromptLayer>, budget: usize) -> ComposedPrompt {
        layers.sort_by_key(|l| l.index);

        let mut total_tokens = 0usize;
        let mut shed_layers = Vec::new();
        let mut included: Vec<&PromptLayer> = Vec::with_capacity(layers.len());

        for layer in &layers {
            if layer.required {
                total_tokens += layer.token_estimate();
                included.push(layer);
            }
        }

        let over_budget = total_tokens > budget;
        if over_budget {
            warn!(
                total_tokens,
                budget, "mandatory layers alone exceed the token budget"
            );
        }

        for layer in &layers {
            if layer.required {
                continue;
            }
            let estimate = layer.token_estimate();
            if total_tokens + estimate <= budget {
                total_tokens += estimate;
                included.push(layer);
            } else {
                warn!(layer = %layer.name, estimate, "shedding prompt layer");
                shed_layers.push(layer.name.clone());
            }
        }

        // Restore priority order across mandatory and optional layers.
        included.sort_by_key(|l| l.index);

        let system_message = included
            .iter()
            .map(|l| l.body.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let summaries = included
            .iter()
            .map(|l| LayerSummary {
                name: l.name.clone(),
                index: l.index,
                token_estimate: l.token_estimate(),
            })
            .collect::<Vec<_>>();

        let hash = content_hash(&system_message);

        info!(
            layers = summaries.len(),
            shed = shed_layers.len(),
            total_tokens,
            %hash,
            "prompt composed"
        );

        ComposedPrompt {
            system_message,
            included: summaries,
            shed_layers,
            total_tokens,
            hash,
            over_budget,
            prompt_version: format!("{}/{}", prompts::PERSONA_VERSION, prompts::SKILLS_VERSION),
        }
    }

    /// Build the candidate layer table for a turn.
    ///
    /// Layer 0 persona (required), 1 restaurant memory, 2 active skill
    /// (required), 3 recent data, 4 drip questions (suppressed during
    /// onboarding). Shedding order therefore runs drip → recent data →
    /// memory; persona and skill are never shed.
    pub fn build_layers(
        intent: IntentLabel,
        user_memory: Option<&str>,
        recent_data: Option<&str>,
        drip_hint: Option<&str>,
    ) -> Vec<PromptLayer> {
        let mut layers = vec![PromptLayer::new(0, "persona", prompts::PERSONA_PROMPT, true)];

        if let Some(memory) = user_memory {
            layers.push(PromptLayer::new(1, "user_memory", memory, false));
        }

        if let Some(skill) = prompts::skill_prompt(intent) {
            layers.push(PromptLayer::new(2, format!("skill_{}", intent), skill, true));
        }

        if let Some(recent) = recent_data {
            layers.push(PromptLayer::new(
                3,
                "recent_data",
                format!("## Dados Recentes\n{}", recent),
                false,
            ));
        }

        if let Some(drip) = drip_hint {
            if intent != IntentLabel::Onboarding {
                layers.push(PromptLayer::new(4, "drip_context", drip, false));
            }
        }

        layers
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
