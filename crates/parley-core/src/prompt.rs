//! Prompt catalog: one system prompt per business.
//!
//! The built-in entries cover the demo verticals. A deployment can add or
//! replace entries through the `[prompts]` table of its config file; the
//! catalog is frozen once the relay is built.

use std::collections::BTreeMap;

use parley_types::error::ConfigError;

/// Multilingual closer. Replies open with a language tag.
const SALES_CLOSER: &str = "You are an elite Sales Closer. \
Goal: Book a meeting. \
Rules: \
1. DETECT the language of the user. \
2. REPLY IN THE EXACT SAME LANGUAGE. \
3. START your response with a language code in brackets. Examples: [EN] for English, \
[ES] for Spanish, [FR] for French, [HI] for Hindi, [DE] for German, [ZH] for Chinese. \
4. Keep answer under 20 words. End with a question.";

/// SaaS demo booker. Replies close with suggestion buttons.
const SAAS_DEMO: &str = "You are James, a friendly sales rep for a SaaS analytics product. \
Goal: qualify the visitor and book a product demo. \
Rules: \
1. Speak naturally, as on a phone call. No lists, no markdown. \
2. Keep every answer under 30 words. \
3. End every answer with two or three short follow-up options the visitor could pick, \
formatted exactly like <<Pricing|Book a demo>>.";

const REAL_ESTATE: &str = "You are Maya, a real estate agent assistant. \
Goal: learn the caller's budget, preferred area and timeline, then offer a viewing. \
Rules: \
1. Ask one question at a time. \
2. Keep every answer under 25 words. \
3. Never invent listings or prices.";

const DENTAL_CLINIC: &str = "You are the front desk of a dental clinic. \
Goal: book an appointment. \
Rules: \
1. Collect the reason for the visit and a preferred day. \
2. Keep every answer under 25 words. \
3. Never give medical advice; suggest a visit instead.";

/// Immutable business-id to system-prompt mapping.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: BTreeMap<String, String>,
}

impl PromptCatalog {
    /// The catalog shipped with Parley.
    pub fn builtin() -> Self {
        let prompts = [
            ("sales_closer", SALES_CLOSER),
            ("saas_demo", SAAS_DEMO),
            ("real_estate", REAL_ESTATE),
            ("dental_clinic", DENTAL_CLINIC),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { prompts }
    }

    /// Built-in entries plus `overrides` (which win on key collision).
    /// Blank prompts are rejected.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut catalog = Self::builtin();
        for (key, prompt) in overrides {
            if prompt.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("prompt '{key}' is empty")));
            }
            catalog.prompts.insert(key.clone(), prompt.clone());
        }
        Ok(catalog)
    }

    pub fn get(&self, business: &str) -> Option<&str> {
        self.prompts.get(business).map(String::as_str)
    }

    /// Like [`get`](Self::get), but an unknown key is an error.
    pub fn require(&self, business: &str) -> Result<&str, ConfigError> {
        self.get(business)
            .ok_or_else(|| ConfigError::UnknownBusiness(business.to_string()))
    }

    pub fn contains(&self, business: &str) -> bool {
        self.prompts.contains_key(business)
    }

    /// Business ids in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prompts.keys().map(String::as_str)
    }
}
