//! Static registry of supported Claude models.
//!
//! Descriptors are immutable at runtime; the registry is built once at
//! startup and answers list/get/validate/capabilities queries with O(1)
//! lookup (aliases resolve to their canonical id).

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub capabilities: ModelCapabilities,
    pub metadata: ModelMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelCapabilities {
    pub streaming: bool,
    pub function_calling: bool,
    pub vision: bool,
    pub json_mode: bool,
    pub tools: bool,
    pub reasoning_mode: bool,
    pub code_execution: bool,
    pub max_context_length: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub pricing_tier: &'static str,
    pub performance_class: &'static str,
    pub release_date: &'static str,
    pub context_window: u32,
    pub output_tokens: u32,
    pub description: &'static str,
}

/// Result of validating a requested model id.
#[derive(Debug, Clone, Serialize)]
pub struct ModelValidation {
    pub valid: bool,
    pub model: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Known ids ranked by edit distance to the requested id.
    pub suggestions: Vec<String>,
    pub alternative_models: Vec<String>,
}

const STANDARD_CAPS: ModelCapabilities = ModelCapabilities {
    streaming: true,
    function_calling: true,
    vision: true,
    json_mode: true,
    tools: true,
    reasoning_mode: false,
    code_execution: true,
    max_context_length: 200_000,
};

const REASONING_CAPS: ModelCapabilities = ModelCapabilities {
    reasoning_mode: true,
    ..STANDARD_CAPS
};

static DESCRIPTORS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "claude-opus-4-20250514",
        aliases: &["claude-opus-4", "opus"],
        capabilities: REASONING_CAPS,
        metadata: ModelMetadata {
            pricing_tier: "premium",
            performance_class: "flagship",
            release_date: "2025-05-14",
            context_window: 200_000,
            output_tokens: 32_000,
            description: "Most capable model for complex reasoning and coding",
        },
    },
    ModelDescriptor {
        id: "claude-sonnet-4-20250514",
        aliases: &["claude-sonnet-4", "sonnet"],
        capabilities: REASONING_CAPS,
        metadata: ModelMetadata {
            pricing_tier: "standard",
            performance_class: "balanced",
            release_date: "2025-05-14",
            context_window: 200_000,
            output_tokens: 64_000,
            description: "Balanced speed and intelligence for production workloads",
        },
    },
    ModelDescriptor {
        id: "claude-3-7-sonnet-20250219",
        aliases: &["claude-3-7-sonnet"],
        capabilities: REASONING_CAPS,
        metadata: ModelMetadata {
            pricing_tier: "standard",
            performance_class: "balanced",
            release_date: "2025-02-19",
            context_window: 200_000,
            output_tokens: 64_000,
            description: "Hybrid reasoning model with extended thinking",
        },
    },
    ModelDescriptor {
        id: "claude-3-5-sonnet-20241022",
        aliases: &["claude-3-5-sonnet"],
        capabilities: STANDARD_CAPS,
        metadata: ModelMetadata {
            pricing_tier: "standard",
            performance_class: "balanced",
            release_date: "2024-10-22",
            context_window: 200_000,
            output_tokens: 8_192,
            description: "Previous-generation balanced model",
        },
    },
    ModelDescriptor {
        id: "claude-3-5-haiku-20241022",
        aliases: &["claude-3-5-haiku", "haiku"],
        capabilities: ModelCapabilities {
            vision: false,
            max_context_length: 200_000,
            ..STANDARD_CAPS
        },
        metadata: ModelMetadata {
            pricing_tier: "economy",
            performance_class: "fast",
            release_date: "2024-10-22",
            context_window: 200_000,
            output_tokens: 8_192,
            description: "Fastest model for lightweight tasks",
        },
    },
    ModelDescriptor {
        id: "claude-3-opus-20240229",
        aliases: &["claude-3-opus"],
        capabilities: STANDARD_CAPS,
        metadata: ModelMetadata {
            pricing_tier: "premium",
            performance_class: "flagship",
            release_date: "2024-02-29",
            context_window: 200_000,
            output_tokens: 4_096,
            description: "Previous-generation flagship model",
        },
    },
];

/// Number of ranked suggestions returned for an unknown model.
const SUGGESTION_LIMIT: usize = 3;

pub struct ModelRegistry {
    by_id: HashMap<&'static str, &'static ModelDescriptor>,
    alias_to_id: HashMap<&'static str, &'static str>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        let mut by_id = HashMap::new();
        let mut alias_to_id = HashMap::new();
        for desc in DESCRIPTORS {
            by_id.insert(desc.id, desc);
            for alias in desc.aliases {
                alias_to_id.insert(*alias, desc.id);
            }
        }
        ModelRegistry { by_id, alias_to_id }
    }

    /// All descriptors, in registry order.
    pub fn list(&self) -> &'static [ModelDescriptor] {
        DESCRIPTORS
    }

    /// Look up a model by canonical id or alias.
    pub fn get(&self, id_or_alias: &str) -> Option<&'static ModelDescriptor> {
        if let Some(desc) = self.by_id.get(id_or_alias) {
            return Some(*desc);
        }
        self.alias_to_id
            .get(id_or_alias)
            .and_then(|id| self.by_id.get(id))
            .copied()
    }

    /// Resolve an alias to its canonical id. Known ids pass through.
    pub fn canonical_id(&self, id_or_alias: &str) -> Option<&'static str> {
        self.get(id_or_alias).map(|d| d.id)
    }

    pub fn contains(&self, id_or_alias: &str) -> bool {
        self.get(id_or_alias).is_some()
    }

    pub fn available_ids(&self) -> Vec<&'static str> {
        DESCRIPTORS.iter().map(|d| d.id).collect()
    }

    /// Validate a requested model id, producing ranked suggestions when it
    /// is unknown.
    pub fn validate(&self, model: &str) -> ModelValidation {
        if let Some(desc) = self.get(model) {
            let mut warnings = Vec::new();
            if desc.id != model {
                warnings.push(format!("'{model}' is an alias for '{}'", desc.id));
            }
            return ModelValidation {
                valid: true,
                model: desc.id.to_string(),
                errors: Vec::new(),
                warnings,
                suggestions: Vec::new(),
                alternative_models: Vec::new(),
            };
        }

        ModelValidation {
            valid: false,
            model: model.to_string(),
            errors: vec![format!("model '{model}' is not supported")],
            warnings: Vec::new(),
            suggestions: self.suggestions_for(model),
            alternative_models: self.available_ids().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Known ids ranked by Levenshtein distance to `model`, closest first.
    pub fn suggestions_for(&self, model: &str) -> Vec<String> {
        let mut ranked: Vec<(usize, &str)> = DESCRIPTORS
            .iter()
            .map(|d| (strsim::levenshtein(model, d.id), d.id))
            .collect();
        ranked.sort_by_key(|(dist, _)| *dist);
        ranked
            .into_iter()
            .take(SUGGESTION_LIMIT)
            .map(|(_, id)| id.to_string())
            .collect()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_id_validates() {
        let registry = ModelRegistry::new();
        for desc in registry.list() {
            let v = registry.validate(desc.id);
            assert!(v.valid, "{} should validate", desc.id);
            assert_eq!(v.model, desc.id);
        }
    }

    #[test]
    fn aliases_resolve_to_canonical_id() {
        let registry = ModelRegistry::new();
        assert_eq!(
            registry.canonical_id("sonnet"),
            Some("claude-sonnet-4-20250514")
        );
        assert_eq!(
            registry.canonical_id("claude-3-5-sonnet"),
            Some("claude-3-5-sonnet-20241022")
        );
        // Canonical ids pass through.
        assert_eq!(
            registry.canonical_id("claude-3-opus-20240229"),
            Some("claude-3-opus-20240229")
        );
    }

    #[test]
    fn alias_validation_warns() {
        let registry = ModelRegistry::new();
        let v = registry.validate("haiku");
        assert!(v.valid);
        assert_eq!(v.model, "claude-3-5-haiku-20241022");
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn unknown_model_gets_ranked_suggestions() {
        let registry = ModelRegistry::new();
        let v = registry.validate("gpt-4");
        assert!(!v.valid);
        assert!(!v.errors.is_empty());
        assert!(!v.suggestions.is_empty());
        assert_eq!(v.alternative_models.len(), registry.list().len());
    }

    #[test]
    fn near_miss_suggests_closest_id() {
        let registry = ModelRegistry::new();
        let suggestions = registry.suggestions_for("claude-3-5-sonnet-20241023");
        assert_eq!(suggestions[0], "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn lookup_is_case_sensitive_and_total() {
        let registry = ModelRegistry::new();
        assert!(registry.get("Claude-3-5-Sonnet").is_none());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn capabilities_are_plausible() {
        let registry = ModelRegistry::new();
        let opus = registry.get("opus").unwrap();
        assert!(opus.capabilities.streaming);
        assert!(opus.capabilities.reasoning_mode);
        assert_eq!(opus.capabilities.max_context_length, 200_000);
        let haiku = registry.get("haiku").unwrap();
        assert!(!haiku.capabilities.vision);
    }
}
