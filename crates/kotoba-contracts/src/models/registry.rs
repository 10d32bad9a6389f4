use indexmap::IndexMap;

pub const CAPABILITY_TEXT: &str = "text";
pub const CAPABILITY_VISION: &str = "vision";
pub const CAPABILITY_IMAGE: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
    pub deprecated: bool,
    pub replacement: Option<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    /// Live (non-deprecated) models for a capability, in catalog order.
    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| !model.deprecated && model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) && !model.deprecated {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str,
                      provider: &str,
                      capabilities: &[&str],
                      context_window: Option<u64>,
                      replacement: Option<&str>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                context_window,
                deprecated: replacement.is_some(),
                replacement: replacement.map(str::to_string),
            },
        );
    };

    insert(
        "gemini-2.5-flash",
        "gemini",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
        Some(1_048_576),
        None,
    );
    insert(
        "gemini-2.0-flash",
        "gemini",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
        Some(1_048_576),
        None,
    );
    insert(
        "gemini-2.5-pro",
        "gemini",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
        Some(1_048_576),
        None,
    );
    insert(
        "gemini-2.0-flash-lite",
        "gemini",
        &[CAPABILITY_TEXT],
        Some(1_048_576),
        None,
    );
    insert(
        "gemini-2.5-flash-image",
        "gemini",
        &[CAPABILITY_IMAGE],
        None,
        None,
    );
    insert(
        "gemini-2.0-flash-preview-image-generation",
        "gemini",
        &[CAPABILITY_IMAGE],
        None,
        None,
    );
    insert(
        "gemini-1.5-flash",
        "gemini",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
        Some(1_048_576),
        Some("gemini-2.0-flash"),
    );
    insert(
        "gemini-1.5-pro",
        "gemini",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
        Some(2_097_152),
        Some("gemini-2.5-pro"),
    );
    insert(
        "gemini-pro-vision",
        "gemini",
        &[CAPABILITY_VISION],
        None,
        Some("gemini-2.5-flash"),
    );
    insert(
        "dryrun-text-1",
        "dryrun",
        &[CAPABILITY_TEXT, CAPABILITY_VISION],
        Some(8192),
        None,
    );
    insert(
        "dryrun-image-1",
        "dryrun",
        &[CAPABILITY_IMAGE],
        None,
        None,
    );

    map
}

#[cfg(test)]
mod tests {
    use super::{ModelRegistry, CAPABILITY_IMAGE, CAPABILITY_VISION};

    #[test]
    fn deprecated_models_are_listed_but_not_offered() {
        let registry = ModelRegistry::default();
        let legacy = registry.get("gemini-1.5-flash").unwrap();
        assert!(legacy.deprecated);
        assert_eq!(legacy.replacement.as_deref(), Some("gemini-2.0-flash"));
        assert!(registry.ensure("gemini-1.5-flash", CAPABILITY_VISION).is_none());
        assert!(registry
            .by_capability(CAPABILITY_VISION)
            .iter()
            .all(|model| !model.deprecated));
    }

    #[test]
    fn image_capability_is_separate_from_vision() {
        let registry = ModelRegistry::default();
        let image_models = registry.by_capability(CAPABILITY_IMAGE);
        assert_eq!(image_models[0].name, "gemini-2.5-flash-image");
        assert!(registry.ensure("gemini-2.5-flash-image", CAPABILITY_VISION).is_none());
    }
}
