mod catalog;

use crate::error::{EaselError, Result};
use crate::request::{Capability, ImageSize};

pub use catalog::PROVIDERS;

pub const ENGINE_PLACEHOLDER: &str = "{engine}";
pub const PREDICTION_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Stability,
    Replicate,
    Local,
}

/// How the credential travels in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    Bearer,
    Token,
    None,
}

impl AuthStyle {
    pub fn header_value(&self, credential: &str) -> Option<String> {
        match self {
            Self::Bearer => Some(format!("Bearer {credential}")),
            Self::Token => Some(format!("Token {credential}")),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub generate: &'static str,
    pub edit: Option<&'static str>,
    pub variation: Option<&'static str>,
    pub img2img: Option<&'static str>,
    pub status: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub name: &'static str,
    pub display_name: &'static str,
    pub endpoints: Endpoints,
    pub auth: AuthStyle,
    pub env_key: Option<&'static str>,
    pub config_key: Option<&'static str>,
    pub models: &'static [&'static str],
    pub sizes: &'static [ImageSize],
}

impl ProviderDescriptor {
    pub fn requires_credential(&self) -> bool {
        self.auth != AuthStyle::None
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|item| *item == model)
    }

    pub fn default_model(&self) -> &'static str {
        self.models.first().copied().unwrap_or_default()
    }

    pub fn supports_size(&self, size: ImageSize) -> bool {
        self.sizes.contains(&size)
    }

    pub fn default_size(&self) -> ImageSize {
        self.sizes.first().copied().unwrap_or(ImageSize::square(1024))
    }

    /// Sizes outside the allowed set are replaced by the provider default.
    pub fn clamp_size(&self, requested: ImageSize) -> ImageSize {
        if self.supports_size(requested) {
            return requested;
        }
        let fallback = self.default_size();
        tracing::warn!(
            provider = self.name,
            requested = %requested,
            fallback = %fallback,
            "size not offered by provider; using fallback"
        );
        fallback
    }

    pub fn endpoint_template(&self, operation: Capability) -> Option<&'static str> {
        match operation {
            Capability::Generate => Some(self.endpoints.generate),
            Capability::Edit => self.endpoints.edit,
            Capability::Variation => self.endpoints.variation,
            Capability::Img2Img => self.endpoints.img2img,
        }
    }
}

/// Builds the concrete URL for an operation, substituting the model engine
/// into templated endpoints.
pub fn endpoint(
    descriptor: &ProviderDescriptor,
    operation: Capability,
    model_engine: &str,
) -> Result<String> {
    let template =
        descriptor
            .endpoint_template(operation)
            .ok_or_else(|| EaselError::Unsupported {
                provider: descriptor.name.to_string(),
                capability: operation,
            })?;
    if !template.contains(ENGINE_PLACEHOLDER) {
        return Ok(template.to_string());
    }
    let engine = model_engine.trim();
    let engine = if engine.is_empty() {
        descriptor.default_model()
    } else {
        engine
    };
    Ok(template.replace(ENGINE_PLACEHOLDER, engine))
}

pub fn status_endpoint(descriptor: &ProviderDescriptor, prediction_id: &str) -> Result<String> {
    let template = descriptor.endpoints.status.ok_or_else(|| {
        EaselError::Decode(format!(
            "provider {} has no status endpoint",
            descriptor.name
        ))
    })?;
    Ok(template.replace(PREDICTION_PLACEHOLDER, prediction_id))
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderRegistry {
    providers: &'static [ProviderDescriptor],
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(&PROVIDERS)
    }
}

impl ProviderRegistry {
    pub fn new(providers: &'static [ProviderDescriptor]) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&'static ProviderDescriptor> {
        let wanted = name.trim().to_ascii_lowercase();
        self.providers
            .iter()
            .find(|provider| provider.name == wanted)
    }

    pub fn resolve(&self, name: &str) -> Result<&'static ProviderDescriptor> {
        self.get(name)
            .ok_or_else(|| EaselError::UnknownProvider(name.trim().to_string()))
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name.to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &'static [ProviderDescriptor] {
        self.providers
    }
}

pub fn resolve(name: &str) -> Result<&'static ProviderDescriptor> {
    ProviderRegistry::default().resolve(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_finds_known_providers_case_insensitively() {
        assert_eq!(resolve("OpenAI").unwrap().kind, ProviderKind::OpenAi);
        assert_eq!(resolve(" local ").unwrap().kind, ProviderKind::Local);
        let err = resolve("midjourney").unwrap_err();
        assert!(matches!(err, EaselError::UnknownProvider(name) if name == "midjourney"));
    }

    #[test]
    fn registry_lists_sorted_names_and_keeps_table_order() {
        let registry = ProviderRegistry::default();
        assert_eq!(
            registry.list(),
            vec!["local", "openai", "replicate", "stability"]
        );
        assert_eq!(registry.providers()[0].name, "openai");
    }

    #[test]
    fn endpoint_substitutes_engine_placeholder() {
        let stability = resolve("stability").unwrap();
        assert_eq!(
            endpoint(stability, Capability::Generate, "stable-diffusion-v1-6").unwrap(),
            "https://api.stability.ai/v1/generation/stable-diffusion-v1-6/text-to-image"
        );
        assert_eq!(
            endpoint(stability, Capability::Img2Img, "").unwrap(),
            "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v1-0/image-to-image"
        );
    }

    #[test]
    fn endpoint_rejects_capabilities_without_a_route() {
        let openai = resolve("openai").unwrap();
        let err = endpoint(openai, Capability::Img2Img, "dall-e-3").unwrap_err();
        assert!(matches!(
            err,
            EaselError::Unsupported {
                capability: Capability::Img2Img,
                ..
            }
        ));
        let replicate = resolve("replicate").unwrap();
        assert!(endpoint(replicate, Capability::Edit, "").is_err());
    }

    #[test]
    fn status_endpoint_only_exists_for_async_provider() {
        let replicate = resolve("replicate").unwrap();
        assert_eq!(
            status_endpoint(replicate, "abc123").unwrap(),
            "https://api.replicate.com/v1/predictions/abc123"
        );
        assert!(status_endpoint(resolve("openai").unwrap(), "abc").is_err());
    }

    #[test]
    fn clamp_size_keeps_allowed_and_replaces_unknown_sizes() {
        for provider in PROVIDERS.iter() {
            for size in provider.sizes {
                assert_eq!(provider.clamp_size(*size), *size);
            }
            let clamped = provider.clamp_size(ImageSize::new(333, 777));
            assert!(provider.supports_size(clamped), "{}", provider.name);
            assert_eq!(clamped, provider.default_size());
        }
    }

    #[test]
    fn local_provider_needs_no_credential() {
        let local = resolve("local").unwrap();
        assert!(!local.requires_credential());
        assert_eq!(local.env_key, None);
        assert!(resolve("replicate").unwrap().requires_credential());
        assert_eq!(
            AuthStyle::Token.header_value("r8_x").as_deref(),
            Some("Token r8_x")
        );
        assert_eq!(AuthStyle::None.header_value("ignored"), None);
    }
}
