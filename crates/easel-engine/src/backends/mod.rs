mod local;
mod openai;
mod replicate;
mod stability;

use easel_contracts::providers::{ProviderDescriptor, ProviderKind};
use easel_contracts::request::{Capability, GenerationRequest, ImageSize};
use easel_contracts::{EaselError, Result};

use crate::codec::EnvelopeKind;
use crate::http::WireRequest;

pub use local::LocalBackend;
pub use openai::OpenAiBackend;
pub use replicate::{replicate_version, ReplicateBackend};
pub use stability::StabilityBackend;

/// Prompt sent in place of the user's for providers that emulate variations
/// through low-strength img2img.
pub const VARIATION_PROMPT: &str = "same image with slight variations";
pub const VARIATION_STRENGTH: f64 = 0.3;

/// Per-call values a builder needs besides the request itself.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub descriptor: &'static ProviderDescriptor,
    pub credential: Option<&'a str>,
    /// Model id already checked against the descriptor.
    pub model: &'a str,
    pub size: ImageSize,
    pub local_endpoint: Option<&'a str>,
}

impl CallContext<'_> {
    fn authorize(&self, request: WireRequest) -> WireRequest {
        match self
            .credential
            .and_then(|credential| self.descriptor.auth.header_value(credential))
        {
            Some(value) => request.header("Authorization", value),
            None => request,
        }
    }
}

/// Wire request plus the schema its reply is decoded with.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub request: WireRequest,
    pub envelope: EnvelopeKind,
}

pub trait TextToImage {
    fn build_generate(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
    ) -> Result<PreparedCall>;
}

pub trait InpaintEdit {
    fn build_edit(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
        mask: &[u8],
    ) -> Result<PreparedCall>;
}

pub trait ImageVariation {
    fn build_variation(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
    ) -> Result<PreparedCall>;
}

pub trait ImageToImage {
    fn build_img2img(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
    ) -> Result<PreparedCall>;
}

/// Request builders for one provider family. Optional capabilities are
/// `None` when the provider has no route for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenAi(OpenAiBackend),
    Stability(StabilityBackend),
    Replicate(ReplicateBackend),
    Local(LocalBackend),
}

impl Backend {
    pub fn for_provider(descriptor: &ProviderDescriptor) -> Self {
        match descriptor.kind {
            ProviderKind::OpenAi => Self::OpenAi(OpenAiBackend),
            ProviderKind::Stability => Self::Stability(StabilityBackend),
            ProviderKind::Replicate => Self::Replicate(ReplicateBackend),
            ProviderKind::Local => Self::Local(LocalBackend),
        }
    }

    pub fn generator(&self) -> &dyn TextToImage {
        match self {
            Self::OpenAi(backend) => backend,
            Self::Stability(backend) => backend,
            Self::Replicate(backend) => backend,
            Self::Local(backend) => backend,
        }
    }

    pub fn editor(&self) -> Option<&dyn InpaintEdit> {
        match self {
            Self::OpenAi(backend) => Some(backend),
            Self::Stability(backend) => Some(backend),
            Self::Replicate(_) => None,
            Self::Local(backend) => Some(backend),
        }
    }

    pub fn variator(&self) -> Option<&dyn ImageVariation> {
        match self {
            Self::OpenAi(backend) => Some(backend),
            Self::Stability(backend) => Some(backend),
            Self::Replicate(backend) => Some(backend),
            Self::Local(backend) => Some(backend),
        }
    }

    pub fn transformer(&self) -> Option<&dyn ImageToImage> {
        match self {
            Self::OpenAi(_) => None,
            Self::Stability(backend) => Some(backend),
            Self::Replicate(backend) => Some(backend),
            Self::Local(backend) => Some(backend),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Generate => true,
            Capability::Edit => self.editor().is_some(),
            Capability::Variation => self.variator().is_some(),
            Capability::Img2Img => self.transformer().is_some(),
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| self.supports(*capability))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai",
            Self::Stability(_) => "stability",
            Self::Replicate(_) => "replicate",
            Self::Local(_) => "local",
        }
    }

    pub fn unsupported(&self, capability: Capability) -> EaselError {
        EaselError::Unsupported {
            provider: self.name().to_string(),
            capability,
        }
    }
}

/// Decimal form used in form fields: fixed precision with trailing zeros
/// removed.
pub(crate) fn trim_float(value: f64) -> String {
    let mut text = format!("{value:.6}");
    while text.contains('.') && text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    text
}


#[cfg(test)]
mod tests {
    use easel_contracts::providers::PROVIDERS;

    use super::*;

    #[test]
    fn capability_table_matches_provider_routes() {
        let expected = [
            ("openai", vec![Capability::Generate, Capability::Edit, Capability::Variation]),
            ("stability", Capability::ALL.to_vec()),
            (
                "replicate",
                vec![Capability::Generate, Capability::Variation, Capability::Img2Img],
            ),
            ("local", Capability::ALL.to_vec()),
        ];
        for (name, capabilities) in expected {
            let descriptor = PROVIDERS.iter().find(|item| item.name == name).unwrap();
            let backend = Backend::for_provider(descriptor);
            assert_eq!(backend.name(), name);
            assert_eq!(backend.capabilities(), capabilities, "{name}");
            for capability in Capability::ALL {
                assert_eq!(
                    backend.supports(capability),
                    descriptor.endpoint_template(capability).is_some(),
                    "{name} {capability}"
                );
            }
        }
    }

    #[test]
    fn trim_float_drops_trailing_zeros() {
        assert_eq!(trim_float(7.0), "7");
        assert_eq!(trim_float(0.25), "0.25");
        assert_eq!(trim_float(1.0 - 0.3), "0.7");
    }
}
