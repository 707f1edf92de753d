use easel_contracts::providers::endpoint;
use easel_contracts::request::{Capability, GenerationRequest};
use easel_contracts::Result;
use serde_json::{json, Map, Value};

use super::{
    CallContext, ImageToImage, ImageVariation, PreparedCall, TextToImage, VARIATION_PROMPT,
    VARIATION_STRENGTH,
};
use crate::codec::{png_data_uri, EnvelopeKind};
use crate::http::WireRequest;

const DEFAULT_MODEL: &str = "stability-ai/sdxl";

const MODEL_VERSIONS: [(&str, &str); 3] = [
    (
        DEFAULT_MODEL,
        "da77bc59ee60423279fd632efb4795ab731d9e3ca9705ef3341091fb989b7eaf",
    ),
    (
        "black-forest-labs/flux-schnell",
        "f2ab8a5bfe79f02f0789a146cf5e73d2a4ff2684a98c2b303d1e1ff3814271db",
    ),
    (
        "black-forest-labs/flux-pro",
        "4f6c0f2a74f7f5e43c6e2e3e3f0e8b6d2a4c8f0e2b4a6c8d0e2f4a6b8c0d2e4f6",
    ),
];

/// Pinned version hash for a model id; unknown ids use the SDXL version.
pub fn replicate_version(model: &str) -> &'static str {
    let lookup = |wanted: &str| {
        MODEL_VERSIONS
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, version)| *version)
    };
    lookup(model.trim())
        .or_else(|| lookup(DEFAULT_MODEL))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicateBackend;

impl ReplicateBackend {
    fn prediction(
        call: &CallContext<'_>,
        request: &GenerationRequest,
        operation: Capability,
        prompt: &str,
        image: Option<(&[u8], f64)>,
    ) -> Result<PreparedCall> {
        let url = endpoint(call.descriptor, operation, call.model)?;
        let mut input = Map::new();
        input.insert("prompt".to_string(), json!(prompt));
        input.insert("width".to_string(), json!(call.size.width));
        input.insert("height".to_string(), json!(call.size.height));
        let negative = request.negative_prompt.trim();
        if !negative.is_empty() {
            input.insert("negative_prompt".to_string(), json!(negative));
        }
        if let Some(seed) = request.seed() {
            input.insert("seed".to_string(), json!(seed));
        }
        if let Some((bytes, strength)) = image {
            input.insert("image".to_string(), json!(png_data_uri(bytes)));
            input.insert("prompt_strength".to_string(), json!(strength));
        }
        let payload = json!({
            "version": replicate_version(call.model),
            "input": Value::Object(input),
        });
        Ok(PreparedCall {
            request: call.authorize(WireRequest::post_json(url, payload)),
            envelope: EnvelopeKind::Prediction,
        })
    }
}

impl TextToImage for ReplicateBackend {
    fn build_generate(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
    ) -> Result<PreparedCall> {
        Self::prediction(call, request, Capability::Generate, &request.prompt, None)
    }
}

impl ImageToImage for ReplicateBackend {
    fn build_img2img(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
    ) -> Result<PreparedCall> {
        Self::prediction(
            call,
            request,
            Capability::Img2Img,
            &request.prompt,
            Some((image, request.strength)),
        )
    }
}

impl ImageVariation for ReplicateBackend {
    fn build_variation(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
    ) -> Result<PreparedCall> {
        Self::prediction(
            call,
            request,
            Capability::Variation,
            VARIATION_PROMPT,
            Some((image, VARIATION_STRENGTH)),
        )
    }
}
