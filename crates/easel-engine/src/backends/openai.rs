use easel_contracts::providers::endpoint;
use easel_contracts::request::{Capability, GenerationRequest, ImageSize, SQUARE_EDGES};
use easel_contracts::Result;
use serde_json::{json, Map, Value};

use super::{CallContext, ImageVariation, InpaintEdit, PreparedCall, TextToImage};
use crate::codec::EnvelopeKind;
use crate::http::WireRequest;
use crate::multipart::MultipartBuilder;

/// Edits and variations always run on this model.
const IMAGE_INPUT_MODEL: &str = "dall-e-2";
const QUALITY_STYLE_MODEL: &str = "dall-e-3";
const URL_ONLY_MODEL: &str = "gpt-image-1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenAiBackend;

/// The images API has no negative prompt; the text is appended to the prompt
/// as an "Avoid:" clause instead. Providers treat it as a hint, not a
/// constraint.
pub fn fold_negative_prompt(prompt: &str, negative_prompt: &str) -> String {
    let negative = negative_prompt.trim();
    if negative.is_empty() {
        return prompt.to_string();
    }
    tracing::debug!("folding negative prompt into prompt text");
    format!("{prompt}. Avoid: {negative}")
}

/// Edit and variation only accept the square sizes.
fn square_size(size: ImageSize) -> ImageSize {
    if size.is_square() && SQUARE_EDGES.contains(&size.width) {
        size
    } else {
        ImageSize::square(1024)
    }
}

impl TextToImage for OpenAiBackend {
    fn build_generate(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
    ) -> Result<PreparedCall> {
        let url = endpoint(call.descriptor, Capability::Generate, call.model)?;
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(call.model));
        payload.insert(
            "prompt".to_string(),
            json!(fold_negative_prompt(&request.prompt, &request.negative_prompt)),
        );
        payload.insert("n".to_string(), json!(1));
        payload.insert("size".to_string(), json!(call.size.to_string()));
        if call.model != URL_ONLY_MODEL {
            payload.insert("response_format".to_string(), json!("b64_json"));
        }
        if call.model == QUALITY_STYLE_MODEL {
            payload.insert("quality".to_string(), json!(request.quality));
            payload.insert("style".to_string(), json!(request.style));
        }
        Ok(PreparedCall {
            request: call.authorize(WireRequest::post_json(url, Value::Object(payload))),
            envelope: EnvelopeKind::OpenAiData,
        })
    }
}

impl InpaintEdit for OpenAiBackend {
    fn build_edit(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
        mask: &[u8],
    ) -> Result<PreparedCall> {
        let url = endpoint(call.descriptor, Capability::Edit, call.model)?;
        let body = MultipartBuilder::new()
            .file("image", "image.png", "image/png", image.to_vec())
            .file("mask", "mask.png", "image/png", mask.to_vec())
            .text("prompt", request.edit_instruction.clone())
            .text("model", IMAGE_INPUT_MODEL)
            .text("size", square_size(call.size).to_string())
            .text("response_format", "b64_json")
            .build();
        Ok(PreparedCall {
            request: call.authorize(WireRequest::post_multipart(url, body)),
            envelope: EnvelopeKind::OpenAiData,
        })
    }
}

impl ImageVariation for OpenAiBackend {
    fn build_variation(
        &self,
        call: &CallContext<'_>,
        _request: &GenerationRequest,
        image: &[u8],
    ) -> Result<PreparedCall> {
        let url = endpoint(call.descriptor, Capability::Variation, call.model)?;
        let body = MultipartBuilder::new()
            .file("image", "image.png", "image/png", image.to_vec())
            .text("model", IMAGE_INPUT_MODEL)
            .text("size", square_size(call.size).to_string())
            .text("response_format", "b64_json")
            .build();
        Ok(PreparedCall {
            request: call.authorize(WireRequest::post_multipart(url, body)),
            envelope: EnvelopeKind::OpenAiData,
        })
    }
}
