use easel_contracts::providers::endpoint;
use easel_contracts::request::{Capability, GenerationRequest};
use easel_contracts::Result;
use serde_json::{json, Map, Value};

use super::{
    trim_float, CallContext, ImageToImage, ImageVariation, InpaintEdit, PreparedCall,
    TextToImage, VARIATION_PROMPT, VARIATION_STRENGTH,
};
use crate::codec::EnvelopeKind;
use crate::http::WireRequest;
use crate::multipart::MultipartBuilder;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StabilityBackend;

impl StabilityBackend {
    fn finish(call: &CallContext<'_>, request: WireRequest) -> PreparedCall {
        PreparedCall {
            request: call.authorize(request.header("Accept", "application/json")),
            envelope: EnvelopeKind::StabilityArtifacts,
        }
    }

    fn image_to_image(
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
        prompt: &str,
        strength: f64,
        operation: Capability,
    ) -> Result<PreparedCall> {
        let url = endpoint(call.descriptor, operation, call.model)?;
        let mut body = MultipartBuilder::new()
            .file("init_image", "image.png", "image/png", image.to_vec())
            .text("init_image_mode", "IMAGE_STRENGTH")
            .text("image_strength", trim_float(1.0 - strength.clamp(0.0, 1.0)))
            .text("text_prompts[0][text]", prompt)
            .text("text_prompts[0][weight]", "1.0");
        let negative = request.negative_prompt.trim();
        if !negative.is_empty() {
            body = body
                .text("text_prompts[1][text]", negative)
                .text("text_prompts[1][weight]", "-1.0");
        }
        body = body
            .text("cfg_scale", trim_float(request.guidance_scale))
            .text("steps", request.steps.to_string());
        if let Some(seed) = request.seed() {
            body = body.text("seed", seed.to_string());
        }
        Ok(Self::finish(
            call,
            WireRequest::post_multipart(url, body.build()),
        ))
    }
}

impl TextToImage for StabilityBackend {
    fn build_generate(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
    ) -> Result<PreparedCall> {
        let url = endpoint(call.descriptor, Capability::Generate, call.model)?;
        let mut text_prompts = vec![json!({"text": request.prompt, "weight": 1.0})];
        let negative = request.negative_prompt.trim();
        if !negative.is_empty() {
            text_prompts.push(json!({"text": negative, "weight": -1.0}));
        }
        let mut payload = Map::new();
        payload.insert("text_prompts".to_string(), Value::Array(text_prompts));
        payload.insert("cfg_scale".to_string(), json!(request.guidance_scale));
        payload.insert("steps".to_string(), json!(request.steps));
        payload.insert("width".to_string(), json!(call.size.width));
        payload.insert("height".to_string(), json!(call.size.height));
        payload.insert("samples".to_string(), json!(1));
        if let Some(seed) = request.seed() {
            payload.insert("seed".to_string(), json!(seed));
        }
        Ok(Self::finish(
            call,
            WireRequest::post_json(url, Value::Object(payload)),
        ))
    }
}

impl InpaintEdit for StabilityBackend {
    fn build_edit(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
        mask: &[u8],
    ) -> Result<PreparedCall> {
        let url = endpoint(call.descriptor, Capability::Edit, call.model)?;
        let body = MultipartBuilder::new()
            .file("init_image", "image.png", "image/png", image.to_vec())
            .file("mask_image", "mask.png", "image/png", mask.to_vec())
            .text("text_prompts[0][text]", request.edit_instruction.clone())
            .text("text_prompts[0][weight]", "1.0")
            .build();
        Ok(Self::finish(call, WireRequest::post_multipart(url, body)))
    }
}

impl ImageToImage for StabilityBackend {
    fn build_img2img(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
    ) -> Result<PreparedCall> {
        Self::image_to_image(
            call,
            request,
            image,
            &request.prompt,
            request.strength,
            Capability::Img2Img,
        )
    }
}

impl ImageVariation for StabilityBackend {
    fn build_variation(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
    ) -> Result<PreparedCall> {
        Self::image_to_image(
            call,
            request,
            image,
            VARIATION_PROMPT,
            VARIATION_STRENGTH,
            Capability::Variation,
        )
    }
}
