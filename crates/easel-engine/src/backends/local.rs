use easel_contracts::providers::endpoint;
use easel_contracts::request::{Capability, GenerationRequest};
use easel_contracts::Result;
use serde_json::{json, Map, Value};

use super::{
    CallContext, ImageToImage, ImageVariation, InpaintEdit, PreparedCall, TextToImage,
    VARIATION_PROMPT, VARIATION_STRENGTH,
};
use crate::codec::{encode_base64, EnvelopeKind};
use crate::http::WireRequest;

const SAMPLER: &str = "DPM++ 2M Karras";
const API_MARKER: &str = "/sdapi/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalBackend;

impl LocalBackend {
    /// A custom endpoint that already names an API route is used as is;
    /// otherwise it replaces the scheme and host of the default route.
    fn url(call: &CallContext<'_>, operation: Capability) -> Result<String> {
        let default_url = endpoint(call.descriptor, operation, call.model)?;
        let Some(custom) = call
            .local_endpoint
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return Ok(default_url);
        };
        if custom.contains(API_MARKER) {
            return Ok(custom.to_string());
        }
        let path = default_url
            .find(API_MARKER)
            .map(|index| &default_url[index..])
            .unwrap_or_default();
        Ok(format!("{}{path}", custom.trim_end_matches('/')))
    }

    fn post(call: &CallContext<'_>, url: String, payload: Map<String, Value>) -> PreparedCall {
        PreparedCall {
            request: call.authorize(WireRequest::post_json(url, Value::Object(payload))),
            envelope: EnvelopeKind::LocalImages,
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
        let url = Self::url(call, operation)?;
        let mut payload = Map::new();
        payload.insert("init_images".to_string(), json!([encode_base64(image)]));
        payload.insert("prompt".to_string(), json!(prompt));
        payload.insert(
            "negative_prompt".to_string(),
            json!(request.negative_prompt),
        );
        payload.insert("denoising_strength".to_string(), json!(strength));
        payload.insert("width".to_string(), json!(call.size.width));
        payload.insert("height".to_string(), json!(call.size.height));
        payload.insert("steps".to_string(), json!(request.steps));
        payload.insert("cfg_scale".to_string(), json!(request.guidance_scale));
        if let Some(seed) = request.seed() {
            payload.insert("seed".to_string(), json!(seed));
        }
        Ok(Self::post(call, url, payload))
    }
}

impl TextToImage for LocalBackend {
    fn build_generate(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
    ) -> Result<PreparedCall> {
        let url = Self::url(call, Capability::Generate)?;
        let mut payload = Map::new();
        payload.insert("prompt".to_string(), json!(request.prompt));
        payload.insert(
            "negative_prompt".to_string(),
            json!(request.negative_prompt),
        );
        payload.insert("width".to_string(), json!(call.size.width));
        payload.insert("height".to_string(), json!(call.size.height));
        payload.insert("steps".to_string(), json!(request.steps));
        payload.insert("cfg_scale".to_string(), json!(request.guidance_scale));
        payload.insert("sampler_name".to_string(), json!(SAMPLER));
        payload.insert("batch_size".to_string(), json!(1));
        if let Some(seed) = request.seed() {
            payload.insert("seed".to_string(), json!(seed));
        }
        Ok(Self::post(call, url, payload))
    }
}

impl InpaintEdit for LocalBackend {
    fn build_edit(
        &self,
        call: &CallContext<'_>,
        request: &GenerationRequest,
        image: &[u8],
        mask: &[u8],
    ) -> Result<PreparedCall> {
        let url = Self::url(call, Capability::Edit)?;
        let mut payload = Map::new();
        payload.insert("init_images".to_string(), json!([encode_base64(image)]));
        payload.insert("mask".to_string(), json!(encode_base64(mask)));
        payload.insert("prompt".to_string(), json!(request.edit_instruction));
        payload.insert(
            "negative_prompt".to_string(),
            json!(request.negative_prompt),
        );
        payload.insert("denoising_strength".to_string(), json!(request.strength));
        payload.insert("steps".to_string(), json!(request.steps));
        payload.insert("cfg_scale".to_string(), json!(request.guidance_scale));
        payload.insert("inpainting_fill".to_string(), json!(1));
        payload.insert("inpaint_full_res".to_string(), json!(true));
        if let Some(seed) = request.seed() {
            payload.insert("seed".to_string(), json!(seed));
        }
        Ok(Self::post(call, url, payload))
    }
}

impl ImageToImage for LocalBackend {
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

impl ImageVariation for LocalBackend {
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
