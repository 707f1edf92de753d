use crate::request::ImageSize;

use super::{AuthStyle, Endpoints, ProviderDescriptor, ProviderKind};

const STABILITY_TEXT_TO_IMAGE: &str =
    "https://api.stability.ai/v1/generation/{engine}/text-to-image";
const STABILITY_IMAGE_TO_IMAGE: &str =
    "https://api.stability.ai/v1/generation/{engine}/image-to-image";
const REPLICATE_PREDICTIONS: &str = "https://api.replicate.com/v1/predictions";
const LOCAL_IMG2IMG: &str = "http://127.0.0.1:7860/sdapi/v1/img2img";

pub static PROVIDERS: [ProviderDescriptor; 4] = [
    ProviderDescriptor {
        kind: ProviderKind::OpenAi,
        name: "openai",
        display_name: "OpenAI DALL-E",
        endpoints: Endpoints {
            generate: "https://api.openai.com/v1/images/generations",
            edit: Some("https://api.openai.com/v1/images/edits"),
            variation: Some("https://api.openai.com/v1/images/variations"),
            img2img: None,
            status: None,
        },
        auth: AuthStyle::Bearer,
        env_key: Some("OPENAI_API_KEY"),
        config_key: Some("openai_api_key"),
        models: &["dall-e-3", "dall-e-2", "gpt-image-1"],
        sizes: &[
            ImageSize::new(1024, 1024),
            ImageSize::new(1024, 1792),
            ImageSize::new(1792, 1024),
            ImageSize::new(512, 512),
            ImageSize::new(256, 256),
        ],
    },
    ProviderDescriptor {
        kind: ProviderKind::Stability,
        name: "stability",
        display_name: "Stability AI",
        endpoints: Endpoints {
            generate: STABILITY_TEXT_TO_IMAGE,
            edit: Some(
                "https://api.stability.ai/v1/generation/stable-inpainting-512-v2-0/image-to-image/masking",
            ),
            variation: Some(STABILITY_IMAGE_TO_IMAGE),
            img2img: Some(STABILITY_IMAGE_TO_IMAGE),
            status: None,
        },
        auth: AuthStyle::Bearer,
        env_key: Some("STABILITY_API_KEY"),
        config_key: Some("stability_api_key"),
        models: &[
            "stable-diffusion-xl-1024-v1-0",
            "stable-diffusion-v1-6",
            "stable-diffusion-xl-beta-v2-2-2",
        ],
        sizes: &[
            ImageSize::new(1024, 1024),
            ImageSize::new(1152, 896),
            ImageSize::new(896, 1152),
            ImageSize::new(1216, 832),
            ImageSize::new(832, 1216),
            ImageSize::new(512, 512),
        ],
    },
    ProviderDescriptor {
        kind: ProviderKind::Replicate,
        name: "replicate",
        display_name: "Replicate",
        endpoints: Endpoints {
            generate: REPLICATE_PREDICTIONS,
            edit: None,
            variation: Some(REPLICATE_PREDICTIONS),
            img2img: Some(REPLICATE_PREDICTIONS),
            status: Some("https://api.replicate.com/v1/predictions/{id}"),
        },
        auth: AuthStyle::Token,
        env_key: Some("REPLICATE_API_TOKEN"),
        config_key: Some("replicate_api_key"),
        models: &[
            "stability-ai/sdxl",
            "black-forest-labs/flux-schnell",
            "black-forest-labs/flux-pro",
        ],
        sizes: &[
            ImageSize::new(1024, 1024),
            ImageSize::new(1024, 768),
            ImageSize::new(768, 1024),
            ImageSize::new(512, 512),
        ],
    },
    ProviderDescriptor {
        kind: ProviderKind::Local,
        name: "local",
        display_name: "Local (Automatic1111/ComfyUI)",
        endpoints: Endpoints {
            generate: "http://127.0.0.1:7860/sdapi/v1/txt2img",
            edit: Some(LOCAL_IMG2IMG),
            variation: Some(LOCAL_IMG2IMG),
            img2img: Some(LOCAL_IMG2IMG),
            status: None,
        },
        auth: AuthStyle::None,
        env_key: None,
        config_key: None,
        models: &["default"],
        sizes: &[
            ImageSize::new(1024, 1024),
            ImageSize::new(768, 768),
            ImageSize::new(512, 512),
            ImageSize::new(768, 512),
            ImageSize::new(512, 768),
        ],
    },
];
