use std::str::FromStr;

use crate::error::EaselError;
use crate::request::GenerationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Photorealistic,
    Artistic,
    QuickDraft,
    HighQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetValues {
    pub style: &'static str,
    pub quality: &'static str,
    pub negative_prompt: &'static str,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Photorealistic,
        Preset::Artistic,
        Preset::QuickDraft,
        Preset::HighQuality,
    ];

    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "photorealistic" => Some(Self::Photorealistic),
            "artistic" => Some(Self::Artistic),
            "quick_draft" => Some(Self::QuickDraft),
            "high_quality" => Some(Self::HighQuality),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Photorealistic => "photorealistic",
            Self::Artistic => "artistic",
            Self::QuickDraft => "quick_draft",
            Self::HighQuality => "high_quality",
        }
    }

    pub fn values(&self) -> PresetValues {
        match self {
            Self::Photorealistic => PresetValues {
                style: "natural",
                quality: "hd",
                negative_prompt: "cartoon, illustration, painting, drawing, art, anime",
            },
            Self::Artistic => PresetValues {
                style: "vivid",
                quality: "hd",
                negative_prompt: "photo, realistic, photograph",
            },
            Self::QuickDraft => PresetValues {
                style: "natural",
                quality: "standard",
                negative_prompt: "",
            },
            Self::HighQuality => PresetValues {
                style: "vivid",
                quality: "hd",
                negative_prompt: "low quality, blurry, distorted",
            },
        }
    }
}

impl FromStr for Preset {
    type Err = EaselError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::from_name(raw)
            .ok_or_else(|| EaselError::Validation(format!("unknown preset '{}'", raw.trim())))
    }
}

/// Fills only the fields the caller left empty.
pub fn apply_preset(request: &mut GenerationRequest, preset: Preset) {
    let values = preset.values();
    if request.style.trim().is_empty() {
        request.style = values.style.to_string();
    }
    if request.quality.trim().is_empty() {
        request.quality = values.quality.to_string();
    }
    if request.negative_prompt.trim().is_empty() {
        request.negative_prompt = values.negative_prompt.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Capability;

    #[test]
    fn names_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(Preset::from_name(preset.name()), Some(preset));
        }
        assert_eq!(Preset::from_name("quick-draft"), Some(Preset::QuickDraft));
        assert!("cinematic".parse::<Preset>().is_err());
    }

    #[test]
    fn preset_fills_only_empty_fields() {
        let mut request = GenerationRequest::new(Capability::Generate, "harbor at dusk");
        request.style.clear();
        request.quality = "standard".to_string();
        apply_preset(&mut request, Preset::Photorealistic);
        assert_eq!(request.style, "natural");
        assert_eq!(request.quality, "standard");
        assert_eq!(
            request.negative_prompt,
            "cartoon, illustration, painting, drawing, art, anime"
        );

        let mut request = GenerationRequest::new(Capability::Generate, "harbor at dusk")
            .with_negative_prompt("people");
        apply_preset(&mut request, Preset::HighQuality);
        assert_eq!(request.negative_prompt, "people");
    }
}
