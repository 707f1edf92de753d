use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::providers::ProviderKind;
use crate::request::GenerationRequest;

pub const DEFAULT_CONFIG_FILE: &str = "easel-config.json";

const BUILTIN_MODEL: &str = "dall-e-3";
const BUILTIN_SIZE: &str = "1024x1024";
const BUILTIN_QUALITY: &str = "standard";

fn default_entries() -> Map<String, Value> {
    let mut defaults = Map::new();
    for (key, value) in [
        ("openai_api_key", ""),
        ("stability_api_key", ""),
        ("replicate_api_key", ""),
        ("default_provider", "openai"),
        ("default_model", BUILTIN_MODEL),
        ("default_size", BUILTIN_SIZE),
        ("default_quality", BUILTIN_QUALITY),
        ("default_save_directory", ""),
    ] {
        defaults.insert(key.to_string(), Value::String(value.to_string()));
    }
    defaults
}

/// Flat key/value settings file. Loaded once before an operation and saved
/// once after it; never touched mid-flight.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl ConfigStore {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            values: default_entries(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut values = default_entries();
        match read_json_object(&path) {
            Ok(Some(on_disk)) => values.extend(on_disk),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable config");
            }
        }
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Returns the value only when it is present and not blank.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), Value::String(value.into()));
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            anyhow::bail!("config store has no backing file");
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.path,
            serde_json::to_string_pretty(&Value::Object(self.values.clone()))?,
        )?;
        Ok(())
    }

    /// Saves, logging instead of failing.
    pub fn save_or_warn(&self) {
        if let Err(err) = self.save() {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to save config");
        }
    }
}

fn read_json_object(path: &Path) -> anyhow::Result<Option<Map<String, Value>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    match parsed {
        Value::Object(map) => Ok(Some(map)),
        _ => anyhow::bail!("config root is not an object"),
    }
}

/// Fills intent fields still holding built-in defaults with configured ones.
pub fn apply_config_defaults(
    request: &mut GenerationRequest,
    provider: ProviderKind,
    config: &ConfigStore,
) {
    if request.size == BUILTIN_SIZE {
        if let Some(size) = config.get_non_empty("default_size") {
            request.size = size.to_string();
        }
    }
    if request.quality == BUILTIN_QUALITY {
        if let Some(quality) = config.get_non_empty("default_quality") {
            request.quality = quality.to_string();
        }
    }
    if provider == ProviderKind::OpenAi && request.model == BUILTIN_MODEL {
        if let Some(model) = config
            .get_non_empty("default_model")
            .filter(|model| model.starts_with("dall-e"))
        {
            request.model = model.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Capability;

    #[test]
    fn missing_file_yields_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = ConfigStore::load(temp.path().join("absent.json"));
        assert_eq!(config.get("default_provider"), Some("openai"));
        assert_eq!(config.get("default_size"), Some("1024x1024"));
        assert_eq!(config.get_non_empty("openai_api_key"), None);
        Ok(())
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json")?;
        let config = ConfigStore::load(&path);
        assert_eq!(config.get("default_model"), Some("dall-e-3"));
        Ok(())
    }

    #[test]
    fn save_then_load_round_trips_and_keeps_unknown_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("config.json");
        std::fs::create_dir_all(temp.path().join("nested"))?;
        std::fs::write(&path, r#"{"theme": "dark"}"#)?;

        let mut config = ConfigStore::load(&path);
        config.set("stability_api_key", "sk-live");
        config.save()?;

        let reloaded = ConfigStore::load(&path);
        assert_eq!(reloaded.get("stability_api_key"), Some("sk-live"));
        assert_eq!(reloaded.get("theme"), Some("dark"));
        assert_eq!(reloaded.get("default_quality"), Some("standard"));
        Ok(())
    }

    #[test]
    fn in_memory_store_refuses_to_save() {
        assert!(ConfigStore::in_memory().save().is_err());
    }

    #[test]
    fn defaults_only_replace_builtin_values() {
        let mut config = ConfigStore::in_memory();
        config.set("default_size", "512x512");
        config.set("default_quality", "hd");
        config.set("default_model", "dall-e-2");

        let mut request = GenerationRequest::new(Capability::Generate, "lighthouse");
        apply_config_defaults(&mut request, ProviderKind::OpenAi, &config);
        assert_eq!(request.size, "512x512");
        assert_eq!(request.quality, "hd");
        assert_eq!(request.model, "dall-e-2");

        let mut explicit = GenerationRequest::new(Capability::Generate, "lighthouse")
            .with_size("256x256")
            .with_model("gpt-image-1");
        apply_config_defaults(&mut explicit, ProviderKind::OpenAi, &config);
        assert_eq!(explicit.size, "256x256");
        assert_eq!(explicit.model, "gpt-image-1");
    }

    #[test]
    fn default_model_is_ignored_for_other_providers_and_non_dalle_models() {
        let mut config = ConfigStore::in_memory();
        config.set("default_model", "dall-e-2");
        let mut request = GenerationRequest::new(Capability::Generate, "lighthouse");
        apply_config_defaults(&mut request, ProviderKind::Stability, &config);
        assert_eq!(request.model, "dall-e-3");

        config.set("default_model", "gpt-image-1");
        apply_config_defaults(&mut request, ProviderKind::OpenAi, &config);
        assert_eq!(request.model, "dall-e-3");
    }
}
