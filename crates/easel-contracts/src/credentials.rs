use std::env;

use crate::config::ConfigStore;
use crate::error::{EaselError, Result};
use crate::providers::ProviderDescriptor;

const EXPLICIT_PLACEHOLDERS: [&str; 2] = ["sk-...", "sk-your-key-here"];
const CONFIG_PLACEHOLDERS: [&str; 2] = ["sk-your-key-here", "r8_your-token-here"];

/// Where a credential may come from, highest precedence first.
#[derive(Debug, Clone, Default)]
pub struct CredentialSources<'a> {
    pub explicit: Option<&'a str>,
    pub use_env: bool,
    pub use_config: bool,
}

impl<'a> CredentialSources<'a> {
    pub fn new(explicit: Option<&'a str>) -> Self {
        Self {
            explicit,
            use_env: true,
            use_config: true,
        }
    }
}

pub fn resolve_credential(
    descriptor: &ProviderDescriptor,
    sources: &CredentialSources<'_>,
    config: &ConfigStore,
) -> Result<Option<String>> {
    resolve_credential_with(descriptor, sources, config, non_empty_env)
}

/// Same as [`resolve_credential`] with an injectable environment lookup.
pub fn resolve_credential_with(
    descriptor: &ProviderDescriptor,
    sources: &CredentialSources<'_>,
    config: &ConfigStore,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<String>> {
    if !descriptor.requires_credential() {
        return Ok(None);
    }

    if let Some(explicit) = sources
        .explicit
        .map(str::trim)
        .filter(|value| usable(value, &EXPLICIT_PLACEHOLDERS))
    {
        return Ok(Some(explicit.to_string()));
    }

    if sources.use_env {
        if let Some(value) = descriptor.env_key.and_then(&env_lookup) {
            return Ok(Some(value));
        }
    }

    if sources.use_config {
        if let Some(value) = descriptor
            .config_key
            .and_then(|key| config.get_non_empty(key))
            .filter(|value| usable(value, &CONFIG_PLACEHOLDERS))
        {
            return Ok(Some(value.to_string()));
        }
    }

    Err(missing_credential(descriptor))
}

fn usable(value: &str, placeholders: &[&str]) -> bool {
    !value.is_empty() && !placeholders.contains(&value)
}

pub fn missing_credential(descriptor: &ProviderDescriptor) -> EaselError {
    EaselError::Config(format!(
        "No API key found for {}. Provide one of:\n\
         1. an explicit key for this run\n\
         2. the {} environment variable\n\
         3. the \"{}\" entry in the config file",
        descriptor.display_name,
        descriptor.env_key.unwrap_or("<none>"),
        descriptor.config_key.unwrap_or("<none>"),
    ))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::resolve;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn explicit_beats_env_and_config() -> anyhow::Result<()> {
        let openai = resolve("openai")?;
        let mut config = ConfigStore::in_memory();
        config.set("openai_api_key", "sk-config");
        let sources = CredentialSources::new(Some(" sk-explicit "));
        let key = resolve_credential_with(openai, &sources, &config, |_| {
            Some("sk-env".to_string())
        })?;
        assert_eq!(key.as_deref(), Some("sk-explicit"));
        Ok(())
    }

    #[test]
    fn placeholders_are_skipped() -> anyhow::Result<()> {
        let openai = resolve("openai")?;
        let mut config = ConfigStore::in_memory();
        config.set("openai_api_key", "sk-config");
        let sources = CredentialSources::new(Some("sk-your-key-here"));
        let key = resolve_credential_with(openai, &sources, &config, |name| {
            (name == "OPENAI_API_KEY").then(|| "sk-env".to_string())
        })?;
        assert_eq!(key.as_deref(), Some("sk-env"));

        let replicate = resolve("replicate")?;
        let mut config = ConfigStore::in_memory();
        config.set("replicate_api_key", "r8_your-token-here");
        let err = resolve_credential_with(replicate, &CredentialSources::new(None), &config, no_env)
            .unwrap_err();
        assert!(matches!(err, EaselError::Config(_)));
        Ok(())
    }

    #[test]
    fn disabled_sources_are_not_consulted() -> anyhow::Result<()> {
        let stability = resolve("stability")?;
        let mut config = ConfigStore::in_memory();
        config.set("stability_api_key", "sk-config");
        let sources = CredentialSources {
            explicit: None,
            use_env: false,
            use_config: true,
        };
        let key = resolve_credential_with(stability, &sources, &config, |_| {
            Some("sk-env".to_string())
        })?;
        assert_eq!(key.as_deref(), Some("sk-config"));

        let sources = CredentialSources::default();
        assert!(resolve_credential_with(stability, &sources, &config, no_env).is_err());
        Ok(())
    }

    #[test]
    fn local_provider_needs_nothing() -> anyhow::Result<()> {
        let local = resolve("local")?;
        let key = resolve_credential_with(
            local,
            &CredentialSources::default(),
            &ConfigStore::in_memory(),
            no_env,
        )?;
        assert_eq!(key, None);
        Ok(())
    }

    #[test]
    fn missing_credential_names_every_path() -> anyhow::Result<()> {
        let replicate = resolve("replicate")?;
        let err = resolve_credential_with(
            replicate,
            &CredentialSources::new(None),
            &ConfigStore::in_memory(),
            no_env,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("REPLICATE_API_TOKEN"));
        assert!(message.contains("replicate_api_key"));
        assert!(message.contains("explicit key"));
        Ok(())
    }
}
