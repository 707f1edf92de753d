use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{Capability, GenerationRequest};

pub const HISTORY_LIMIT: usize = 100;
pub const DEFAULT_HISTORY_FILE: &str = "easel-history.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub operation: Capability,
    pub prompt: String,
    pub provider: String,
    pub model: String,
    pub size: String,
    pub seed: String,
}

impl HistoryEntry {
    pub fn new(request: &GenerationRequest, provider: &str, model: &str, size: &str) -> Self {
        let prompt = match request.operation {
            Capability::Edit => request.edit_instruction.clone(),
            Capability::Variation => "Created variation".to_string(),
            _ => request.prompt.clone(),
        };
        Self {
            timestamp: now_utc_iso(),
            operation: request.operation,
            prompt,
            provider: provider.to_string(),
            model: model.to_string(),
            size: size.to_string(),
            seed: request
                .seed()
                .map(|seed| seed.to_string())
                .unwrap_or_else(|| "random".to_string()),
        }
    }
}

/// Rolling generation log holding the most recent entries, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable history");
                Vec::new()
            }
        };
        Self { path, entries }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        if self.entries.len() > HISTORY_LIMIT {
            let excess = self.entries.len() - HISTORY_LIMIT;
            self.entries.drain(..excess);
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }

    /// Records entries and persists them; failures are logged, never raised.
    pub fn append(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) {
        for entry in entries {
            self.push(entry);
        }
        if let Err(err) = self.save() {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to write history");
        }
    }
}

fn read_entries(path: &Path) -> anyhow::Result<Vec<HistoryEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(prompt: &str) -> HistoryEntry {
        let request = GenerationRequest::new(Capability::Generate, prompt);
        HistoryEntry::new(&request, "openai", "dall-e-3", "1024x1024")
    }

    #[test]
    fn entry_reports_random_seed_and_edit_instruction() {
        let generated = entry("castle");
        assert_eq!(generated.seed, "random");
        assert_eq!(generated.prompt, "castle");

        let request = GenerationRequest::new(Capability::Edit, "")
            .with_edit_instruction("add snow")
            .with_seed(7);
        let edited = HistoryEntry::new(&request, "stability", "sdxl", "1024x1024");
        assert_eq!(edited.prompt, "add snow");
        assert_eq!(edited.seed, "7");
        assert_eq!(edited.operation, Capability::Edit);
    }

    #[test]
    fn log_keeps_latest_hundred() {
        let temp = tempfile::tempdir().unwrap();
        let mut log = HistoryLog::load(temp.path().join("history.json"));
        for index in 0..105 {
            log.push(entry(&format!("prompt {index}")));
        }
        assert_eq!(log.entries().len(), HISTORY_LIMIT);
        assert_eq!(log.entries()[0].prompt, "prompt 5");
        assert_eq!(log.entries()[99].prompt, "prompt 104");
    }

    #[test]
    fn append_persists_and_reloads() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("state").join("history.json");
        let mut log = HistoryLog::load(&path);
        log.append([entry("first"), entry("second")]);

        let reloaded = HistoryLog::load(&path);
        assert_eq!(reloaded.entries().len(), 2);
        assert_eq!(reloaded.entries()[1].prompt, "second");

        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.contains("\"operation\": \"generate\""));
        Ok(())
    }

    #[test]
    fn append_failure_is_not_fatal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x")?;
        let mut log = HistoryLog::load(blocker.join("history.json"));
        log.append([entry("kept in memory")]);
        assert_eq!(log.entries().len(), 1);
        Ok(())
    }
}
