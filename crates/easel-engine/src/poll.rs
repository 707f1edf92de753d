use std::time::Duration;

use easel_contracts::{EaselError, Result};
use serde_json::Value;

use crate::http::HttpClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionState {
    Created,
    Processing,
    Succeeded(Vec<String>),
    Failed(String),
}

impl PredictionState {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .map(|value| value.trim().to_ascii_lowercase())
            .ok_or_else(|| EaselError::Decode("prediction payload has no status".to_string()))?;
        Ok(match status.as_str() {
            "starting" => Self::Created,
            "succeeded" => {
                let mut urls = Vec::new();
                if let Some(output) = payload.get("output") {
                    collect_output_urls(output, &mut urls);
                }
                Self::Succeeded(urls)
            }
            "failed" | "canceled" => {
                let reason = payload
                    .get("error")
                    .and_then(|error| match error {
                        Value::String(text) => Some(text.clone()),
                        Value::Null => None,
                        other => Some(other.to_string()),
                    })
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| format!("prediction {status}"));
                Self::Failed(reason)
            }
            _ => Self::Processing,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }
}

fn collect_output_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) => {
            let trimmed = url.trim();
            if !trimmed.is_empty() && !out.iter().any(|existing| existing == trimmed) {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(rows) => {
            for row in rows {
                collect_output_urls(row, out);
            }
        }
        _ => {}
    }
}

pub struct Poller<'a> {
    http: &'a HttpClient,
    policy: PollPolicy,
}

impl<'a> Poller<'a> {
    pub fn new(http: &'a HttpClient, policy: PollPolicy) -> Self {
        Self { http, policy }
    }

    /// Polls `status_url` at a fixed interval until the prediction reaches a
    /// terminal state and returns its output URLs.
    pub fn wait(&self, status_url: &str, headers: &[(String, String)]) -> Result<Vec<String>> {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let payload = self.http.get_json(status_url, headers)?;
            let state = PredictionState::from_payload(&payload)?;
            tracing::debug!(attempt, ?state, "prediction status");
            match state {
                PredictionState::Succeeded(urls) if urls.is_empty() => {
                    return Err(EaselError::Decode(
                        "prediction succeeded without output".to_string(),
                    ));
                }
                PredictionState::Succeeded(urls) => return Ok(urls),
                PredictionState::Failed(reason) => {
                    return Err(EaselError::provider(None, reason));
                }
                PredictionState::Created | PredictionState::Processing => {}
            }
            if attempt < max_attempts {
                self.http.sleep(self.policy.interval);
            }
        }
        Err(EaselError::PollTimeout {
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http::testing::{client, json_reply};

    const STATUS_URL: &str = "https://api.replicate.com/v1/predictions/p1";

    #[test]
    fn states_are_read_from_status_field() -> anyhow::Result<()> {
        assert_eq!(
            PredictionState::from_payload(&json!({"status": "starting"}))?,
            PredictionState::Created
        );
        assert_eq!(
            PredictionState::from_payload(&json!({"status": "processing"}))?,
            PredictionState::Processing
        );
        assert_eq!(
            PredictionState::from_payload(&json!({"status": "succeeded", "output": "https://x/a.png"}))?,
            PredictionState::Succeeded(vec!["https://x/a.png".to_string()])
        );
        assert_eq!(
            PredictionState::from_payload(&json!({"status": "canceled", "error": null}))?,
            PredictionState::Failed("prediction canceled".to_string())
        );
        assert!(PredictionState::from_payload(&json!({"id": "p1"})).is_err());
        Ok(())
    }

    #[test]
    fn waits_until_succeeded_then_returns_urls() -> anyhow::Result<()> {
        let (http, transport, sleeper) = client(vec![
            json_reply(200, json!({"status": "processing"})),
            json_reply(200, json!({"status": "processing"})),
            json_reply(
                200,
                json!({"status": "succeeded", "output": ["https://x/1.png", "https://x/2.png"]}),
            ),
        ]);
        let urls = Poller::new(&http, PollPolicy::default()).wait(STATUS_URL, &[])?;
        assert_eq!(urls[0], "https://x/1.png");
        assert_eq!(transport.request_count(), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(2), Duration::from_secs(2)]
        );
        Ok(())
    }

    #[test]
    fn failed_prediction_surfaces_provider_text() {
        let (http, _, _) = client(vec![json_reply(
            200,
            json!({"status": "failed", "error": "NSFW content detected"}),
        )]);
        let err = Poller::new(&http, PollPolicy::default())
            .wait(STATUS_URL, &[])
            .unwrap_err();
        assert!(matches!(
            &err,
            EaselError::Provider { status: None, message } if message == "NSFW content detected"
        ));
    }

    #[test]
    fn attempt_cap_yields_timeout() {
        let replies = (0..3)
            .map(|_| json_reply(200, json!({"status": "processing"})))
            .collect();
        let (http, transport, sleeper) = client(replies);
        let policy = PollPolicy {
            interval: Duration::from_secs(2),
            max_attempts: 3,
        };
        let err = Poller::new(&http, policy).wait(STATUS_URL, &[]).unwrap_err();
        assert!(matches!(err, EaselError::PollTimeout { attempts: 3 }));
        assert_eq!(transport.request_count(), 3);
        assert_eq!(sleeper.recorded().len(), 2);
    }
}
