//! HTTP client for VOICEVOX-family TTS engines.
//!
//! Grounded on `tts_client.py`'s `TTSClient`: a stateless client holding one
//! pooled HTTP session, reshaped from the original's lazily-initialized
//! module singleton into an explicitly-constructed component. Every call is
//! routed through the rate governor, matching the design's C1/C2 coupling.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

use voice_relay_core::traits::PingOutcome;
use voice_relay_core::{Error, Tts};
use voice_relay_governor::{CallOutcome, RateGovernor};

/// Audio query field tuning applied after `/audio_query`, before
/// `/synthesis`. `pitchScale` is intentionally left untouched: prior
/// experience with these engines shows modifying it causes distortion.
fn tune_query(mut query: Value, sample_rate_hz: u32) -> Value {
    if let Some(obj) = query.as_object_mut() {
        obj.insert("outputSamplingRate".to_string(), Value::from(sample_rate_hz));

        if let Some(volume) = obj.get("volumeScale").and_then(Value::as_f64) {
            let clamped = volume.clamp(0.0, 1.0) * 0.8;
            obj.insert("volumeScale".to_string(), Value::from(clamped));
        }

        if let Some(speed) = obj.get("speedScale").and_then(Value::as_f64) {
            obj.insert("speedScale".to_string(), Value::from(speed.clamp(0.8, 1.2)));
        }
    }
    query
}

pub struct TtsClient {
    http: reqwest::Client,
    governor: std::sync::Arc<RateGovernor>,
    sample_rate_hz: u32,
}

impl TtsClient {
    pub fn new(governor: std::sync::Arc<RateGovernor>, sample_rate_hz: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .expect("reqwest client configuration is valid");
        Self { http, governor, sample_rate_hz }
    }

    async fn query(&self, text: &str, speaker_id: i64, base_url: &str) -> Option<Value> {
        let url = format!("{base_url}/audio_query");
        let result = self
            .governor
            .with_governor(|| async {
                match self.http.post(&url).query(&[("text", text), ("speaker", &speaker_id.to_string())]).send().await {
                    Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                        let retry_after = resp
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<f64>().ok())
                            .map(Duration::from_secs_f64)
                            .unwrap_or(Duration::from_secs(1));
                        CallOutcome::RateLimited { retry_after }
                    }
                    Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                        Ok(body) => CallOutcome::Success(body),
                        Err(e) => CallOutcome::Failure(Error::DegradedEngine(e.to_string())),
                    },
                    Ok(resp) => {
                        CallOutcome::Failure(Error::DegradedEngine(format!("audio_query http {}", resp.status())))
                    }
                    Err(e) => CallOutcome::Failure(Error::TransientTransport(e.to_string())),
                }
            })
            .await;

        match result {
            Ok(query) => Some(query),
            Err(e) => {
                error!(error = %e, "audio_query failed");
                None
            }
        }
    }

    async fn synthesize(&self, query: Value, speaker_id: i64, base_url: &str) -> Option<Vec<u8>> {
        let url = format!("{base_url}/synthesis");
        let body = query.to_string();
        let result = self
            .governor
            .with_governor(|| async {
                match self
                    .http
                    .post(&url)
                    .query(&[("speaker", &speaker_id.to_string())])
                    .header("Content-Type", "application/json")
                    .body(body.clone())
                    .send()
                    .await
                {
                    Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                        CallOutcome::RateLimited { retry_after: Duration::from_secs(1) }
                    }
                    Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                        Ok(bytes) => CallOutcome::Success(bytes.to_vec()),
                        Err(e) => CallOutcome::Failure(Error::DegradedEngine(e.to_string())),
                    },
                    Ok(resp) => {
                        CallOutcome::Failure(Error::DegradedEngine(format!("synthesis http {}", resp.status())))
                    }
                    Err(e) => CallOutcome::Failure(Error::TransientTransport(e.to_string())),
                }
            })
            .await;

        match result {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(error = %e, "synthesis failed");
                None
            }
        }
    }
}

#[async_trait]
impl Tts for TtsClient {
    async fn ping(&self, engine_base_url: &str) -> PingOutcome {
        let url = format!("{engine_base_url}/version");
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => PingOutcome::Ok,
            Ok(resp) => PingOutcome::Http(resp.status().as_u16()),
            Err(e) if e.is_timeout() => PingOutcome::Timeout,
            Err(e) if e.is_connect() => PingOutcome::ConnectionRefused,
            Err(e) => PingOutcome::Unexpected(e.to_string()),
        }
    }

    async fn synthesize_text(&self, text: &str, speaker_id: i64, engine_base_url: &str) -> Option<Vec<u8>> {
        if text.trim().is_empty() {
            debug!("empty text provided to synthesize_text, skipping");
            return None;
        }
        let query = self.query(text, speaker_id, engine_base_url).await?;
        let tuned = tune_query(query, self.sample_rate_hz);
        let bytes = self.synthesize(tuned, speaker_id, engine_base_url).await;
        if bytes.is_none() {
            warn!(speaker_id, "synthesis produced no audio");
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tune_query_forces_sample_rate_and_clamps_scales() {
        let query = json!({
            "outputSamplingRate": 24000,
            "volumeScale": 2.0,
            "speedScale": 2.0,
            "pitchScale": 0.0,
        });
        let tuned = tune_query(query, 48_000);
        assert_eq!(tuned["outputSamplingRate"], 48_000);
        assert_eq!(tuned["volumeScale"], 0.8);
        assert_eq!(tuned["speedScale"], 1.2);
        assert_eq!(tuned["pitchScale"], 0.0);
    }

    #[test]
    fn tune_query_never_touches_missing_fields() {
        let query = json!({"outputSamplingRate": 24000});
        let tuned = tune_query(query, 48_000);
        assert!(tuned.get("volumeScale").is_none());
    }
}
