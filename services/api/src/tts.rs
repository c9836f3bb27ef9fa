//! One-shot text-to-speech over the Deepgram speak REST API. Used only for
//! voice previews; in-session speech comes back over the agent socket.

use anyhow::{bail, Result};

pub const SPEAK_URL: &str = "https://api.deepgram.com/v1/speak";
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Synthesizes `text` with the given voice, returning raw 16-bit linear PCM
/// at 24 kHz.
pub async fn speak(
    http: &reqwest::Client,
    api_key: &str,
    voice_id: &str,
    text: &str,
) -> Result<Vec<u8>> {
    let response = http
        .post(SPEAK_URL)
        .query(&[
            ("model", voice_id),
            ("encoding", "linear16"),
            ("sample_rate", "24000"),
        ])
        .header("Authorization", format!("Token {api_key}"))
        .json(&serde_json::json!({ "text": text }))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("TTS failed: {status} - {body}");
    }
    Ok(response.bytes().await?.to_vec())
}
