//! Text submission to the server's HTTP collaborator.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{ClientError, Result};

#[derive(Serialize)]
struct SubmitBody<'a> {
    text: &'a str,
}

/// Body of a `/submit` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitReply {
    /// Whether the server accepted the text.
    pub success: bool,
    /// Outcome message.
    #[serde(default)]
    pub message: String,
}

/// POST `text` to `url` (typically `http://host:9003/submit`).
///
/// Non-2xx answers become [`ClientError::Submit`] carrying the server's
/// message when it sent one.
pub async fn submit_text(client: &reqwest::Client, url: &str, text: &str) -> Result<SubmitReply> {
    debug!(url, text_len = text.len(), "submitting text");
    let resp = client.post(url).json(&SubmitBody { text }).send().await?;
    let status = resp.status();

    if status.is_success() {
        let reply: SubmitReply = resp.json().await?;
        info!(status = status.as_u16(), message = %reply.message, "submission accepted");
        return Ok(reply);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<SubmitReply>(&body)
        .map(|r| r.message)
        .unwrap_or(body);
    Err(ClientError::Submit {
        status: status.as_u16(),
        message,
    })
}
