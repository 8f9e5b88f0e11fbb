use std::sync::mpsc::Sender;
use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest_eventsource::{Event, EventSource};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::{ApiKey, ChatMsg, ChatStreamEvent, mask_key_secure, truncate_error};

pub const DEFAULT_BASE_URL: &str = "https://api.routstr.com/v1";

/// Tor's default SOCKS5 listener. The 'h' scheme resolves hostnames through
/// the proxy so DNS lookups do not leak.
pub const TOR_SOCKS_PROXY: &str = "socks5h://localhost:9050";

// wallet calls are bounded; the streaming call deliberately is not
const WALLET_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API key is not set")]
    MissingApiKey,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}: {1}")]
    Status(u16, String),
    #[error("stream error: {0}")]
    Sse(String),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Builds the client used for every call in a session. With Tor enabled all
/// traffic goes through the local SOCKS proxy; if the proxy is not running
/// the first request fails instead of silently falling back to direct.
pub fn build_client(use_tor: bool) -> Result<reqwest::Client, ApiError> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if use_tor {
        builder = builder.proxy(reqwest::Proxy::all(TOR_SOCKS_PROXY)?);
    }
    Ok(builder.build()?)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMsg],
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    total_tokens: u32,
}

/// Runs one streamed completion turn. Fragments and usage figures are
/// relayed to the UI thread through `tx` in arrival order; the caller turns
/// the final Result into a Finished or Error event. No retry, no mid-stream
/// cancellation.
pub async fn stream_chat(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &ApiKey,
    model: &str,
    messages: &[ChatMsg],
    tx: &Sender<ChatStreamEvent>,
    ctx: &egui::Context,
) -> Result<(), ApiError> {
    if !api_key.is_set {
        return Err(ApiError::MissingApiKey);
    }
    debug!(
        "streaming from {} with key {}",
        model,
        mask_key_secure(api_key.key.expose_secret())
    );

    let request = ChatRequest {
        model,
        messages,
        stream: true,
        stream_options: StreamOptions {
            include_usage: true,
        },
    };

    let builder = client
        .post(format!("{}/chat/completions", base_url))
        .bearer_auth(api_key.key.expose_secret())
        .json(&request);

    let mut source = EventSource::new(builder).map_err(|e| ApiError::Sse(e.to_string()))?;

    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => {}
            Ok(Event::Message(msg)) => {
                if msg.data == "[DONE]" {
                    break;
                }
                let chunk: StreamChunk = serde_json::from_str(&msg.data)?;
                if let Some(content) = chunk
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                {
                    if !content.is_empty() {
                        let _ = tx.send(ChatStreamEvent::Content(content.to_string()));
                        ctx.request_repaint();
                    }
                }
                if let Some(usage) = chunk.usage {
                    let _ = tx.send(ChatStreamEvent::Usage(usage.total_tokens));
                    ctx.request_repaint();
                }
            }
            Err(reqwest_eventsource::Error::StreamEnded) => break,
            Err(reqwest_eventsource::Error::InvalidStatusCode(code, response)) => {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::Status(code.as_u16(), truncate_error(&body, 200)));
            }
            Err(e) => return Err(ApiError::Sse(e.to_string())),
        }
    }
    info!("stream from {} finished", model);
    ctx.request_repaint();
    Ok(())
}

/// Response of the wallet-info endpoint. `api_key` is only present when the
/// bearer was a one-time cashu token being redeemed.
#[derive(Deserialize)]
pub struct WalletInfo {
    #[serde(default)]
    pub api_key: Option<String>,
    pub balance: u64,
}

/// Bearer-authenticated wallet query, used both for balance checks (bearer =
/// API key) and credit redemption (bearer = cashu token). Bounded timeout;
/// non-200 is surfaced with the response body.
pub async fn wallet_info(
    client: &reqwest::Client,
    base_url: &str,
    bearer: &str,
) -> Result<WalletInfo, ApiError> {
    let response = client
        .get(format!("{}/wallet/info", base_url))
        .bearer_auth(bearer)
        .timeout(WALLET_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("wallet info failed: {} {}", status, body);
        return Err(ApiError::Status(status.as_u16(), truncate_error(&body, 200)));
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MsgRole;

    #[test]
    fn chat_request_wire_format() {
        let messages = vec![
            ChatMsg::new(MsgRole::System, "S"),
            ChatMsg::new(MsgRole::User, "hello"),
        ];
        let request = ChatRequest {
            model: "openai/gpt-4.5-preview",
            messages: &messages,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "openai/gpt-4.5-preview");
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn parse_content_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
        assert!(chunk.usage.is_none());
    }

    #[test]
    fn parse_usage_only_chunk() {
        // final chunk: empty choices, cumulative usage attached
        let data = r#"{"choices":[],"usage":{"prompt_tokens":2,"completion_tokens":3,"total_tokens":5}}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn parse_empty_delta_chunk() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn parse_wallet_info() {
        let balance_only: WalletInfo = serde_json::from_str(r#"{"balance":1234}"#).unwrap();
        assert_eq!(balance_only.balance, 1234);
        assert!(balance_only.api_key.is_none());

        let redeemed: WalletInfo =
            serde_json::from_str(r#"{"api_key":"sk-new","balance":500}"#).unwrap();
        assert_eq!(redeemed.api_key.as_deref(), Some("sk-new"));
        assert_eq!(redeemed.balance, 500);
    }
}
