//! OneSender（WhatsApp 网关）集成
//!
//! 通过 Webhook 接收消息，交给会话引擎处理后逐条发送回复。
//! 发送失败只记录日志，不回滚已完成的状态转换或考勤写入。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::OneSenderSection;
use crate::core::EngineError;
use crate::engine::{ConversationEngine, Outbound};

/// 出站消息能力：发送一条文本给接收者
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Webhook 服务状态
pub struct WebhookState {
    pub engine: Arc<ConversationEngine>,
    pub notifier: Arc<dyn Notifier>,
}

/// OneSender Webhook 请求体：`{"from": "...", "message": {"text": {"body": "..."}}}`
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub from: Option<String>,
    pub message: Option<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub text: Option<WebhookText>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookText {
    pub body: Option<String>,
}

impl WebhookPayload {
    /// 提取 (发送者, 去除首尾空白的消息)；任一缺失或为空时返回 None
    pub fn into_parts(self) -> Option<(String, String)> {
        let sender = self.from.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())?;
        let body = self
            .message?
            .text?
            .body
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())?;
        Some((sender, body))
    }
}

/// OneSender 发送消息 API 请求体
#[derive(Debug, Serialize)]
struct SendMessageRequest {
    recipient_type: String,
    to: String,
    #[serde(rename = "type")]
    msg_type: String,
    text: SendMessageText,
}

#[derive(Debug, Serialize)]
struct SendMessageText {
    body: String,
}

/// 创建 Webhook 路由
pub fn create_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_receive))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// POST /webhook - 接收入站消息
async fn webhook_receive(
    State(state): State<Arc<WebhookState>>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> (StatusCode, &'static str) {
    let parts = payload.ok().and_then(|Json(p)| p.into_parts());
    let Some((sender, body)) = parts else {
        tracing::warn!("Rejected malformed webhook payload");
        return (StatusCode::BAD_REQUEST, "Invalid payload");
    };

    tracing::info!("Incoming message from [{}]: '{}'", sender, body);

    match state.engine.handle_message(&sender, &body).await {
        Ok(replies) => {
            deliver(state.notifier.as_ref(), &replies).await;
            (StatusCode::OK, "OK")
        }
        Err(EngineError::InvalidInput(e)) => {
            tracing::warn!("Rejected message from [{}]: {}", sender, e);
            (StatusCode::BAD_REQUEST, "Invalid payload")
        }
        Err(e) => {
            tracing::error!("Failed to handle message from [{}]: {}", sender, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

/// 按顺序逐条发送；单条失败不影响后续
pub async fn deliver(notifier: &dyn Notifier, replies: &[Outbound]) {
    for reply in replies {
        if let Err(e) = notifier.send(&reply.recipient, &reply.text).await {
            tracing::error!("Failed to send message to [{}]: {}", reply.recipient, e);
        }
    }
}

/// 通过 OneSender HTTP API 发送消息
pub struct OneSenderClient {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
}

impl OneSenderClient {
    pub fn new(cfg: &OneSenderSection) -> anyhow::Result<Self> {
        if cfg.url.is_none() || cfg.api_key.is_none() {
            tracing::warn!("OneSender url or api_key not configured; replies will not be delivered");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl Notifier for OneSenderClient {
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let (Some(url), Some(api_key)) = (self.url.as_deref(), self.api_key.as_deref()) else {
            anyhow::bail!("ONESENDER_URL or ONESENDER_API_KEY not configured");
        };

        let req = SendMessageRequest {
            recipient_type: "individual".to_string(),
            to: to.replace('+', ""),
            msg_type: "text".to_string(),
            text: SendMessageText {
                body: body.to_string(),
            },
        };

        tracing::debug!("Sending to [{}] via OneSender", req.to);
        let resp = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OneSender API error {}: {}", status, text);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Option<(String, String)> {
        serde_json::from_str::<WebhookPayload>(json).unwrap().into_parts()
    }

    #[test]
    fn test_payload_parts() {
        assert_eq!(
            parse(r#"{"from":"+62811","message":{"text":{"body":"  !absen "}}}"#),
            Some(("+62811".to_string(), "!absen".to_string()))
        );
    }

    #[test]
    fn test_payload_missing_fields() {
        assert!(parse(r#"{"message":{"text":{"body":"!absen"}}}"#).is_none());
        assert!(parse(r#"{"from":"","message":{"text":{"body":"!absen"}}}"#).is_none());
        assert!(parse(r#"{"from":"62811"}"#).is_none());
        assert!(parse(r#"{"from":"62811","message":{}}"#).is_none());
        assert!(parse(r#"{"from":"62811","message":{"text":{"body":"   "}}}"#).is_none());
    }

    #[test]
    fn test_send_request_shape() {
        let req = SendMessageRequest {
            recipient_type: "individual".to_string(),
            to: "+62811".replace('+', ""),
            msg_type: "text".to_string(),
            text: SendMessageText {
                body: "hi".to_string(),
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "recipient_type": "individual",
                "to": "62811",
                "type": "text",
                "text": {"body": "hi"}
            })
        );
    }

    #[tokio::test]
    async fn test_unconfigured_client_fails_send() {
        let client = OneSenderClient::new(&OneSenderSection::default()).unwrap();
        assert!(client.send("62811", "hi").await.is_err());
    }
}
