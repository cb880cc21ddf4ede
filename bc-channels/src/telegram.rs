use crate::traits::ChatTransport;
use crate::types::{
    CallbackQuery, CallbackQueryId, InboundEvent, InboundMessage, InlineArticle, InlineKeyboard,
    InlineMessageId, InlineQuery, InlineQueryId, MessageRef, Sender,
};
use anyhow::Result;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TELEGRAM_CHANNEL_ID: &str = "telegram";
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const TELEGRAM_ALLOWED_UPDATES: &str = r#"["message","inline_query","callback_query"]"#;
const TELEGRAM_NON_TRANSIENT_DELAY: Duration = Duration::from_secs(10);
const TELEGRAM_RETRY_BASE_MS: u64 = 250;
const TELEGRAM_RETRY_MAX_MS: u64 = 30_000;
const TELEGRAM_NOT_MODIFIED: &str = "message is not modified";

#[derive(Clone)]
pub struct TelegramAdapter {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
    long_poll_timeout_secs: u64,
}

impl TelegramAdapter {
    pub fn new(bot_token: &str) -> Result<Self> {
        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("telegram bot token is empty"));
        }
        let long_poll_timeout_secs = 30;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(long_poll_timeout_secs + 30))
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.trim().to_string(),
            api_base: TELEGRAM_API_BASE.to_string(),
            long_poll_timeout_secs,
        })
    }

    /// Server-side wait for `getUpdates`. The HTTP timeout is kept above it.
    pub fn with_long_poll_timeout(mut self, secs: u64) -> Result<Self> {
        self.long_poll_timeout_secs = secs;
        self.http = reqwest::Client::builder()
            .timeout(Duration::from_secs(secs + 30))
            .build()?;
        Ok(self)
    }

    /// Point at a Bot API server other than api.telegram.org.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/bot{}/{}",
            self.api_base, self.bot_token, method
        ))?)
    }

    /// POST a Bot API method and return its `result`.
    #[tracing::instrument(level = "debug", skip(self, body))]
    async fn call(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let url = self.api_url(method)?;
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("telegram {method} request failed: {}", e.without_url()))?;
        let status = resp.status();
        let text = resp.text().await?;
        let parsed: TelegramResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow::anyhow!("telegram {method} returned unparseable body: status={status} {e}")
        })?;
        if !parsed.ok {
            let description = parsed.description.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "telegram {method} failed: status={status} description={description}"
            ));
        }
        Ok(parsed.result)
    }

    async fn edit(
        &self,
        mut body: serde_json::Value,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        body["text"] = serde_json::Value::String(text.to_string());
        body["parse_mode"] = serde_json::Value::String("HTML".to_string());
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }
        match self.call("editMessageText", body).await {
            Ok(_) => Ok(()),
            // A redelivered press can try to write the text that is already there.
            Err(error) if error.to_string().contains(TELEGRAM_NOT_MODIFIED) => {
                tracing::debug!(%error, "telegram edit was a no-op");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for TelegramAdapter {
    fn channel_id(&self) -> &str {
        TELEGRAM_CHANNEL_ID
    }

    async fn start(&self, tx: mpsc::Sender<InboundEvent>, shutdown: CancellationToken) -> Result<()> {
        let adapter = self.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.run_poll_loop(tx, shutdown).await {
                tracing::error!(%e, "telegram poll loop exited");
            }
        });
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }
        let result = self.call("sendMessage", body).await?;
        let sent: TelegramMessage = serde_json::from_value(result)?;
        Ok(MessageRef {
            chat_id,
            message_id: sent.message_id.unwrap_or_default(),
        })
    }

    async fn reply_to(&self, message: MessageRef, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": message.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "reply_parameters": {
                "message_id": message.message_id,
                "allow_sending_without_reply": true,
            },
        });
        self.call("sendMessage", body).await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        self.call("sendChatAction", body).await?;
        Ok(())
    }

    async fn answer_inline_query(
        &self,
        query_id: &InlineQueryId,
        articles: &[InlineArticle],
        cache_time_secs: u32,
    ) -> Result<()> {
        let results: Vec<serde_json::Value> = articles.iter().map(InlineArticle::to_bot_api).collect();
        let body = serde_json::json!({
            "inline_query_id": query_id.as_str(),
            "results": results,
            "cache_time": cache_time_secs,
            // Offers embed the sender's id and balance, never share them.
            "is_personal": true,
        });
        self.call("answerInlineQuery", body).await?;
        Ok(())
    }

    async fn answer_callback(
        &self,
        query_id: &CallbackQueryId,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        let mut body = serde_json::json!({ "callback_query_id": query_id.as_str() });
        if let Some(text) = text {
            body["text"] = serde_json::Value::String(text.to_string());
            body["show_alert"] = serde_json::Value::Bool(show_alert);
        }
        self.call("answerCallbackQuery", body).await?;
        Ok(())
    }

    async fn edit_inline_message(
        &self,
        inline_message_id: &InlineMessageId,
        text: &str,
    ) -> Result<()> {
        self.edit(
            serde_json::json!({ "inline_message_id": inline_message_id.as_str() }),
            text,
            None,
        )
        .await
    }

    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        self.edit(
            serde_json::json!({
                "chat_id": message.chat_id,
                "message_id": message.message_id,
            }),
            text,
            keyboard,
        )
        .await
    }
}

impl TelegramAdapter {
    #[tracing::instrument(level = "info", skip_all)]
    async fn run_poll_loop(
        &self,
        tx: mpsc::Sender<InboundEvent>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut offset: i64 = 0;
        let mut consecutive_failures: u32 = 0;
        let long_poll_timeout = self.long_poll_timeout_secs.to_string();

        loop {
            let url = self.api_url("getUpdates")?;
            let offset_param = offset.to_string();
            let request = self
                .http
                .get(url)
                .query(&[
                    ("timeout", long_poll_timeout.as_str()),
                    ("offset", offset_param.as_str()),
                    ("allowed_updates", TELEGRAM_ALLOWED_UPDATES),
                ])
                .send();
            let response = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("telegram poll loop stopping");
                    return Ok(());
                }
                response = request => response,
            };
            let response = match response {
                Ok(response) => response,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        error = %error.without_url(),
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates request failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|error| {
                    format!("<failed to read telegram error body: {error}>")
                });
                if is_transient_status(status) {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %status,
                        %body,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates transient failure; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    consecutive_failures = 0;
                    tracing::error!(
                        %status,
                        %body,
                        ?TELEGRAM_NON_TRANSIENT_DELAY,
                        "telegram getUpdates non-transient failure; keeping poll loop alive"
                    );
                    tokio::time::sleep(TELEGRAM_NON_TRANSIENT_DELAY).await;
                }
                continue;
            }

            let parsed = match response.json::<TelegramGetUpdatesResponse>().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        error = %error.without_url(),
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates payload parse failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            consecutive_failures = 0;

            let mut updates = parsed.result;
            updates.sort_by_key(|update| update.update_id);
            for update in updates {
                // Advance offset before conversion to avoid poison-update replay loops.
                if update.update_id < offset {
                    continue;
                }
                offset = update.update_id.saturating_add(1);

                let Some(event) = build_inbound_event(update) else {
                    continue;
                };
                tx.send(event)
                    .await
                    .map_err(|e| anyhow::anyhow!("telegram inbound queue closed: {e}"))?;
            }
        }
    }
}

fn transient_retry_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.saturating_sub(1).min(10);
    Duration::from_millis((TELEGRAM_RETRY_BASE_MS * multiplier).min(TELEGRAM_RETRY_MAX_MS))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn build_inbound_event(update: TelegramUpdate) -> Option<InboundEvent> {
    if let Some(message) = update.message {
        return build_message_event(message);
    }
    if let Some(query) = update.inline_query {
        return Some(InboundEvent::InlineQuery(InlineQuery {
            id: query.id.into(),
            sender: query.from.into(),
            query: query.query,
        }));
    }
    if let Some(callback) = update.callback_query {
        return Some(InboundEvent::Callback(CallbackQuery {
            id: callback.id.into(),
            sender: callback.from.into(),
            data: callback.data,
            inline_message_id: callback.inline_message_id.map(Into::into),
            message: callback.message.and_then(|message| {
                Some(MessageRef {
                    chat_id: message.chat?.id,
                    message_id: message.message_id?,
                })
            }),
        }));
    }
    tracing::debug!(update_id = update.update_id, "ignoring unsupported telegram update");
    None
}

fn build_message_event(message: TelegramMessage) -> Option<InboundEvent> {
    let chat = message.chat?;
    let sender = message.from?;
    let text = message
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())?
        .to_string();

    Some(InboundEvent::Message(InboundMessage {
        message: MessageRef {
            chat_id: chat.id,
            message_id: message.message_id?,
        },
        sender: sender.into(),
        is_private: chat.r#type == "private",
        text,
    }))
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TelegramGetUpdatesResponse {
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    inline_query: Option<TelegramInlineQuery>,
    #[serde(default)]
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    message_id: Option<i64>,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    chat: Option<TelegramChat>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramInlineQuery {
    id: String,
    from: TelegramUser,
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    id: String,
    from: TelegramUser,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    inline_message_id: Option<String>,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: Option<String>,
}

impl From<TelegramUser> for Sender {
    fn from(user: TelegramUser) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
    #[serde(rename = "type")]
    r#type: String,
}
