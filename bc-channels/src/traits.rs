use crate::types::{
    CallbackQueryId, InboundEvent, InlineArticle, InlineKeyboard, InlineMessageId, InlineQueryId,
    MessageRef,
};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Unique channel identifier, e.g. "telegram".
    fn channel_id(&self) -> &str;

    /// Start receiving events. Push to tx for each inbound event until
    /// `shutdown` fires.
    async fn start(&self, tx: mpsc::Sender<InboundEvent>, shutdown: CancellationToken)
    -> Result<()>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef>;

    async fn reply_to(&self, message: MessageRef, text: &str) -> Result<()>;

    /// Show a typing indicator where supported.
    async fn send_typing(&self, _chat_id: i64) -> Result<()> {
        Err(anyhow::anyhow!(
            "send_typing is not supported by this channel"
        ))
    }

    async fn answer_inline_query(
        &self,
        query_id: &InlineQueryId,
        articles: &[InlineArticle],
        cache_time_secs: u32,
    ) -> Result<()>;

    /// Acknowledge a button press. `text` becomes a toast, or a modal when
    /// `show_alert` is set.
    async fn answer_callback(
        &self,
        query_id: &CallbackQueryId,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()>;

    /// Replace the text of a message sent via inline mode, dropping its keyboard.
    async fn edit_inline_message(&self, inline_message_id: &InlineMessageId, text: &str)
    -> Result<()>;

    /// Replace the text of a regular chat message. Its keyboard is replaced by
    /// `keyboard`, or dropped when `None`.
    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;
}
