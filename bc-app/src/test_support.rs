use anyhow::Result;
use async_trait::async_trait;
use bc_channels::{
    CallbackQuery, CallbackQueryId, ChatTransport, InboundEvent, InboundMessage, InlineArticle,
    InlineKeyboard, InlineMessageId, InlineQuery, InlineQueryId, MessageRef, Sender,
};
use bc_core::{Locale, MemoryLedger};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::BotConfig;
use crate::gateway::Gateway;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message {
        chat_id: i64,
        text: String,
        keyboard: Option<InlineKeyboard>,
    },
    Reply {
        message: MessageRef,
        text: String,
    },
    Typing {
        chat_id: i64,
    },
    InlineAnswer {
        query_id: String,
        articles: Vec<InlineArticle>,
        cache_time_secs: u32,
    },
    CallbackAnswer {
        query_id: String,
        text: Option<String>,
        alert: bool,
    },
    InlineEdit {
        inline_message_id: String,
        text: String,
    },
    Edit {
        message: MessageRef,
        text: String,
    },
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    fail_edits: bool,
}

impl RecordingTransport {
    /// A transport whose chat-message edits always fail, as when the prompt
    /// was deleted.
    pub fn failing_edits() -> Self {
        Self {
            fail_edits: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("recording lock").clone()
    }

    fn push(&self, sent: Sent) {
        self.sent.lock().expect("recording lock").push(sent);
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn channel_id(&self) -> &str {
        "recording"
    }

    async fn start(&self, _tx: mpsc::Sender<InboundEvent>, _shutdown: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<MessageRef> {
        self.push(Sent::Message {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(MessageRef {
            chat_id,
            message_id: 1,
        })
    }

    async fn reply_to(&self, message: MessageRef, text: &str) -> Result<()> {
        self.push(Sent::Reply {
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.push(Sent::Typing { chat_id });
        Ok(())
    }

    async fn answer_inline_query(
        &self,
        query_id: &InlineQueryId,
        articles: &[InlineArticle],
        cache_time_secs: u32,
    ) -> Result<()> {
        self.push(Sent::InlineAnswer {
            query_id: query_id.to_string(),
            articles: articles.to_vec(),
            cache_time_secs,
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        query_id: &CallbackQueryId,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        self.push(Sent::CallbackAnswer {
            query_id: query_id.to_string(),
            text: text.map(ToOwned::to_owned),
            alert: show_alert,
        });
        Ok(())
    }

    async fn edit_inline_message(
        &self,
        inline_message_id: &InlineMessageId,
        text: &str,
    ) -> Result<()> {
        self.push(Sent::InlineEdit {
            inline_message_id: inline_message_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        message: MessageRef,
        text: &str,
        _keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        if self.fail_edits {
            anyhow::bail!("Bad Request: message to edit not found");
        }
        self.push(Sent::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub gateway: Gateway,
    pub ledger: Arc<MemoryLedger>,
    pub transport: Arc<RecordingTransport>,
}

pub fn harness(cfg: BotConfig) -> Harness {
    harness_with(cfg, Arc::new(RecordingTransport::default()))
}

pub fn harness_with(cfg: BotConfig, transport: Arc<RecordingTransport>) -> Harness {
    let ledger = Arc::new(MemoryLedger::new(cfg.ledger.starting_balance));
    let (_tx, rx) = mpsc::channel(1);
    let gateway = Gateway::new(
        &cfg,
        Arc::new(Locale::default()),
        ledger.clone(),
        transport.clone(),
        rx,
    );
    Harness {
        gateway,
        ledger,
        transport,
    }
}

pub fn sender(id: i64, first_name: &str, username: Option<&str>) -> Sender {
    Sender {
        id,
        username: username.map(ToOwned::to_owned),
        first_name: first_name.to_string(),
        last_name: None,
    }
}

pub fn command(from: Sender, text: &str) -> InboundEvent {
    InboundEvent::Message(InboundMessage {
        message: MessageRef {
            chat_id: from.id,
            message_id: 100,
        },
        sender: from,
        is_private: true,
        text: text.to_string(),
    })
}

pub fn inline_query(from: Sender, query: &str) -> InboundEvent {
    InboundEvent::InlineQuery(InlineQuery {
        id: InlineQueryId::new("iq"),
        sender: from,
        query: query.to_string(),
    })
}

pub fn inline_press(from: Sender, data: &str, handle: Option<&str>) -> InboundEvent {
    InboundEvent::Callback(CallbackQuery {
        id: CallbackQueryId::new("cb"),
        sender: from,
        data: Some(data.to_string()),
        inline_message_id: handle.map(InlineMessageId::new),
        message: None,
    })
}

pub fn chat_press(from: Sender, data: &str) -> InboundEvent {
    let chat_id = from.id;
    InboundEvent::Callback(CallbackQuery {
        id: CallbackQueryId::new("cb"),
        sender: from,
        data: Some(data.to_string()),
        inline_message_id: None,
        message: Some(MessageRef {
            chat_id,
            message_id: 7,
        }),
    })
}
