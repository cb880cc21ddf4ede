//! Chat transport for bcbot.
//!
//! Adapters are pure I/O: they turn platform updates into [`InboundEvent`]s and
//! carry replies, inline answers and message edits back out.

mod telegram;
mod traits;
mod types;

pub use telegram::TelegramAdapter;
pub use traits::ChatTransport;
pub use types::{
    CallbackQuery, CallbackQueryId, InboundEvent, InboundMessage, InlineArticle, InlineButton,
    InlineKeyboard, InlineMessageId, InlineQuery, InlineQueryId, MessageRef, Sender,
};
