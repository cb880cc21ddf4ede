use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

id_newtype!(InlineQueryId);
id_newtype!(CallbackQueryId);
id_newtype!(InlineMessageId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// A message the bot sent or received, addressable for edits and replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message: MessageRef,
    pub sender: Sender,
    pub is_private: bool,
    pub text: String,
}

impl InboundMessage {
    /// `/cmd@botname args` -> `Some("cmd")`.
    pub fn command(&self) -> Option<&str> {
        let first = self.text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineQuery {
    pub id: InlineQueryId,
    pub sender: Sender,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    pub id: CallbackQueryId,
    pub sender: Sender,
    pub data: Option<String>,
    /// Set when the button belongs to a message sent via inline mode.
    pub inline_message_id: Option<InlineMessageId>,
    /// Set when the button belongs to a regular chat message.
    pub message: Option<MessageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(InboundMessage),
    InlineQuery(InlineQuery),
    Callback(CallbackQuery),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn row(buttons: Vec<InlineButton>) -> Self {
        Self {
            inline_keyboard: vec![buttons],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineArticle {
    pub id: String,
    pub title: String,
    pub description: String,
    /// HTML formatted.
    pub message_text: String,
    pub thumbnail_url: Option<String>,
    pub keyboard: Option<InlineKeyboard>,
}

impl InlineArticle {
    /// `InlineQueryResultArticle` as the Bot API expects it.
    pub fn to_bot_api(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "type": "article",
            "id": self.id,
            "title": self.title,
            "description": self.description,
            "input_message_content": {
                "message_text": self.message_text,
                "parse_mode": "HTML",
            },
        });
        if let Some(url) = &self.thumbnail_url {
            value["thumbnail_url"] = serde_json::Value::String(url.clone());
        }
        if let Some(keyboard) = &self.keyboard {
            value["reply_markup"] = serde_json::to_value(keyboard).unwrap_or_default();
        }
        value
    }
}
