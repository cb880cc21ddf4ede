//! User-facing text templates.
//!
//! Templates use `{name}` placeholders filled by [`fill`]. Every field has an
//! English default so a partial override file only needs the keys it changes.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Locale {
    pub messages: Messages,
    pub inline: InlineTexts,
    pub keyboard: KeyboardLabels,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub start: String,
    pub register: String,
    pub register_success: String,
    pub register_cancel: String,
    pub register_first: String,
    pub try_help: String,
    pub what_is_new: String,
    pub help: String,
    pub ping: String,
    /// `{name}` `{balance}` `{transactions}`
    pub profile: String,
    pub profile_admin: String,
    pub transaction_list_title: String,
    /// `{amount}` `{from}` `{to}` `{note}`
    pub transaction_list_item: String,
    pub no_note: String,
    pub empty_list: String,
    /// `{expenses}` `{income}` `{top_expense}` `{top_income}` `{transactions}`
    pub stats: String,
    pub cannot_accept_own: String,
    pub cannot_cancel_foreign: String,
    /// `{amount}`
    pub transaction_success: String,
    pub transaction_cancel: String,
    /// `{amount}` `{name}`
    pub notification_give: String,
    /// `{amount}` `{name}`
    pub notification_request: String,
    pub ledger_unavailable: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub message_text: String,
    #[serde(default)]
    pub thumb_url: Option<String>,
}

impl Article {
    fn new(title: &str, description: &str, message_text: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            message_text: message_text.to_string(),
            thumb_url: None,
        }
    }
}

impl Default for Article {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InlineTexts {
    /// `{balance}` in title and message text.
    pub balance: Article,
    pub not_registered: Article,
    pub integer_overflow: Article,
    pub payload_overflow: Article,
    pub insufficient_funds: Article,
    /// `{amount}` in title and message text, `{note}` in description.
    pub give: Article,
    /// `{amount}` in title and message text, `{note}` in description.
    pub request: Article,
    pub no_note: String,
    /// Appended to an offer's message text when it carries a note. `{note}`
    pub note_suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyboardLabels {
    pub yes: String,
    pub no: String,
    /// Accept button on a give offer.
    pub receive: String,
    /// Accept button on a request offer.
    pub give: String,
    pub cancel: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            start: "Hi! I keep track of bc balances and move them between friends.".to_string(),
            register: "You don't have an account yet. Create one now?".to_string(),
            register_success: "Your account is ready.".to_string(),
            register_cancel: "Registration cancelled. Send /start whenever you change your mind."
                .to_string(),
            register_first: "Register first: open a private chat with me and send /start."
                .to_string(),
            try_help: "Send /help to see what I can do.".to_string(),
            what_is_new: "<b>What's new</b>\nOffers now show up right in the inline menu."
                .to_string(),
            help: "<b>Commands</b>\n/profile - your balance\n/transactions - history\n\
                   /stats - totals\n/ping - am I alive?\n\n\
                   Type my username followed by an amount and an optional note in any chat \
                   to give or request bc."
                .to_string(),
            ping: "pong".to_string(),
            profile: "<b>{name}</b>\nBalance: {balance} bc\nTransactions: {transactions}"
                .to_string(),
            profile_admin: "\nAdministrator".to_string(),
            transaction_list_title: "<b>Transactions</b>\n".to_string(),
            transaction_list_item: "{amount} bc: {from} → {to} ({note})\n".to_string(),
            no_note: "no message".to_string(),
            empty_list: "nothing here yet".to_string(),
            stats: "Spent: {expenses} bc\nReceived: {income} bc\n\
                    Largest payment: {top_expense} bc\nLargest income: {top_income} bc\n\
                    Transactions: {transactions}"
                .to_string(),
            cannot_accept_own: "You can't accept your own offer.".to_string(),
            cannot_cancel_foreign: "Only the author can cancel this offer.".to_string(),
            transaction_success: "✅ Transferred {amount} bc".to_string(),
            transaction_cancel: "❌ Offer cancelled".to_string(),
            notification_give: "{name} accepted your {amount} bc".to_string(),
            notification_request: "{name} paid your request for {amount} bc".to_string(),
            ledger_unavailable: "The bank is not answering right now, try again later."
                .to_string(),
        }
    }
}

impl Default for InlineTexts {
    fn default() -> Self {
        Self {
            balance: Article::new(
                "Balance: {balance} bc",
                "Share your balance",
                "My balance is {balance} bc",
            ),
            not_registered: Article::new(
                "You are not registered",
                "Open a private chat with the bot and send /start",
                "I need to register before I can send bc.",
            ),
            integer_overflow: Article::new(
                "That amount is too large",
                "Amounts must be below 4294967295",
                "I tried to send an impossibly large amount.",
            ),
            payload_overflow: Article::new(
                "Message is too long",
                "Shorten the note to fit the button",
                "My note was too long to attach to an offer.",
            ),
            insufficient_funds: Article::new(
                "Not enough bc",
                "Your balance is too low to give this amount",
                "I wanted to give bc but my balance is too low.",
            ),
            give: Article::new("Give {amount} bc", "{note}", "🎁 I'm giving <b>{amount} bc</b>"),
            request: Article::new(
                "Request {amount} bc",
                "{note}",
                "🙏 I'm asking for <b>{amount} bc</b>",
            ),
            no_note: "no message".to_string(),
            note_suffix: "\n<i>{note}</i>".to_string(),
        }
    }
}

impl Default for KeyboardLabels {
    fn default() -> Self {
        Self {
            yes: "Yes".to_string(),
            no: "No".to_string(),
            receive: "Take".to_string(),
            give: "Pay".to_string(),
            cancel: "Cancel".to_string(),
        }
    }
}

/// Substitute `{key}` placeholders. Unknown placeholders are left as-is.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Escape user text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}
