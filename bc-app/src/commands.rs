//! Chat command handlers.

use crate::gateway::{Gateway, actor_from};
use anyhow::Result;
use bc_channels::{InboundMessage, InlineButton, InlineKeyboard};
use bc_core::codec::{self, CallbackPayload};
use bc_core::locale::{escape_html, fill};
use bc_core::{AccountId, GatewayError, Locale, SettlementRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    New,
    Ping,
    Profile,
    Transactions,
    Stats,
}

impl BotCommand {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "new" => Some(Self::New),
            "ping" => Some(Self::Ping),
            "profile" => Some(Self::Profile),
            "transactions" => Some(Self::Transactions),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

/// Non-command text and unknown commands are ignored.
#[tracing::instrument(level = "debug", skip_all, fields(user_id = message.sender.id))]
pub async fn handle_command(gw: &Gateway, message: &InboundMessage) -> Result<()> {
    let Some(command) = message.command().and_then(BotCommand::parse) else {
        return Ok(());
    };
    tracing::debug!(?command, "command received");

    let messages = &gw.locale.messages;
    let user_chat = message.sender.id;
    match command {
        BotCommand::Start => start(gw, message).await,
        BotCommand::Help => gw.transport.reply_to(message.message, &messages.help).await,
        BotCommand::New => gw
            .transport
            .send_message(user_chat, &messages.what_is_new, None)
            .await
            .map(|_| ()),
        BotCommand::Ping => gw.transport.reply_to(message.message, &messages.ping).await,
        BotCommand::Profile => {
            let Some(account) = account_or_reply(gw, message).await? else {
                return Ok(());
            };
            let profile = match gw.ledger.get_account(&account).await {
                Ok(profile) => profile,
                Err(error) => return reply_ledger_error(gw, message, error).await,
            };
            let balance = profile.balance.to_string();
            let transactions = profile.transaction_count.to_string();
            let name = escape_html(&profile.name);
            let mut text = fill(
                &messages.profile,
                &[
                    ("name", name.as_str()),
                    ("balance", balance.as_str()),
                    ("transactions", transactions.as_str()),
                ],
            );
            if profile.is_admin {
                text.push_str(&messages.profile_admin);
            }
            gw.transport
                .send_message(user_chat, &text, None)
                .await
                .map(|_| ())
        }
        BotCommand::Transactions => {
            let Some(history) = history_or_reply(gw, message).await? else {
                return Ok(());
            };
            let text = render_transactions(&gw.locale, &history.1);
            gw.transport.reply_to(message.message, &text).await
        }
        BotCommand::Stats => {
            let Some((account, records)) = history_or_reply(gw, message).await? else {
                return Ok(());
            };
            let text = compute_stats(&account, &records).render(&gw.locale);
            gw.transport.reply_to(message.message, &text).await
        }
    }
}

async fn start(gw: &Gateway, message: &InboundMessage) -> Result<()> {
    let messages = &gw.locale.messages;
    let user_chat = message.sender.id;
    gw.transport.reply_to(message.message, &messages.start).await?;
    if let Err(error) = gw.transport.send_typing(user_chat).await {
        tracing::debug!(%error, "typing indicator not sent");
    }

    let actor = actor_from(&message.sender)?;
    match gw.ledger.resolve_account(actor.id).await {
        Ok(_) => {
            let text = if gw.announcements.is_active(chrono::Utc::now()) {
                &messages.what_is_new
            } else {
                &messages.help
            };
            gw.transport
                .send_message(user_chat, text, None)
                .await
                .map(|_| ())
        }
        Err(GatewayError::NotRegistered(_)) => {
            let keyboard = registration_keyboard(&gw.locale)?;
            gw.transport
                .send_message(user_chat, &messages.register, Some(&keyboard))
                .await
                .map(|_| ())
        }
        Err(error) => reply_ledger_error(gw, message, error).await,
    }
}

fn registration_keyboard(locale: &Locale) -> Result<InlineKeyboard> {
    let button = |label: &str, accept: bool| -> Result<InlineButton> {
        Ok(InlineButton {
            text: label.to_string(),
            callback_data: codec::encode(&CallbackPayload::Register { accept })?,
        })
    };
    Ok(InlineKeyboard::row(vec![
        button(&locale.keyboard.yes, true)?,
        button(&locale.keyboard.no, false)?,
    ]))
}

/// Resolve the sender's account, answering the chat when that fails.
async fn account_or_reply(gw: &Gateway, message: &InboundMessage) -> Result<Option<AccountId>> {
    let actor = actor_from(&message.sender)?;
    match gw.ledger.resolve_account(actor.id).await {
        Ok(account) => Ok(Some(account)),
        Err(error) => {
            reply_ledger_error(gw, message, error).await?;
            Ok(None)
        }
    }
}

async fn history_or_reply(
    gw: &Gateway,
    message: &InboundMessage,
) -> Result<Option<(AccountId, Vec<SettlementRecord>)>> {
    let Some(account) = account_or_reply(gw, message).await? else {
        return Ok(None);
    };
    match gw.ledger.get_history(&account).await {
        Ok(records) => Ok(Some((account, records))),
        Err(error) => {
            reply_ledger_error(gw, message, error).await?;
            Ok(None)
        }
    }
}

async fn reply_ledger_error(
    gw: &Gateway,
    message: &InboundMessage,
    error: GatewayError,
) -> Result<()> {
    let messages = &gw.locale.messages;
    let text = match &error {
        GatewayError::NotRegistered(_) => &messages.register_first,
        GatewayError::Business(_)
        | GatewayError::Unavailable(_)
        | GatewayError::ResponseFormat(_) => {
            tracing::warn!(%error, "ledger call failed during command");
            &messages.ledger_unavailable
        }
    };
    gw.transport.reply_to(message.message, text).await
}

fn render_transactions(locale: &Locale, records: &[SettlementRecord]) -> String {
    let messages = &locale.messages;
    let mut text = messages.transaction_list_title.clone();
    for record in records {
        let amount = record.amount.to_string();
        let from = escape_html(&record.from.mention());
        let to = escape_html(&record.to.mention());
        let note = record
            .note
            .as_deref()
            .filter(|note| !note.is_empty())
            .map(escape_html)
            .unwrap_or_else(|| messages.no_note.clone());
        text.push_str(&fill(
            &messages.transaction_list_item,
            &[
                ("amount", amount.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("note", note.as_str()),
            ],
        ));
    }
    if records.is_empty() {
        text.push_str(&messages.empty_list);
    }
    text
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub expenses: u64,
    pub income: u64,
    pub top_expense: u64,
    pub top_income: u64,
    pub transactions: usize,
}

impl Stats {
    fn render(&self, locale: &Locale) -> String {
        let expenses = self.expenses.to_string();
        let income = self.income.to_string();
        let top_expense = self.top_expense.to_string();
        let top_income = self.top_income.to_string();
        let transactions = self.transactions.to_string();
        fill(
            &locale.messages.stats,
            &[
                ("expenses", expenses.as_str()),
                ("income", income.as_str()),
                ("top_expense", top_expense.as_str()),
                ("top_income", top_income.as_str()),
                ("transactions", transactions.as_str()),
            ],
        )
    }
}

/// Totals over `records` from `account`'s point of view.
pub fn compute_stats(account: &AccountId, records: &[SettlementRecord]) -> Stats {
    let mut stats = Stats {
        transactions: records.len(),
        ..Stats::default()
    };
    for record in records {
        if &record.from.id == account {
            stats.expenses = stats.expenses.saturating_add(record.amount);
            stats.top_expense = stats.top_expense.max(record.amount);
        }
        if &record.to.id == account {
            stats.income = stats.income.saturating_add(record.amount);
            stats.top_income = stats.top_income.max(record.amount);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::{BotCommand, Stats, compute_stats, render_transactions};
    use crate::config::BotConfig;
    use crate::test_support::{Sent, command, harness, sender};
    use bc_core::{AccountId, AccountRef, Locale, SettlementRecord, UserId};
    use chrono::{Duration, Utc};

    const ALICE: i64 = 11;

    fn record(from: &str, to: &str, amount: u64, note: Option<&str>) -> SettlementRecord {
        SettlementRecord {
            from: AccountRef::new(AccountId::new(from)),
            to: AccountRef::new(AccountId::new(to)),
            amount,
            note: note.map(ToOwned::to_owned),
            origin_handle: None,
        }
    }

    #[test]
    fn parse_known_commands_only() {
        assert_eq!(BotCommand::parse("start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("Stats"), Some(BotCommand::Stats));
        assert_eq!(BotCommand::parse("model"), None);
    }

    #[test]
    fn stats_split_expenses_and_income() {
        let me = AccountId::new("me");
        let records = [
            record("me", "a", 10, None),
            record("me", "b", 25, None),
            record("c", "me", 7, None),
            record("c", "d", 1000, None),
        ];
        assert_eq!(
            compute_stats(&me, &records),
            Stats {
                expenses: 35,
                income: 7,
                top_expense: 25,
                top_income: 7,
                transactions: 4,
            }
        );
        assert_eq!(compute_stats(&me, &[]), Stats::default());
    }

    #[test]
    fn transaction_list_uses_mentions_and_placeholder_note() {
        let locale = Locale::default();
        let mut named = record("a", "b", 5, Some("<3"));
        named.from.username = Some("alice".to_string());
        named.to.name = Some("Bob".to_string());
        let text = render_transactions(&locale, &[named, record("a", "b", 1, None)]);
        assert!(text.contains("5 bc: @alice → Bob (&lt;3)"), "{text}");
        assert!(text.contains("1 bc: a → b (no message)"), "{text}");

        let empty = render_transactions(&locale, &[]);
        assert!(empty.ends_with("nothing here yet"));
    }

    #[tokio::test]
    async fn start_offers_registration_to_unknown_users() {
        let h = harness(BotConfig::default());
        h.gateway
            .handle_event(command(sender(ALICE, "Alice", None), "/start"))
            .await
            .expect("handled");

        let sent = h.transport.sent();
        assert!(matches!(sent[0], Sent::Reply { .. }));
        assert_eq!(sent[1], Sent::Typing { chat_id: ALICE });
        let Sent::Message { keyboard: Some(keyboard), .. } = &sent[2] else {
            panic!("expected registration prompt, got {sent:?}");
        };
        let tokens: Vec<&str> = keyboard.inline_keyboard[0]
            .iter()
            .map(|b| b.callback_data.as_str())
            .collect();
        assert_eq!(tokens, ["register;1", "register;0"]);
    }

    #[tokio::test]
    async fn start_shows_announcement_while_active_then_help() {
        let mut cfg = BotConfig::default();
        cfg.announcements.what_is_new_until = Some(Utc::now() + Duration::days(1));
        let h = harness(cfg);
        h.ledger.open_account(UserId(ALICE as u64), "Alice", 0).await;
        h.gateway
            .handle_event(command(sender(ALICE, "Alice", None), "/start@bc_bot"))
            .await
            .expect("handled");
        let locale = Locale::default();
        assert!(h.transport.sent().contains(&Sent::Message {
            chat_id: ALICE,
            text: locale.messages.what_is_new.clone(),
            keyboard: None,
        }));

        let h = harness(BotConfig::default());
        h.ledger.open_account(UserId(ALICE as u64), "Alice", 0).await;
        h.gateway
            .handle_event(command(sender(ALICE, "Alice", None), "/start"))
            .await
            .expect("handled");
        assert!(h.transport.sent().contains(&Sent::Message {
            chat_id: ALICE,
            text: locale.messages.help.clone(),
            keyboard: None,
        }));
    }

    #[tokio::test]
    async fn profile_reports_balance_and_admin_flag() {
        let h = harness(BotConfig::default());
        h.ledger.open_account(UserId(ALICE as u64), "Alice & Co", 42).await;
        h.ledger.set_admin(UserId(ALICE as u64), true).await;

        h.gateway
            .handle_event(command(sender(ALICE, "Alice", None), "/profile"))
            .await
            .expect("handled");

        let sent = h.transport.sent();
        let Some(Sent::Message { text, .. }) = sent.first() else {
            panic!("expected profile message, got {sent:?}");
        };
        assert!(text.contains("Alice &amp; Co"), "{text}");
        assert!(text.contains("Balance: 42 bc"), "{text}");
        assert!(text.ends_with("Administrator"), "{text}");
    }

    #[tokio::test]
    async fn unregistered_profile_asks_to_register() {
        let h = harness(BotConfig::default());
        h.gateway
            .handle_event(command(sender(ALICE, "Alice", None), "/stats"))
            .await
            .expect("handled");

        let sent = h.transport.sent();
        assert!(matches!(
            sent.as_slice(),
            [Sent::Reply { text, .. }] if *text == Locale::default().messages.register_first
        ));
    }

    #[tokio::test]
    async fn plain_text_and_unknown_commands_are_ignored() {
        let h = harness(BotConfig::default());
        for text in ["hello", "/model use x"] {
            h.gateway
                .handle_event(command(sender(ALICE, "Alice", None), text))
                .await
                .expect("handled");
        }
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let h = harness(BotConfig::default());
        h.gateway
            .handle_event(command(sender(ALICE, "Alice", None), "/ping"))
            .await
            .expect("handled");
        assert!(matches!(
            h.transport.sent().as_slice(),
            [Sent::Reply { text, .. }] if text == "pong"
        ));
    }
}
