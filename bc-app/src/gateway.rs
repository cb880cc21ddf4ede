//! Event dispatcher: the transport feeds a single inbound queue, drained here.

use crate::commands;
use crate::config::{AnnouncementsConfig, BotConfig};
use crate::registration;
use anyhow::Result;
use bc_channels::{
    CallbackQuery, CallbackQueryId, ChatTransport, InboundEvent, InlineButton, InlineKeyboard,
    InlineMessageId, InlineQuery, Sender,
};
use bc_core::codec::{self, CallbackPayload};
use bc_core::{
    Actor, ChatCommand, GatewayError, Interaction, InteractionHandle, LedgerGateway, Locale,
    OfferAction, OfferBuilder, ResolutionEngine, UserId,
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Gateway {
    pub(crate) locale: Arc<Locale>,
    pub(crate) ledger: Arc<dyn LedgerGateway>,
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) announcements: AnnouncementsConfig,
    cache_time_secs: u32,
    engine: ResolutionEngine,
    inbound_rx: Mutex<mpsc::Receiver<InboundEvent>>,
}

impl Gateway {
    pub fn new(
        cfg: &BotConfig,
        locale: Arc<Locale>,
        ledger: Arc<dyn LedgerGateway>,
        transport: Arc<dyn ChatTransport>,
        inbound_rx: mpsc::Receiver<InboundEvent>,
    ) -> Self {
        Self {
            locale,
            engine: ResolutionEngine::new(ledger.clone()),
            ledger,
            transport,
            announcements: cfg.announcements.clone(),
            cache_time_secs: cfg.inline.cache_time_secs,
            inbound_rx: Mutex::new(inbound_rx),
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run_loop(shutdown).await {
                tracing::error!(%e, "gateway loop exited");
            }
        })
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn run_loop(&self, shutdown: CancellationToken) -> Result<()> {
        let mut rx = self.inbound_rx.lock().await;
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("gateway loop stopping");
                    return Ok(());
                }
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                return Ok(());
            };

            if let Err(e) = self.handle_event(event).await {
                tracing::warn!(%e, "handle_event failed");
            }
        }
    }

    pub(crate) async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Message(message) => commands::handle_command(self, &message).await,
            InboundEvent::InlineQuery(query) => self.handle_inline_query(query).await,
            InboundEvent::Callback(callback) => self.handle_callback(callback).await,
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(user_id = query.sender.id))]
    async fn handle_inline_query(&self, query: InlineQuery) -> Result<()> {
        let actor = actor_from(&query.sender)?;
        let builder = OfferBuilder::new(&self.locale);

        let articles = match self.balance_of(actor.id).await {
            Ok(balance) => builder.build_for_query(actor.id, &query.query, balance),
            Err(GatewayError::NotRegistered(_)) => vec![builder.build_not_registered()],
            Err(error) => {
                // Leave the query unanswered; the client shows its own spinner timeout.
                tracing::warn!(%error, "balance lookup failed for inline query");
                return Ok(());
            }
        };

        let articles: Vec<bc_channels::InlineArticle> =
            articles.into_iter().map(to_channel_article).collect();
        tracing::debug!(results = articles.len(), "answering inline query");
        self.transport
            .answer_inline_query(&query.id, &articles, self.cache_time_secs)
            .await
    }

    async fn balance_of(&self, user: UserId) -> Result<u64, GatewayError> {
        let account = self.ledger.resolve_account(user).await?;
        Ok(self.ledger.get_account(&account).await?.balance)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(user_id = callback.sender.id))]
    async fn handle_callback(&self, callback: CallbackQuery) -> Result<()> {
        let payload = match callback.data.as_deref().map(codec::decode) {
            Some(Ok(payload)) => payload,
            Some(Err(error)) => {
                tracing::warn!(%error, "ignoring malformed button token");
                return self.ack(&callback.id).await;
            }
            None => return self.ack(&callback.id).await,
        };

        let actor = actor_from(&callback.sender)?;
        let action = match payload {
            CallbackPayload::Register { accept } => {
                return registration::handle_register(self, &callback, &actor, accept).await;
            }
            CallbackPayload::Transfer { direction, intent } => {
                OfferAction::Accept { direction, intent }
            }
            CallbackPayload::Cancel { initiator } => OfferAction::Cancel { initiator },
        };

        let interaction = Interaction {
            action,
            actor,
            handle: callback
                .inline_message_id
                .as_ref()
                .map(|id| InteractionHandle::new(id.as_str())),
        };
        let resolution = self.engine.resolve(interaction).await;
        self.apply(&callback.id, resolution.commands(&self.locale))
            .await;
        Ok(())
    }

    /// Run every command even if an earlier one fails, so the press is
    /// always acknowledged.
    async fn apply(&self, callback_id: &CallbackQueryId, commands: Vec<ChatCommand>) {
        for command in commands {
            let result = match &command {
                ChatCommand::AnswerCallback { text, alert } => {
                    self.transport
                        .answer_callback(callback_id, text.as_deref(), *alert)
                        .await
                }
                ChatCommand::EditInline { handle, text } => {
                    self.transport
                        .edit_inline_message(&InlineMessageId::new(handle.as_str()), text)
                        .await
                }
                ChatCommand::Notify { user, text } => match i64::try_from(user.0) {
                    Ok(chat_id) => self
                        .transport
                        .send_message(chat_id, text, None)
                        .await
                        .map(|_| ()),
                    Err(e) => Err(anyhow::anyhow!("user id {user} is not a chat id: {e}")),
                },
            };
            if let Err(error) = result {
                tracing::warn!(%error, ?command, "chat command failed");
            }
        }
    }

    pub(crate) async fn ack(&self, callback_id: &CallbackQueryId) -> Result<()> {
        self.transport.answer_callback(callback_id, None, false).await
    }
}

pub(crate) fn actor_from(sender: &Sender) -> Result<Actor> {
    let id = u64::try_from(sender.id)
        .map_err(|e| anyhow::anyhow!("sender id {} is not a user id: {e}", sender.id))?;
    Ok(Actor {
        id: UserId(id),
        username: sender.username.clone(),
        first_name: sender.first_name.clone(),
        last_name: sender.last_name.clone(),
    })
}

fn to_channel_article(article: bc_core::InlineArticle) -> bc_channels::InlineArticle {
    let keyboard = article.offer.map(|offer| {
        InlineKeyboard::row(vec![
            InlineButton {
                text: offer.accept.label,
                callback_data: offer.accept.token,
            },
            InlineButton {
                text: offer.cancel.label,
                callback_data: offer.cancel.token,
            },
        ])
    });
    bc_channels::InlineArticle {
        id: article.kind.id().to_string(),
        title: article.title,
        description: article.description,
        message_text: article.message_text,
        thumbnail_url: article.thumb_url,
        keyboard,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BotConfig;
    use crate::test_support::{Sent, harness, inline_press, inline_query, sender};
    use bc_core::{UserId, codec};

    const ALICE: i64 = 1001;
    const BOB: i64 = 2002;

    fn inline_answer(sent: &[Sent]) -> Vec<bc_channels::InlineArticle> {
        sent.iter()
            .find_map(|s| match s {
                Sent::InlineAnswer { articles, .. } => Some(articles.clone()),
                _ => None,
            })
            .expect("inline answer sent")
    }

    #[tokio::test]
    async fn inline_query_offers_give_and_request_buttons() {
        let h = harness(BotConfig::default());
        h.ledger.open_account(UserId(ALICE as u64), "Alice", 100).await;

        h.gateway
            .handle_event(inline_query(sender(ALICE, "Alice", None), "50 lunch"))
            .await
            .expect("handled");

        let articles = inline_answer(&h.transport.sent());
        let ids: Vec<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["give", "request"]);
        let give_buttons = &articles[0].keyboard.as_ref().expect("keyboard").inline_keyboard[0];
        assert_eq!(give_buttons[0].callback_data, "give;1001;50;lunch");
        assert_eq!(give_buttons[1].callback_data, "cancel_request;1001");
    }

    #[tokio::test]
    async fn unregistered_inline_query_gets_single_article() {
        let h = harness(BotConfig::default());
        h.gateway
            .handle_event(inline_query(sender(ALICE, "Alice", None), "5"))
            .await
            .expect("handled");

        let articles = inline_answer(&h.transport.sent());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].id, "not_registered");
        assert!(articles[0].keyboard.is_none());
    }

    #[tokio::test]
    async fn inline_answer_uses_configured_cache_time() {
        let mut cfg = BotConfig::default();
        cfg.inline.cache_time_secs = 42;
        let h = harness(cfg);
        h.ledger.open_account(UserId(ALICE as u64), "Alice", 0).await;

        h.gateway
            .handle_event(inline_query(sender(ALICE, "Alice", None), ""))
            .await
            .expect("handled");

        assert!(matches!(
            h.transport.sent().as_slice(),
            [Sent::InlineAnswer { cache_time_secs: 42, articles, .. }] if articles.len() == 1
        ));
    }

    #[tokio::test]
    async fn accepted_give_settles_once_and_notifies_initiator() {
        let h = harness(BotConfig::default());
        h.ledger.open_account(UserId(ALICE as u64), "Alice", 100).await;
        h.ledger.open_account(UserId(BOB as u64), "Bob", 0).await;
        let token = codec::encode_transfer(
            bc_core::Direction::Give,
            UserId(ALICE as u64),
            30,
            Some("tea"),
        )
        .expect("token");

        for _ in 0..2 {
            h.gateway
                .handle_event(inline_press(sender(BOB, "Bob", Some("bob")), &token, Some("im-1")))
                .await
                .expect("handled");
        }

        assert_eq!(h.ledger.balance_of(UserId(BOB as u64)).await, Some(30));
        assert_eq!(h.ledger.transfer_calls().await, 1);

        let sent = h.transport.sent();
        assert!(sent.contains(&Sent::InlineEdit {
            inline_message_id: "im-1".to_string(),
            text: "✅ Transferred 30 bc".to_string(),
        }));
        assert!(sent.contains(&Sent::Message {
            chat_id: ALICE,
            text: "@bob accepted your 30 bc".to_string(),
            keyboard: None,
        }));
        let acks = sent
            .iter()
            .filter(|s| matches!(s, Sent::CallbackAnswer { text: None, .. }))
            .count();
        assert_eq!(acks, 2, "both presses are acknowledged silently");
    }

    #[tokio::test]
    async fn own_offer_press_is_rejected_with_toast() {
        let h = harness(BotConfig::default());
        h.ledger.open_account(UserId(ALICE as u64), "Alice", 100).await;

        h.gateway
            .handle_event(inline_press(
                sender(ALICE, "Alice", None),
                "recv;1001;5;",
                Some("im-2"),
            ))
            .await
            .expect("handled");

        assert_eq!(h.ledger.transfer_calls().await, 0);
        assert_eq!(
            h.transport.sent(),
            vec![Sent::CallbackAnswer {
                query_id: "cb".to_string(),
                text: Some("You can't accept your own offer.".to_string()),
                alert: false,
            }]
        );
    }

    #[tokio::test]
    async fn malformed_token_is_acknowledged_and_ignored() {
        let h = harness(BotConfig::default());
        h.gateway
            .handle_event(inline_press(sender(BOB, "Bob", None), "give;x;1;", Some("im-3")))
            .await
            .expect("handled");

        assert_eq!(
            h.transport.sent(),
            vec![Sent::CallbackAnswer {
                query_id: "cb".to_string(),
                text: None,
                alert: false,
            }]
        );
    }

    #[tokio::test]
    async fn author_can_cancel_open_offer() {
        let h = harness(BotConfig::default());
        h.gateway
            .handle_event(inline_press(
                sender(ALICE, "Alice", None),
                "cancel_request;1001",
                Some("im-4"),
            ))
            .await
            .expect("handled");

        assert!(h.transport.sent().contains(&Sent::InlineEdit {
            inline_message_id: "im-4".to_string(),
            text: "❌ Offer cancelled".to_string(),
        }));
    }
}
