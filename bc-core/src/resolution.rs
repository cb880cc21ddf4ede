//! Offer resolution.
//!
//! An offer is Open until someone settles or cancels it. The offer itself is
//! never stored: the only record of a settled offer is the ledger entry whose
//! `origin_handle` matches the rendered message, so every accept press looks
//! that entry up before asking the ledger to move money. Two presses racing
//! past the lookup can still both reach the ledger; the ledger has the last
//! word.

use crate::codec::{Direction, TransferIntent};
use crate::error::GatewayError;
use crate::ledger::LedgerGateway;
use crate::locale::{Locale, fill};
use crate::types::{AccountId, Actor, InteractionHandle, SettlementRecord, TransferRequest, UserId};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferAction {
    Accept {
        direction: Direction,
        intent: TransferIntent,
    },
    Cancel {
        initiator: UserId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub action: OfferAction,
    pub actor: Actor,
    /// `inline_message_id` of the rendered offer, if the platform sent one.
    pub handle: Option<InteractionHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Initiator,
    Acceptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    SelfInteraction,
    NotInitiator,
    NotRegistered(Party),
    /// Ledger refused the transfer; the message is shown as-is.
    Business(String),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub direction: Direction,
    pub intent: TransferIntent,
    pub acceptor: Actor,
    pub handle: InteractionHandle,
    pub record: SettlementRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Settled(Settlement),
    Cancelled { handle: InteractionHandle },
    /// The ledger already holds a settlement for this handle.
    AlreadySettled,
    Rejected(Rejection),
    /// No interaction handle to correlate with.
    Unroutable,
}

/// Transport-neutral reaction to a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Acknowledge the button press, optionally with a toast or alert.
    AnswerCallback { text: Option<String>, alert: bool },
    /// Replace the rendered offer.
    EditInline {
        handle: InteractionHandle,
        text: String,
    },
    /// Private message to a user.
    Notify { user: UserId, text: String },
}

impl Resolution {
    pub fn commands(&self, locale: &Locale) -> Vec<ChatCommand> {
        let messages = &locale.messages;
        match self {
            Self::Settled(settlement) => {
                let amount = settlement.intent.amount.to_string();
                let name = settlement.acceptor.mention();
                let notification = match settlement.direction {
                    Direction::Give => &messages.notification_give,
                    Direction::Request => &messages.notification_request,
                };
                let values = [("amount", amount.as_str()), ("name", name.as_str())];
                vec![
                    ChatCommand::EditInline {
                        handle: settlement.handle.clone(),
                        text: fill(&messages.transaction_success, &values),
                    },
                    ChatCommand::Notify {
                        user: settlement.intent.initiator,
                        text: fill(notification, &values),
                    },
                    silent_ack(),
                ]
            }
            Self::Cancelled { handle } => vec![
                ChatCommand::EditInline {
                    handle: handle.clone(),
                    text: messages.transaction_cancel.clone(),
                },
                silent_ack(),
            ],
            Self::AlreadySettled | Self::Unroutable => vec![silent_ack()],
            Self::Rejected(rejection) => {
                let (text, alert) = match rejection {
                    Rejection::SelfInteraction => (messages.cannot_accept_own.clone(), false),
                    Rejection::NotInitiator => (messages.cannot_cancel_foreign.clone(), false),
                    Rejection::NotRegistered(_) => (messages.register_first.clone(), true),
                    Rejection::Business(message) => (message.clone(), true),
                    Rejection::Unavailable(_) => (messages.ledger_unavailable.clone(), true),
                };
                vec![ChatCommand::AnswerCallback {
                    text: Some(text),
                    alert,
                }]
            }
        }
    }
}

fn silent_ack() -> ChatCommand {
    ChatCommand::AnswerCallback {
        text: None,
        alert: false,
    }
}

pub struct ResolutionEngine {
    ledger: Arc<dyn LedgerGateway>,
}

impl ResolutionEngine {
    pub fn new(ledger: Arc<dyn LedgerGateway>) -> Self {
        Self { ledger }
    }

    #[tracing::instrument(level = "info", skip_all, fields(actor = %interaction.actor.id))]
    pub async fn resolve(&self, interaction: Interaction) -> Resolution {
        let Interaction {
            action,
            actor,
            handle,
        } = interaction;

        match action {
            OfferAction::Cancel { initiator } => {
                if actor.id != initiator {
                    return Resolution::Rejected(Rejection::NotInitiator);
                }
                let Some(handle) = handle else {
                    tracing::warn!("cancel without inline message id");
                    return Resolution::Unroutable;
                };
                match self.settled_for(initiator, &handle).await {
                    Ok(true) => {
                        tracing::info!(%handle, "cancel after settlement; ignoring");
                        Resolution::AlreadySettled
                    }
                    Ok(false) => {
                        tracing::info!(%handle, "offer cancelled");
                        Resolution::Cancelled { handle }
                    }
                    Err(rejection) => {
                        tracing::warn!(?rejection, "offer left open");
                        Resolution::Rejected(rejection)
                    }
                }
            }
            OfferAction::Accept { direction, intent } => {
                if actor.id == intent.initiator {
                    return Resolution::Rejected(Rejection::SelfInteraction);
                }
                let Some(handle) = handle else {
                    tracing::warn!("accept without inline message id");
                    return Resolution::Unroutable;
                };
                match self.settle(direction, intent, actor, handle).await {
                    Ok(resolution) => resolution,
                    Err(rejection) => {
                        tracing::warn!(?rejection, "offer left open");
                        Resolution::Rejected(rejection)
                    }
                }
            }
        }
    }

    async fn settle(
        &self,
        direction: Direction,
        intent: TransferIntent,
        acceptor: Actor,
        handle: InteractionHandle,
    ) -> Result<Resolution, Rejection> {
        let initiator_account = self.account_of(intent.initiator, Party::Initiator).await?;
        let acceptor_account = self.account_of(acceptor.id, Party::Acceptor).await?;

        // The initiator is a party to every settlement of the offer, whichever
        // way the money moves, so its history is where a repeat shows up.
        let existing = self
            .ledger
            .find_settlement(&initiator_account, &handle)
            .await
            .map_err(|e| rejection_from(e, Party::Initiator))?;
        if existing.is_some() {
            tracing::info!(%handle, "offer already settled; ignoring repeat");
            return Ok(Resolution::AlreadySettled);
        }

        let (payer, payee, payer_account, payee_account) = match direction {
            Direction::Give => (
                (intent.initiator, Party::Initiator),
                (acceptor.id, Party::Acceptor),
                initiator_account,
                acceptor_account,
            ),
            Direction::Request => (
                (acceptor.id, Party::Acceptor),
                (intent.initiator, Party::Initiator),
                acceptor_account,
                initiator_account,
            ),
        };

        let record = self
            .ledger
            .transfer(TransferRequest {
                amount: intent.amount,
                from: payer_account,
                to: payee_account,
                note: intent.note.clone(),
                origin_handle: handle.clone(),
            })
            .await
            .map_err(|e| rejection_from(e, payer.1))?;

        tracing::info!(
            %handle,
            amount = %intent.amount,
            from = %payer.0,
            to = %payee.0,
            "offer settled"
        );
        Ok(Resolution::Settled(Settlement {
            direction,
            intent,
            acceptor,
            handle,
            record,
        }))
    }

    /// Whether the initiator's history already holds a settlement for `handle`.
    /// An unregistered initiator cannot have settled anything.
    async fn settled_for(
        &self,
        initiator: UserId,
        handle: &InteractionHandle,
    ) -> Result<bool, Rejection> {
        let account = match self.ledger.resolve_account(initiator).await {
            Ok(account) => account,
            Err(GatewayError::NotRegistered(_)) => return Ok(false),
            Err(e) => return Err(rejection_from(e, Party::Initiator)),
        };
        let existing = self
            .ledger
            .find_settlement(&account, handle)
            .await
            .map_err(|e| rejection_from(e, Party::Initiator))?;
        Ok(existing.is_some())
    }

    async fn account_of(&self, user: UserId, party: Party) -> Result<AccountId, Rejection> {
        self.ledger
            .resolve_account(user)
            .await
            .map_err(|e| rejection_from(e, party))
    }
}

fn rejection_from(error: GatewayError, party: Party) -> Rejection {
    match error {
        GatewayError::NotRegistered(_) => Rejection::NotRegistered(party),
        GatewayError::Business(message) => Rejection::Business(message),
        GatewayError::Unavailable(message) | GatewayError::ResponseFormat(message) => {
            Rejection::Unavailable(message)
        }
    }
}
