//! Inline transfer negotiation.
//!
//! Pure domain logic: button token codec, inline offer construction and the
//! offer resolution state machine. Talks to the bank only through
//! [`LedgerGateway`] and to the chat platform only through [`ChatCommand`]s.

pub mod codec;
mod error;
mod ledger;
pub mod locale;
mod memory;
pub mod offer;
pub mod resolution;
mod types;

pub use codec::{CallbackPayload, Direction, TransferIntent};
pub use error::{CodecError, GatewayError, Result};
pub use ledger::LedgerGateway;
pub use locale::Locale;
pub use memory::MemoryLedger;
pub use offer::{ArticleKind, Button, InlineArticle, Offer, OfferBuilder};
pub use resolution::{
    ChatCommand, Interaction, OfferAction, Party, Rejection, Resolution, ResolutionEngine,
};
pub use types::{
    AMOUNT_LIMIT, AccountId, AccountProfile, AccountRef, Actor, Amount, InteractionHandle,
    Registration, SettlementRecord, TransferRequest, UserId,
};
