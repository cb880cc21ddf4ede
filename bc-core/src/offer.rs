//! Inline query answers.
//!
//! A query reads `<amount>? <note>?`: an optional run of ASCII digits, at most
//! one separating space, then everything else as the note.

use crate::codec::{self, CallbackPayload, Direction, TransferIntent};
use crate::error::CodecError;
use crate::locale::{Article, Locale, escape_html, fill};
use crate::types::{Amount, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleKind {
    Balance,
    NotRegistered,
    IntegerOverflow,
    PayloadOverflow,
    InsufficientFunds,
    Give,
    Request,
}

impl ArticleKind {
    pub fn id(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::NotRegistered => "not_registered",
            Self::IntegerOverflow => "integer_overflow",
            Self::PayloadOverflow => "payload_overflow",
            Self::InsufficientFunds => "insufficient_funds",
            Self::Give => "give",
            Self::Request => "request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub direction: Direction,
    pub intent: TransferIntent,
    pub accept: Button,
    pub cancel: Button,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineArticle {
    pub kind: ArticleKind,
    pub title: String,
    pub description: String,
    /// HTML formatted.
    pub message_text: String,
    pub thumb_url: Option<String>,
    pub offer: Option<Offer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuery<'a> {
    /// `None` when the query has no leading digits. Saturates at `u64::MAX`.
    pub amount: Option<u64>,
    pub note: Option<&'a str>,
}

pub fn parse_query(raw: &str) -> ParsedQuery<'_> {
    let digits_end = raw
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, rest) = raw.split_at(digits_end);
    let amount = (!digits.is_empty()).then(|| {
        digits.bytes().fold(0_u64, |acc, b| {
            acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
        })
    });
    let note = rest.strip_prefix(' ').unwrap_or(rest);

    ParsedQuery {
        amount,
        note: (!note.is_empty()).then_some(note),
    }
}

pub struct OfferBuilder<'a> {
    locale: &'a Locale,
}

impl<'a> OfferBuilder<'a> {
    pub fn new(locale: &'a Locale) -> Self {
        Self { locale }
    }

    pub fn build_balance_only(&self, balance: u64) -> InlineArticle {
        let balance = balance.to_string();
        let values = [("balance", balance.as_str())];
        self.plain(ArticleKind::Balance, &self.locale.inline.balance, &values)
    }

    pub fn build_not_registered(&self) -> InlineArticle {
        self.plain(
            ArticleKind::NotRegistered,
            &self.locale.inline.not_registered,
            &[],
        )
    }

    /// Answer a query typed by `initiator`, whose balance is `balance`.
    pub fn build_for_query(
        &self,
        initiator: UserId,
        raw_text: &str,
        balance: u64,
    ) -> Vec<InlineArticle> {
        let parsed = parse_query(raw_text);
        let Some(amount) = parsed.amount.filter(|amount| *amount > 0) else {
            return vec![self.build_balance_only(balance)];
        };

        let Ok(checked) = Amount::new(amount) else {
            tracing::debug!(user_id = %initiator, amount, "inline amount out of range");
            return vec![self.plain(
                ArticleKind::IntegerOverflow,
                &self.locale.inline.integer_overflow,
                &[],
            )];
        };

        let intent = TransferIntent {
            initiator,
            amount: checked,
            note: parsed.note.map(ToOwned::to_owned),
        };
        let offers = self
            .offer(Direction::Give, &intent)
            .and_then(|give| Ok((give, self.offer(Direction::Request, &intent)?)));
        let (give, request) = match offers {
            Ok(offers) => offers,
            Err(error) => {
                tracing::debug!(user_id = %initiator, %error, "inline offer does not fit a button");
                return vec![self.plain(
                    ArticleKind::PayloadOverflow,
                    &self.locale.inline.payload_overflow,
                    &[],
                )];
            }
        };

        let give = if amount > balance {
            tracing::debug!(user_id = %initiator, amount, balance, "not enough funds to give");
            self.plain(
                ArticleKind::InsufficientFunds,
                &self.locale.inline.insufficient_funds,
                &[],
            )
        } else {
            self.offer_article(ArticleKind::Give, &self.locale.inline.give, give)
        };
        let request = self.offer_article(ArticleKind::Request, &self.locale.inline.request, request);

        vec![give, request]
    }

    fn offer(&self, direction: Direction, intent: &TransferIntent) -> Result<Offer, CodecError> {
        let accept_label = match direction {
            Direction::Give => &self.locale.keyboard.receive,
            Direction::Request => &self.locale.keyboard.give,
        };
        let accept = codec::encode(&CallbackPayload::Transfer {
            direction,
            intent: intent.clone(),
        })?;
        let cancel = codec::encode(&CallbackPayload::Cancel {
            initiator: intent.initiator,
        })?;

        Ok(Offer {
            direction,
            intent: intent.clone(),
            accept: Button {
                label: accept_label.clone(),
                token: accept,
            },
            cancel: Button {
                label: self.locale.keyboard.cancel.clone(),
                token: cancel,
            },
        })
    }

    fn offer_article(&self, kind: ArticleKind, article: &Article, offer: Offer) -> InlineArticle {
        let amount = offer.intent.amount.to_string();
        let mut message_text = fill(&article.message_text, &[("amount", &amount)]);
        let description = match offer.intent.note.as_deref() {
            Some(note) => {
                message_text.push_str(&fill(
                    &self.locale.inline.note_suffix,
                    &[("note", &escape_html(note))],
                ));
                fill(&article.description, &[("note", note)])
            }
            None => self.locale.inline.no_note.clone(),
        };

        InlineArticle {
            kind,
            title: fill(&article.title, &[("amount", &amount)]),
            description,
            message_text,
            thumb_url: article.thumb_url.clone(),
            offer: Some(offer),
        }
    }

    fn plain(&self, kind: ArticleKind, article: &Article, values: &[(&str, &str)]) -> InlineArticle {
        InlineArticle {
            kind,
            title: fill(&article.title, values),
            description: fill(&article.description, values),
            message_text: fill(&article.message_text, values),
            thumb_url: article.thumb_url.clone(),
            offer: None,
        }
    }
}
