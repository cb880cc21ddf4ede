//! Callback payload codec.
//!
//! Telegram caps `callback_data` at 64 bytes, so every button token is a short
//! `;`-delimited ASCII header followed by an optional free-text note.

use crate::error::CodecError;
use crate::types::{Amount, UserId};

pub const MAX_TOKEN_BYTES: usize = 64;
const DELIMITER: char = ';';

const TAG_GIVE: &str = "give";
const TAG_REQUEST: &str = "recv";
const TAG_CANCEL: &str = "cancel_request";
const TAG_REGISTER: &str = "register";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Initiator pays whoever accepts.
    Give,
    /// Whoever accepts pays the initiator.
    Request,
}

impl Direction {
    fn tag(self) -> &'static str {
        match self {
            Self::Give => TAG_GIVE,
            Self::Request => TAG_REQUEST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    pub initiator: UserId,
    pub amount: Amount,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPayload {
    Transfer {
        direction: Direction,
        intent: TransferIntent,
    },
    Cancel {
        initiator: UserId,
    },
    Register {
        accept: bool,
    },
}

pub fn encode(payload: &CallbackPayload) -> Result<String, CodecError> {
    let raw = match payload {
        CallbackPayload::Transfer { direction, intent } => format!(
            "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
            direction.tag(),
            intent.initiator,
            intent.amount,
            intent.note.as_deref().unwrap_or_default()
        ),
        CallbackPayload::Cancel { initiator } => format!("{TAG_CANCEL}{DELIMITER}{initiator}"),
        CallbackPayload::Register { accept } => {
            format!("{TAG_REGISTER}{DELIMITER}{}", u8::from(*accept))
        }
    };
    check_len(raw)
}

/// Encode a transfer from its raw parts, checking the amount range first.
pub fn encode_transfer(
    direction: Direction,
    initiator: UserId,
    amount: u64,
    note: Option<&str>,
) -> Result<String, CodecError> {
    let intent = TransferIntent {
        initiator,
        amount: Amount::new(amount)?,
        note: note.filter(|n| !n.is_empty()).map(ToOwned::to_owned),
    };
    encode(&CallbackPayload::Transfer { direction, intent })
}

fn check_len(raw: String) -> Result<String, CodecError> {
    if raw.len() > MAX_TOKEN_BYTES {
        return Err(CodecError::PayloadTooLarge {
            len: raw.len(),
            limit: MAX_TOKEN_BYTES,
        });
    }
    Ok(raw)
}

pub fn decode(raw: &str) -> Result<CallbackPayload, CodecError> {
    if raw.len() > MAX_TOKEN_BYTES {
        return Err(CodecError::MalformedToken(format!(
            "{} bytes exceeds {MAX_TOKEN_BYTES}",
            raw.len()
        )));
    }

    let (tag, rest) = raw.split_once(DELIMITER).unwrap_or((raw, ""));
    match tag {
        TAG_GIVE => decode_transfer(Direction::Give, rest),
        TAG_REQUEST => decode_transfer(Direction::Request, rest),
        TAG_CANCEL => Ok(CallbackPayload::Cancel {
            initiator: parse_user_id(rest)?,
        }),
        TAG_REGISTER => match rest {
            "1" => Ok(CallbackPayload::Register { accept: true }),
            "0" => Ok(CallbackPayload::Register { accept: false }),
            other => Err(CodecError::MalformedToken(format!(
                "register flag {other:?}"
            ))),
        },
        other => Err(CodecError::MalformedToken(format!(
            "unknown discriminator {other:?}"
        ))),
    }
}

fn decode_transfer(direction: Direction, rest: &str) -> Result<CallbackPayload, CodecError> {
    // The note is free text and may itself contain the delimiter.
    let mut fields = rest.splitn(3, DELIMITER);
    let initiator = parse_user_id(fields.next().unwrap_or_default())?;
    let amount_field = fields
        .next()
        .ok_or_else(|| CodecError::MalformedToken("missing amount".to_string()))?;
    let amount = parse_digits(amount_field, "amount")?;
    let amount = Amount::new(amount)
        .map_err(|_| CodecError::MalformedToken(format!("amount {amount_field:?}")))?;
    let note = fields
        .next()
        .filter(|note| !note.is_empty())
        .map(ToOwned::to_owned);

    Ok(CallbackPayload::Transfer {
        direction,
        intent: TransferIntent {
            initiator,
            amount,
            note,
        },
    })
}

fn parse_user_id(field: &str) -> Result<UserId, CodecError> {
    parse_digits(field, "initiator").map(UserId)
}

fn parse_digits(field: &str, what: &str) -> Result<u64, CodecError> {
    // `u64::from_str` accepts a leading '+', tokens never carry one.
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::MalformedToken(format!("{what} {field:?}")));
    }
    field
        .parse::<u64>()
        .map_err(|e| CodecError::MalformedToken(format!("{what} {field:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::{
        CallbackPayload, Direction, MAX_TOKEN_BYTES, TransferIntent, decode, encode,
        encode_transfer,
    };
    use crate::error::CodecError;
    use crate::types::{AMOUNT_LIMIT, Amount, UserId};

    fn transfer(direction: Direction, amount: u64, note: Option<&str>) -> CallbackPayload {
        CallbackPayload::Transfer {
            direction,
            intent: TransferIntent {
                initiator: UserId(123456789),
                amount: Amount::new(amount).expect("valid amount"),
                note: note.map(ToOwned::to_owned),
            },
        }
    }

    #[test]
    fn wire_format_matches_button_layout() {
        assert_eq!(
            encode(&transfer(Direction::Give, 50, Some("lunch"))).expect("encode"),
            "give;123456789;50;lunch"
        );
        assert_eq!(
            encode(&transfer(Direction::Request, 7, None)).expect("encode"),
            "recv;123456789;7;"
        );
        assert_eq!(
            encode(&CallbackPayload::Cancel {
                initiator: UserId(42)
            })
            .expect("encode"),
            "cancel_request;42"
        );
        assert_eq!(
            encode(&CallbackPayload::Register { accept: true }).expect("encode"),
            "register;1"
        );
    }

    #[test]
    fn decode_recovers_what_encode_wrote() {
        for payload in [
            transfer(Direction::Give, 1, None),
            transfer(Direction::Request, AMOUNT_LIMIT - 1, Some("rent")),
            transfer(Direction::Give, 99, Some("a;b;c")),
            transfer(Direction::Give, 5, Some("кофе")),
            CallbackPayload::Cancel {
                initiator: UserId(9),
            },
            CallbackPayload::Register { accept: false },
        ] {
            let raw = encode(&payload).expect("encode");
            assert_eq!(decode(&raw).expect("decode"), payload, "token {raw:?}");
        }
    }

    #[test]
    fn oversize_note_is_rejected_not_truncated() {
        let note = "x".repeat(MAX_TOKEN_BYTES);
        let err = encode_transfer(Direction::Give, UserId(1), 10, Some(&note))
            .expect_err("must not fit");
        assert!(matches!(err, CodecError::PayloadTooLarge { limit: 64, .. }));
    }

    #[test]
    fn exactly_sixty_four_bytes_fits() {
        let header = "give;1;10;";
        let note = "n".repeat(MAX_TOKEN_BYTES - header.len());
        let raw = encode_transfer(Direction::Give, UserId(1), 10, Some(&note)).expect("fits");
        assert_eq!(raw.len(), MAX_TOKEN_BYTES);
    }

    #[test]
    fn multibyte_notes_count_bytes_not_chars() {
        // 44 chars but 69 bytes once the 25 two-byte letters are encoded.
        let note = "ж".repeat(25);
        let raw = encode_transfer(Direction::Give, UserId(123456789), 100, Some(&note));
        assert!(matches!(
            raw,
            Err(CodecError::PayloadTooLarge { len: 69, limit: 64 })
        ));
        let fits = "ж".repeat(20);
        assert!(encode_transfer(Direction::Give, UserId(123456789), 100, Some(&fits)).is_ok());
    }

    #[test]
    fn encode_rejects_amount_at_limit() {
        let err = encode_transfer(Direction::Request, UserId(1), AMOUNT_LIMIT, None)
            .expect_err("limit is exclusive");
        assert!(matches!(err, CodecError::AmountOutOfRange(_)));
    }

    #[test]
    fn decode_is_defensive() {
        for raw in [
            "",
            ";",
            "give",
            "give;",
            "give;1",
            "give;abc;10;x",
            "give;1;-5;x",
            "give;1;+5;x",
            "give;1;0;x",
            "give;1;4294967295;x",
            "give;1;99999999999999999999999;x",
            "recv;;10;",
            "cancel_request",
            "cancel_request;",
            "cancel_request;1;2",
            "register;yes",
            "steal;1;10;x",
            "GIVE;1;10;x",
        ] {
            assert!(
                matches!(decode(raw), Err(CodecError::MalformedToken(_))),
                "expected malformed for {raw:?}"
            );
        }
    }

    #[test]
    fn decode_rejects_tokens_longer_than_platform_limit() {
        let raw = format!("give;1;10;{}", "x".repeat(MAX_TOKEN_BYTES));
        assert!(matches!(decode(&raw), Err(CodecError::MalformedToken(_))));
    }

    #[test]
    fn missing_note_field_decodes_as_no_note() {
        let payload = decode("recv;5;12").expect("note is optional");
        assert_eq!(payload, {
            let mut p = transfer(Direction::Request, 12, None);
            if let CallbackPayload::Transfer { intent, .. } = &mut p {
                intent.initiator = UserId(5);
            }
            p
        });
    }
}
