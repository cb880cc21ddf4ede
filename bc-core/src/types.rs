use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Exclusive upper bound for a transfer amount (`2^32 - 1`).
pub const AMOUNT_LIMIT: u64 = u32::MAX as u64;

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

id_newtype!(AccountId);
id_newtype!(InteractionHandle);

/// Platform (Telegram) user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transfer amount in the range `1..AMOUNT_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u32);

impl Amount {
    pub fn new(value: u64) -> Result<Self, CodecError> {
        if value == 0 || value >= AMOUNT_LIMIT {
            return Err(CodecError::AmountOutOfRange(value.to_string()));
        }
        // Range checked above, so the cast is lossless.
        Ok(Self(value as u32))
    }

    pub fn get(self) -> u64 {
        u64::from(self.0)
    }
}

impl TryFrom<u64> for Amount {
    type Error = CodecError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(value: Amount) -> Self {
        value.get()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The person pressing a button or typing a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Actor {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            username: None,
            first_name: String::new(),
            last_name: None,
        }
    }

    /// Full name as shown on the platform ("First Last").
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name.trim()),
            _ => self.first_name.trim().to_string(),
        }
    }

    /// `@username` when the user has one, their full name otherwise.
    pub fn mention(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => format!("@{username}"),
            None => self.full_name(),
        }
    }
}

/// A ledger account as it appears on one side of a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: AccountId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub platform_id: Option<UserId>,
}

impl AccountRef {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            name: None,
            username: None,
            platform_id: None,
        }
    }

    pub fn mention(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => format!("@{username}"),
            None => self.name.clone().unwrap_or_else(|| self.id.to_string()),
        }
    }
}

/// A transfer as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub from: AccountRef,
    pub to: AccountRef,
    pub amount: u64,
    #[serde(default)]
    pub note: Option<String>,
    /// Interaction handle of the offer that produced this settlement.
    #[serde(default)]
    pub origin_handle: Option<InteractionHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub name: String,
    pub balance: u64,
    pub is_admin: bool,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount: Amount,
    pub from: AccountId,
    pub to: AccountId,
    pub note: Option<String>,
    pub origin_handle: InteractionHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub platform_id: UserId,
    pub name: String,
    pub username: Option<String>,
}
