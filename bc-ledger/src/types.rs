use crate::error::{LedgerError, Result};
use bc_core::{AccountId, AccountProfile, AccountRef, InteractionHandle, SettlementRecord, UserId};
use serde::Deserialize;

pub(crate) const RESOLVE_QUERY: &str =
    "query Resolve($telegramId: String!) { telegramToUserId(telegramId: $telegramId) }";

pub(crate) const PROFILE_QUERY: &str =
    "query Profile($id: ID!) { user(id: $id) { name money is_admin transactions { id } } }";

pub(crate) const HISTORY_QUERY: &str = "query History($id: ID!) { user(id: $id) { \
     transactions { money message queryId \
     fromUser { id name username telegram_id } \
     toUser { id name username telegram_id } } } }";

pub(crate) const TRANSFER_MUTATION: &str = "mutation Transfer($money: Int!, $fromUserId: ID!, \
     $toUserId: ID!, $message: String, $queryId: String) { \
     transfer(money: $money, fromUserId: $fromUserId, toUserId: $toUserId, \
     message: $message, queryId: $queryId) { money message queryId \
     fromUser { id name username telegram_id } \
     toUser { id name username telegram_id } } }";

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

impl<T> GraphQlResponse<T> {
    pub fn into_data(self) -> Result<T> {
        if !self.errors.is_empty() {
            return Err(LedgerError::GraphQl(
                self.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        self.data
            .ok_or_else(|| LedgerError::ResponseFormat("missing data".to_string()))
    }
}

/// Ids come back as strings or numbers depending on the resolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum IdValue {
    Text(String),
    Number(i64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(value) => value,
            Self::Number(value) => value.to_string(),
        }
    }

    fn as_user_id(&self) -> Option<UserId> {
        match self {
            Self::Text(value) => value.trim().parse().ok().map(UserId),
            Self::Number(value) => u64::try_from(*value).ok().map(UserId),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveData {
    #[serde(rename = "telegramToUserId")]
    pub telegram_to_user_id: Option<IdValue>,
}

impl ResolveData {
    pub fn account_id(self) -> Option<AccountId> {
        self.telegram_to_user_id
            .map(|id| AccountId::new(id.into_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserData {
    pub user: Option<UserDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub money: i64,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

impl UserDto {
    pub fn into_profile(self) -> AccountProfile {
        AccountProfile {
            name: self.name,
            balance: u64::try_from(self.money).unwrap_or(0),
            is_admin: self.is_admin,
            transaction_count: self.transactions.len(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryData {
    pub user: Option<HistoryUserDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryUserDto {
    #[serde(default)]
    pub transactions: Vec<TransactionDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransferData {
    pub transfer: Option<TransactionDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionDto {
    pub money: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "queryId", default)]
    pub query_id: Option<String>,
    #[serde(rename = "fromUser")]
    pub from_user: UserRefDto,
    #[serde(rename = "toUser")]
    pub to_user: UserRefDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserRefDto {
    pub id: IdValue,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<IdValue>,
}

impl UserRefDto {
    fn into_account_ref(self) -> AccountRef {
        AccountRef {
            platform_id: self.telegram_id.as_ref().and_then(IdValue::as_user_id),
            id: AccountId::new(self.id.into_string()),
            name: self.name,
            username: self.username.filter(|u| !u.is_empty()),
        }
    }
}

impl TransactionDto {
    pub fn into_record(self) -> SettlementRecord {
        SettlementRecord {
            from: self.from_user.into_account_ref(),
            to: self.to_user.into_account_ref(),
            amount: self.money,
            note: self.message.filter(|m| !m.is_empty()),
            origin_handle: self
                .query_id
                .filter(|q| !q.is_empty())
                .map(InteractionHandle::new),
        }
    }
}
