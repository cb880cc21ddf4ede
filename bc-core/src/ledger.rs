use crate::error::Result;
use crate::types::{
    AccountId, AccountProfile, InteractionHandle, Registration, SettlementRecord,
    TransferRequest, UserId,
};
use async_trait::async_trait;

/// The bank that owns balances and history.
///
/// Every call is one blocking round trip. Implementations never retry on
/// their own, so a failed `transfer` has either not happened or is visible
/// in the next `get_history`.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Short backend label for logs and health output.
    fn backend(&self) -> &str;

    async fn resolve_account(&self, user: UserId) -> Result<AccountId>;

    async fn get_account(&self, account: &AccountId) -> Result<AccountProfile>;

    async fn get_history(&self, account: &AccountId) -> Result<Vec<SettlementRecord>>;

    async fn transfer(&self, request: TransferRequest) -> Result<SettlementRecord>;

    async fn register_user(&self, registration: Registration) -> Result<AccountId>;

    /// Find a settlement spawned by `handle` in `account`'s history.
    ///
    /// The default scans the whole history. Backends with an index on the
    /// origin handle should override it.
    async fn find_settlement(
        &self,
        account: &AccountId,
        handle: &InteractionHandle,
    ) -> Result<Option<SettlementRecord>> {
        let history = self.get_history(account).await?;
        Ok(history
            .into_iter()
            .find(|record| record.origin_handle.as_ref() == Some(handle)))
    }
}
