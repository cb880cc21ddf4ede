//! Process-local ledger for development and tests.

use crate::error::{GatewayError, Result};
use crate::ledger::LedgerGateway;
use crate::types::{
    AccountId, AccountProfile, AccountRef, Registration, SettlementRecord, TransferRequest,
    UserId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct MemoryAccount {
    id: AccountId,
    platform_id: UserId,
    name: String,
    username: Option<String>,
    balance: u64,
    is_admin: bool,
}

impl MemoryAccount {
    fn account_ref(&self) -> AccountRef {
        AccountRef {
            id: self.id.clone(),
            name: Some(self.name.clone()),
            username: self.username.clone(),
            platform_id: Some(self.platform_id),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    by_platform: HashMap<UserId, AccountId>,
    accounts: HashMap<AccountId, MemoryAccount>,
    records: Vec<SettlementRecord>,
    transfer_calls: usize,
}

pub struct MemoryLedger {
    starting_balance: u64,
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    /// Every newly registered account starts with `starting_balance`.
    pub fn new(starting_balance: u64) -> Self {
        Self {
            starting_balance,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Seed an account directly, bypassing registration.
    pub async fn open_account(&self, user: UserId, name: &str, balance: u64) -> AccountId {
        let mut state = self.state.lock().await;
        open_locked(&mut state, user, name, None, balance)
    }

    pub async fn set_admin(&self, user: UserId, is_admin: bool) {
        let mut state = self.state.lock().await;
        let Some(id) = state.by_platform.get(&user).cloned() else {
            return;
        };
        if let Some(account) = state.accounts.get_mut(&id) {
            account.is_admin = is_admin;
        }
    }

    pub async fn deposit(&self, user: UserId, amount: u64) {
        let mut state = self.state.lock().await;
        let Some(id) = state.by_platform.get(&user).cloned() else {
            return;
        };
        if let Some(account) = state.accounts.get_mut(&id) {
            account.balance = account.balance.saturating_add(amount);
        }
    }

    pub async fn balance_of(&self, user: UserId) -> Option<u64> {
        let state = self.state.lock().await;
        let id = state.by_platform.get(&user)?;
        state.accounts.get(id).map(|account| account.balance)
    }

    /// Number of `transfer` calls received, including rejected ones.
    pub async fn transfer_calls(&self) -> usize {
        self.state.lock().await.transfer_calls
    }

    pub async fn records(&self) -> Vec<SettlementRecord> {
        self.state.lock().await.records.clone()
    }
}

fn open_locked(
    state: &mut MemoryState,
    user: UserId,
    name: &str,
    username: Option<String>,
    balance: u64,
) -> AccountId {
    if let Some(existing) = state.by_platform.get(&user) {
        return existing.clone();
    }
    let id = AccountId::new(format!("acc-{}", state.accounts.len() + 1));
    state.by_platform.insert(user, id.clone());
    state.accounts.insert(
        id.clone(),
        MemoryAccount {
            id: id.clone(),
            platform_id: user,
            name: name.to_string(),
            username,
            balance,
            is_admin: false,
        },
    );
    id
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn resolve_account(&self, user: UserId) -> Result<AccountId> {
        let state = self.state.lock().await;
        state
            .by_platform
            .get(&user)
            .cloned()
            .ok_or(GatewayError::NotRegistered(user))
    }

    async fn get_account(&self, account: &AccountId) -> Result<AccountProfile> {
        let state = self.state.lock().await;
        let found = state
            .accounts
            .get(account)
            .ok_or_else(|| GatewayError::Business(format!("unknown account {account}")))?;
        let transaction_count = state
            .records
            .iter()
            .filter(|r| &r.from.id == account || &r.to.id == account)
            .count();
        Ok(AccountProfile {
            name: found.name.clone(),
            balance: found.balance,
            is_admin: found.is_admin,
            transaction_count,
        })
    }

    async fn get_history(&self, account: &AccountId) -> Result<Vec<SettlementRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|r| &r.from.id == account || &r.to.id == account)
            .cloned()
            .collect())
    }

    async fn transfer(&self, request: TransferRequest) -> Result<SettlementRecord> {
        let mut state = self.state.lock().await;
        state.transfer_calls += 1;

        if request.from == request.to {
            return Err(GatewayError::Business(
                "cannot transfer to the same account".to_string(),
            ));
        }
        let amount = request.amount.get();
        let (from, to) = match (
            state.accounts.get(&request.from),
            state.accounts.get(&request.to),
        ) {
            (Some(from), Some(to)) => (from.clone(), to.clone()),
            _ => return Err(GatewayError::Business("unknown account".to_string())),
        };
        if from.balance < amount {
            return Err(GatewayError::Business("insufficient funds".to_string()));
        }

        if let Some(account) = state.accounts.get_mut(&request.from) {
            account.balance -= amount;
        }
        if let Some(account) = state.accounts.get_mut(&request.to) {
            account.balance = account.balance.saturating_add(amount);
        }
        let record = SettlementRecord {
            from: from.account_ref(),
            to: to.account_ref(),
            amount,
            note: request.note,
            origin_handle: Some(request.origin_handle),
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn register_user(&self, registration: Registration) -> Result<AccountId> {
        let mut state = self.state.lock().await;
        Ok(open_locked(
            &mut state,
            registration.platform_id,
            &registration.name,
            registration.username,
            self.starting_balance,
        ))
    }
}
