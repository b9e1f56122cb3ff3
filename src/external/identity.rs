//! Read-only view of the identity directory.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::actor::{Account, AccountId};
use crate::error::Result;

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Look up an account by id.
    async fn account(&self, id: AccountId) -> Result<Option<Account>>;
}

/// Directory held in memory, for embedding hosts and tests.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    accounts: Arc<DashMap<AccountId, Account>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        self.accounts.insert(account.id, account);
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }
}
