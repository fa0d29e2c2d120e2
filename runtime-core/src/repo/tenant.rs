use crate::model::Tenant;
use crate::storage::Storage;
use crate::{Result, RuntimeError};
use dashmap::DashMap;
use std::sync::Arc;

const KEY_PREFIX: &str = "tenant:";

/// In-memory tenant registry backed by [`Storage`]. Lock-free reads via
/// `DashMap`; writes go through storage first so a crash never leaves the
/// in-memory view ahead of disk.
pub struct TenantRepo {
    storage: Arc<Storage>,
    tenants: DashMap<String, Tenant>,
}

impl TenantRepo {
    pub fn load(storage: Arc<Storage>) -> Result<Self> {
        let existing: Vec<Tenant> = storage.scan_prefix(KEY_PREFIX)?;
        let tenants = DashMap::new();
        for t in existing {
            tenants.insert(t.id.clone(), t);
        }
        Ok(Self { storage, tenants })
    }

    fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    pub fn upsert(&self, tenant: Tenant) -> Result<()> {
        self.storage.put(Self::key(&tenant.id), &tenant)?;
        self.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Tenant> {
        self.tenants
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| RuntimeError::NotFound(format!("tenant {id}")))
    }

    /// Debits `amount` tokens from the tenant balance if sufficient, returning
    /// the post-debit balance. Single `DashMap` entry lock makes the
    /// check-then-debit atomic per tenant (I2).
    pub fn try_debit(&self, id: &str, amount: i64) -> Result<i64> {
        let mut entry = self
            .tenants
            .get_mut(id)
            .ok_or_else(|| RuntimeError::NotFound(format!("tenant {id}")))?;
        if entry.token_balance < amount {
            return Err(RuntimeError::QuotaExhausted(format!(
                "tenant {id} balance {} < requested {amount}",
                entry.token_balance
            )));
        }
        entry.token_balance -= amount;
        let snapshot = entry.clone();
        drop(entry);
        self.storage.put(Self::key(id), &snapshot)?;
        Ok(snapshot.token_balance)
    }
}
