mod common;

use runtime_core::model::Tenant;
use runtime_core::repo::TenantRepo;
use runtime_core::storage::Storage;
use std::sync::Arc;

#[test]
fn tenant_repo_persists_across_reloads() {
    let path = common::temp_storage_path("storage-reload");
    {
        let storage = Arc::new(Storage::new(&path).unwrap());
        let repo = TenantRepo::load(storage).unwrap();
        repo.upsert(common::tenant("t1", 42)).unwrap();
    }
    {
        let storage = Arc::new(Storage::new(&path).unwrap());
        let repo = TenantRepo::load(storage).unwrap();
        let tenant: Tenant = repo.get("t1").unwrap();
        assert_eq!(tenant.token_balance, 42);
    }
}

#[test]
fn try_debit_refuses_when_balance_insufficient() {
    let path = common::temp_storage_path("storage-debit-refuse");
    let storage = Arc::new(Storage::new(&path).unwrap());
    let repo = TenantRepo::load(storage).unwrap();
    repo.upsert(common::tenant("t1", 2)).unwrap();

    assert!(repo.try_debit("t1", 5).is_err());
    // A failed debit must not mutate the balance (P3).
    assert_eq!(repo.get("t1").unwrap().token_balance, 2);
}

#[test]
fn try_debit_commits_when_balance_sufficient() {
    let path = common::temp_storage_path("storage-debit-ok");
    let storage = Arc::new(Storage::new(&path).unwrap());
    let repo = TenantRepo::load(storage).unwrap();
    repo.upsert(common::tenant("t1", 10)).unwrap();

    let remaining = repo.try_debit("t1", 4).unwrap();
    assert_eq!(remaining, 6);
    assert_eq!(repo.get("t1").unwrap().token_balance, 6);
}
