// utags-store state managers
// Managers own the persisted tag state: the store itself, its data-level
// migrations, the usage ledger, and the write queue in front of it.

pub mod bookmark_store;
pub mod migration_engine;
pub mod score_ledger;
pub mod update_serializer;
