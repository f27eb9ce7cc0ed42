//! Persistence boundary for work orders and their audit entries.
//!
//! The core only talks to storage through [`WorkOrderRepository`]. Real
//! deployments implement it over their database; [`InMemoryWorkOrderStore`]
//! backs the tests and the demo binary.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::lifecycle::{AuditEntry, WorkOrder};

/// Repository trait for work-order persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkOrderRepository: Send + Sync {
    /// Load a work order by id.
    async fn load_work_order(&self, id: &str) -> Result<WorkOrder, StorageError>;

    /// Replace the stored work order if its stored version still equals
    /// `expected_version`; otherwise fail with `VersionMismatch`.
    /// The caller is responsible for bumping `order.version`.
    async fn save_work_order(
        &self,
        order: &WorkOrder,
        expected_version: u64,
    ) -> Result<(), StorageError>;

    /// Append one audit entry to the work order's log.
    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// All audit entries for a work order, in insertion order.
    async fn load_audit_entries(&self, work_order_id: &str)
    -> Result<Vec<AuditEntry>, StorageError>;
}

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<String, WorkOrder>,
    audit: HashMap<String, Vec<AuditEntry>>,
}

/// Process-local repository. Not durable.
#[derive(Debug, Default)]
pub struct InMemoryWorkOrderStore {
    tables: RwLock<Tables>,
}

impl InMemoryWorkOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly booked work order. Stands in for the external
    /// booking flow.
    pub async fn insert(&self, order: WorkOrder) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(StorageError::AlreadyExists(order.id));
        }
        tables.audit.entry(order.id.clone()).or_default();
        tables.orders.insert(order.id.clone(), order);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WorkOrderRepository for InMemoryWorkOrderStore {
    async fn load_work_order(&self, id: &str) -> Result<WorkOrder, StorageError> {
        self.tables
            .read()
            .await
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn save_work_order(
        &self,
        order: &WorkOrder,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StorageError::NotFound(order.id.clone()))?;
        if stored.version != expected_version {
            return Err(StorageError::VersionMismatch {
                expected: expected_version,
                actual: stored.version,
            });
        }
        *stored = order.clone();
        Ok(())
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.orders.contains_key(&entry.work_order_id) {
            return Err(StorageError::NotFound(entry.work_order_id.clone()));
        }
        tables
            .audit
            .entry(entry.work_order_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn load_audit_entries(
        &self,
        work_order_id: &str,
    ) -> Result<Vec<AuditEntry>, StorageError> {
        let tables = self.tables.read().await;
        if !tables.orders.contains_key(work_order_id) {
            return Err(StorageError::NotFound(work_order_id.to_string()));
        }
        Ok(tables.audit.get(work_order_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Domain;

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = InMemoryWorkOrderStore::new();
        assert!(store.is_empty().await);
        store.insert(WorkOrder::new("DLV-1", Domain::Delivery)).await.unwrap();
        let err = store
            .insert(WorkOrder::new("DLV-1", Domain::Delivery))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::AlreadyExists("DLV-1".into()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn save_checks_version() {
        let store = InMemoryWorkOrderStore::new();
        store.insert(WorkOrder::new("RPR-1", Domain::Repair)).await.unwrap();

        let mut order = store.load_work_order("RPR-1").await.unwrap();
        order.version = 1;
        store.save_work_order(&order, 0).await.unwrap();

        let err = store.save_work_order(&order, 0).await.unwrap_err();
        assert_eq!(
            err,
            StorageError::VersionMismatch {
                expected: 0,
                actual: 1
            }
        );
    }

    #[tokio::test]
    async fn unknown_work_order_is_not_found() {
        let store = InMemoryWorkOrderStore::new();
        assert_eq!(
            store.load_work_order("nope").await.unwrap_err(),
            StorageError::NotFound("nope".into())
        );
        assert!(store.load_audit_entries("nope").await.is_err());
    }
}
