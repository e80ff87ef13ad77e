use async_trait::async_trait;

use empload_core::{BatchRecords, Department, SessionOption, SessionSetting};

use crate::error::StoreError;

/// Opens sessions against one store.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Short engine name used in logs.
    fn engine(&self) -> &'static str;

    async fn connect(&self) -> Result<Self::Session, StoreError>;
}

/// A single live connection to the store.
#[async_trait]
pub trait Session: Send {
    /// Current raw value of `option`, as the store spells it.
    async fn read_option(&mut self, option: SessionOption) -> Result<String, StoreError>;

    /// Change an option. Returns [`StoreError::Unsupported`] when the store
    /// has no equivalent or refuses the change for lack of privileges.
    async fn apply_setting(&mut self, setting: SessionSetting) -> Result<(), StoreError>;

    /// Put back a raw value previously returned by [`Session::read_option`].
    async fn restore_option(&mut self, option: SessionOption, raw: &str)
    -> Result<(), StoreError>;

    /// Create the four tables when they are missing.
    async fn provision_schema(&mut self) -> Result<(), StoreError>;

    /// Insert departments whose code is not present yet. Existing rows are
    /// left untouched.
    async fn seed_departments(&mut self, departments: &[Department]) -> Result<(), StoreError>;

    async fn count_employees(&mut self) -> Result<u64, StoreError>;

    /// Insert all records of a batch inside one transaction. On error nothing
    /// of the batch is visible.
    async fn insert_batch(&mut self, records: &BatchRecords) -> Result<(), StoreError>;

    /// Ask the planner to refresh table statistics.
    async fn refresh_statistics(&mut self) -> Result<(), StoreError>;

    async fn close(self) -> Result<(), StoreError>;
}
