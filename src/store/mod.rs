pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::asset::{
    DashboardStats, Equipment, NewEquipment, NewProductionLine, NewSite, ProductionLine, Site,
};
use crate::models::user::{NewUser, User, UserRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column (username, email) already holds the value.
    #[error("duplicate value for {0}")]
    Duplicate(String),

    /// A foreign key (site, production line) points at nothing.
    #[error("referenced {0} does not exist")]
    MissingReference(String),

    /// A stored value could not be mapped back to the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Which backend is serving requests. Reported by `/` and `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// User persistence used by the authentication service.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user. Fails with [`StoreError::Duplicate`] when the
    /// username or email is taken.
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Look up by username or, failing that, by email (case-insensitive).
    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
}

/// Equipment and site catalogue.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn list_equipment(&self) -> Result<Vec<Equipment>, StoreError>;

    async fn insert_equipment(&self, new: NewEquipment) -> Result<Equipment, StoreError>;

    async fn list_sites(&self) -> Result<Vec<Site>, StoreError>;

    async fn insert_site(&self, new: NewSite) -> Result<Site, StoreError>;

    async fn list_production_lines(&self) -> Result<Vec<ProductionLine>, StoreError>;

    /// Fails with [`StoreError::MissingReference`] when `site_id` is unknown.
    async fn insert_production_line(
        &self,
        new: NewProductionLine,
    ) -> Result<ProductionLine, StoreError>;

    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError>;
}

/// Full backend surface held by the application state.
#[async_trait]
pub trait Store: UserStore + AssetStore {
    fn kind(&self) -> StoreKind;

    /// Round-trip to the backend. Used by the health check.
    async fn ping(&self) -> Result<(), StoreError>;
}
