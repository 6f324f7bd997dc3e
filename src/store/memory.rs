//! In-memory store used when no `DATABASE_URL` is configured, and by tests.
//!
//! A single lock guards all tables, so the uniqueness check and the insert
//! of a user happen in one critical section.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{AssetStore, Store, StoreError, StoreKind, UserStore};
use crate::auth::password;
use crate::models::asset::{
    DashboardStats, Equipment, EquipmentStatus, NewEquipment, NewProductionLine, NewSite,
    ProductionLine, Site,
};
use crate::models::user::{NewUser, Role, User, UserRecord};

/// Demo accounts available in fallback mode: (username, password, role).
pub const DEMO_ACCOUNTS: [(&str, &str, Role); 3] = [
    ("admin", "admin123", Role::Admin),
    ("super1", "super123", Role::Supervisor),
    ("tech1", "tech123", Role::Technician),
];

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    equipment: Vec<Equipment>,
    sites: Vec<Site>,
    production_lines: Vec<ProductionLine>,
    next_user_id: i64,
    next_equipment_id: i64,
    next_site_id: i64,
    next_line_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with the demo accounts and a sample site and
    /// equipment list.
    pub fn with_demo_data() -> anyhow::Result<Self> {
        let now = Utc::now();
        let mut tables = Tables::default();

        for (username, plaintext, role) in DEMO_ACCOUNTS {
            let password_hash = password::hash(plaintext)
                .map_err(|e| anyhow::anyhow!("failed to hash demo password: {}", e))?;
            tables.next_user_id += 1;
            tables.users.push(UserRecord {
                user: User {
                    id: tables.next_user_id,
                    username: username.to_string(),
                    email: format!("{}@maintenance.com", username),
                    first_name: title_case(username),
                    last_name: "User".to_string(),
                    role,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                },
                password_hash,
            });
        }

        tables.next_site_id = 1;
        tables.sites.push(Site {
            id: 1,
            name: "Site Principal".to_string(),
            description: Some("Site de production principal".to_string()),
            location: Some("Paris, France".to_string()),
            created_at: now,
            updated_at: now,
        });
        for name in ["Ligne 1", "Ligne 2"] {
            tables.next_line_id += 1;
            tables.production_lines.push(ProductionLine {
                id: tables.next_line_id,
                site_id: Some(1),
                name: name.to_string(),
                description: None,
                created_at: now,
                updated_at: now,
            });
        }

        let samples = [
            ("Compresseur A1", "Compresseur principal ligne 1", EquipmentStatus::Active, "Atelier A", 1),
            ("Convoyeur B2", "Convoyeur ligne 2", EquipmentStatus::Maintenance, "Atelier B", 2),
        ];
        for (name, description, status, location, line) in samples {
            tables.next_equipment_id += 1;
            tables.equipment.push(Equipment {
                id: tables.next_equipment_id,
                name: name.to_string(),
                description: Some(description.to_string()),
                status,
                location: Some(location.to_string()),
                site_id: Some(1),
                production_line_id: Some(line),
                created_at: now,
                updated_at: now,
            });
        }

        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    /// Flip the `is_active` flag. Returns `false` if the user does not exist.
    pub async fn set_active(&self, username: &str, active: bool) -> bool {
        let mut tables = self.tables.write().await;
        match tables.users.iter_mut().find(|r| r.user.username == username) {
            Some(record) => {
                record.user.is_active = active;
                record.user.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|r| r.user.username == new.username) {
            return Err(StoreError::Duplicate("username".into()));
        }
        if tables
            .users
            .iter()
            .any(|r| r.user.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::Duplicate("email".into()));
        }

        let now = Utc::now();
        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            role: new.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(UserRecord {
            user: user.clone(),
            password_hash: new.password_hash,
        });
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|r| r.user.username == username)
            .cloned())
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        let by_username = tables.users.iter().find(|r| r.user.username == login);
        Ok(by_username
            .or_else(|| {
                tables
                    .users
                    .iter()
                    .find(|r| r.user.email.eq_ignore_ascii_case(login))
            })
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().map(|r| r.user.clone()).collect())
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn list_equipment(&self) -> Result<Vec<Equipment>, StoreError> {
        Ok(self.tables.read().await.equipment.clone())
    }

    async fn insert_equipment(&self, new: NewEquipment) -> Result<Equipment, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(site_id) = new.site_id {
            if !tables.sites.iter().any(|s| s.id == site_id) {
                return Err(StoreError::MissingReference("site".into()));
            }
        }
        if let Some(line_id) = new.production_line_id {
            if !tables.production_lines.iter().any(|l| l.id == line_id) {
                return Err(StoreError::MissingReference("production line".into()));
            }
        }

        let now = Utc::now();
        tables.next_equipment_id += 1;
        let equipment = Equipment {
            id: tables.next_equipment_id,
            name: new.name,
            description: new.description,
            status: new.status,
            location: new.location,
            site_id: new.site_id,
            production_line_id: new.production_line_id,
            created_at: now,
            updated_at: now,
        };
        tables.equipment.push(equipment.clone());
        Ok(equipment)
    }

    async fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        Ok(self.tables.read().await.sites.clone())
    }

    async fn insert_site(&self, new: NewSite) -> Result<Site, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        tables.next_site_id += 1;
        let site = Site {
            id: tables.next_site_id,
            name: new.name,
            description: new.description,
            location: new.location,
            created_at: now,
            updated_at: now,
        };
        tables.sites.push(site.clone());
        Ok(site)
    }

    async fn list_production_lines(&self) -> Result<Vec<ProductionLine>, StoreError> {
        Ok(self.tables.read().await.production_lines.clone())
    }

    async fn insert_production_line(
        &self,
        new: NewProductionLine,
    ) -> Result<ProductionLine, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(site_id) = new.site_id {
            if !tables.sites.iter().any(|s| s.id == site_id) {
                return Err(StoreError::MissingReference("site".into()));
            }
        }

        let now = Utc::now();
        tables.next_line_id += 1;
        let line = ProductionLine {
            id: tables.next_line_id,
            site_id: new.site_id,
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        tables.production_lines.push(line.clone());
        Ok(line)
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        let tables = self.tables.read().await;
        Ok(DashboardStats::from_statuses(
            tables.equipment.iter().map(|e| e.status),
        ))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
