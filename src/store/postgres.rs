use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{AssetStore, Store, StoreError, StoreKind, UserStore};
use crate::models::asset::{
    DashboardStats, Equipment, EquipmentStatus, NewEquipment, NewProductionLine, NewSite,
    ProductionLine, Site,
};
use crate::models::user::{NewUser, User, UserRecord};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, role, is_active, created_at, updated_at";
const SITE_COLUMNS: &str = "id, name, description, location, created_at, updated_at";
const LINE_COLUMNS: &str = "id, site_id, name, description, created_at, updated_at";
const EQUIPMENT_COLUMNS: &str = "id, name, description, status, location, site_id, production_line_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Constraint names are fixed by the migrations.
fn constraint_subject(constraint: &str) -> &str {
    match constraint {
        "users_username_key" => "username",
        "users_email_lower_key" => "email",
        "equipment_site_id_fkey" => "site",
        "equipment_production_line_id_fkey" => "production line",
        "production_lines_site_id_fkey" => "site",
        other => other,
    }
}

/// Map driver errors onto the store taxonomy.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let column = db
            .constraint()
            .map(constraint_subject)
            .unwrap_or("value")
            .to_string();
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Duplicate(column),
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::MissingReference(column),
            _ => {}
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"INSERT INTO users (username, email, password_hash, first_name, last_name, role)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {}"#,
            USER_COLUMNS
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(UserRecord::try_from(row)?.user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<UserRecord>, StoreError> {
        // An exact username match wins over an email match.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"SELECT {} FROM users
               WHERE username = $1 OR LOWER(email) = LOWER($1)
               ORDER BY (username = $1) DESC
               LIMIT 1"#,
            USER_COLUMNS
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY id ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| UserRecord::try_from(r).map(|rec| rec.user))
            .collect()
    }
}

#[async_trait]
impl AssetStore for PgStore {
    async fn list_equipment(&self) -> Result<Vec<Equipment>, StoreError> {
        let rows = sqlx::query_as::<_, EquipmentRow>(&format!(
            "SELECT {} FROM equipment ORDER BY id ASC",
            EQUIPMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Equipment::try_from).collect()
    }

    async fn insert_equipment(&self, new: NewEquipment) -> Result<Equipment, StoreError> {
        let row = sqlx::query_as::<_, EquipmentRow>(&format!(
            r#"INSERT INTO equipment (name, description, status, location, site_id, production_line_id)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {}"#,
            EQUIPMENT_COLUMNS
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.status.as_str())
        .bind(&new.location)
        .bind(new.site_id)
        .bind(new.production_line_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Equipment::try_from(row)
    }

    async fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        let rows = sqlx::query_as::<_, SiteRow>(&format!(
            "SELECT {} FROM sites ORDER BY id ASC",
            SITE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Site::from).collect())
    }

    async fn insert_site(&self, new: NewSite) -> Result<Site, StoreError> {
        let row = sqlx::query_as::<_, SiteRow>(&format!(
            r#"INSERT INTO sites (name, description, location)
               VALUES ($1, $2, $3)
               RETURNING {}"#,
            SITE_COLUMNS
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.location)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(Site::from(row))
    }

    async fn list_production_lines(&self) -> Result<Vec<ProductionLine>, StoreError> {
        let rows = sqlx::query_as::<_, LineRow>(&format!(
            "SELECT {} FROM production_lines ORDER BY id ASC",
            LINE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ProductionLine::from).collect())
    }

    async fn insert_production_line(
        &self,
        new: NewProductionLine,
    ) -> Result<ProductionLine, StoreError> {
        let row = sqlx::query_as::<_, LineRow>(&format!(
            r#"INSERT INTO production_lines (site_id, name, description)
               VALUES ($1, $2, $3)
               RETURNING {}"#,
            LINE_COLUMNS
        ))
        .bind(new.site_id)
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(ProductionLine::from(row))
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, StoreError> {
        let stats = sqlx::query_as::<_, StatsRow>(
            r#"SELECT
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'active') AS active,
                   COUNT(*) FILTER (WHERE status = 'maintenance') AS maintenance,
                   COUNT(*) FILTER (WHERE status = 'out_of_service') AS out_of_service
               FROM equipment"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            total_equipment: stats.total,
            active_equipment: stats.active,
            maintenance_equipment: stats.maintenance,
            out_of_service_equipment: stats.out_of_service,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Postgres
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// -- Rows --

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("user {}: {}", row.id, e)))?;
        Ok(UserRecord {
            user: User {
                id: row.id,
                username: row.username,
                email: row.email,
                first_name: row.first_name,
                last_name: row.last_name,
                role,
                is_active: row.is_active,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            password_hash: row.password_hash,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EquipmentRow {
    id: i64,
    name: String,
    description: Option<String>,
    status: String,
    location: Option<String>,
    site_id: Option<i64>,
    production_line_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EquipmentRow> for Equipment {
    type Error = StoreError;

    fn try_from(row: EquipmentRow) -> Result<Self, Self::Error> {
        let status: EquipmentStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("equipment {}: {}", row.id, e)))?;
        Ok(Equipment {
            id: row.id,
            name: row.name,
            description: row.description,
            status,
            location: row.location,
            site_id: row.site_id,
            production_line_id: row.production_line_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SiteRow {
    id: i64,
    name: String,
    description: Option<String>,
    location: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SiteRow> for Site {
    fn from(row: SiteRow) -> Self {
        Site {
            id: row.id,
            name: row.name,
            description: row.description,
            location: row.location,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: i64,
    site_id: Option<i64>,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LineRow> for ProductionLine {
    fn from(row: LineRow) -> Self {
        ProductionLine {
            id: row.id,
            site_id: row.site_id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total: i64,
    active: i64,
    maintenance: i64,
    out_of_service: i64,
}
