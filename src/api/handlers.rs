use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::extract::{ApiJson, Credentials, CurrentUser};
use crate::auth::Registration;
use crate::errors::AppError;
use crate::models::asset::{
    DashboardStats, Equipment, EquipmentStatus, NewEquipment, NewProductionLine, NewSite,
    ProductionLine, Site,
};
use crate::models::user::User;
use crate::store::{AssetStore, Store, StoreError, StoreKind};
use crate::AppState;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_ASSET_NAME_LEN: usize = 200;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Deserialize)]
pub struct CreateEquipmentRequest {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub site_id: Option<i64>,
    pub production_line_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateSiteRequest {
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateProductionLineRequest {
    pub name: String,
    pub description: Option<String>,
    pub site_id: Option<i64>,
}

/// Trimmed, non-empty asset name of bounded length.
fn asset_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }
    if name.chars().count() > MAX_ASSET_NAME_LEN {
        return Err(AppError::Validation(format!(
            "name must be at most {} characters",
            MAX_ASSET_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Dangling foreign keys answer 400.
fn reference_error(e: StoreError) -> AppError {
    match e {
        StoreError::MissingReference(what) => {
            AppError::Validation(format!("{} does not exist", what))
        }
        other => other.into(),
    }
}

impl CreateEquipmentRequest {
    fn into_new_equipment(self) -> Result<NewEquipment, AppError> {
        let name = asset_name(&self.name)?;
        let status = match self.status.as_deref() {
            Some(raw) => raw.parse::<EquipmentStatus>().map_err(AppError::Validation)?,
            None => EquipmentStatus::default(),
        };
        Ok(NewEquipment {
            name,
            description: self.description,
            status,
            location: self.location,
            site_id: self.site_id,
            production_line_id: self.production_line_id,
        })
    }
}

fn database_mode(kind: StoreKind) -> &'static str {
    match kind {
        StoreKind::Postgres => "connected",
        StoreKind::Memory => "fallback",
    }
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /: welcome message
pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Maintenance Platform API is running!",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "database": database_mode(state.store.kind()),
    }))
}

/// GET /health: liveness plus a bounded database probe.
/// Answers 503 when the configured database cannot be reached.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match state.store.kind() {
        StoreKind::Memory => "fallback",
        StoreKind::Postgres => match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, state.store.ping()).await {
            Ok(Ok(())) => "available",
            Ok(Err(e)) => {
                tracing::warn!("health check: database ping failed: {}", e);
                "unavailable"
            }
            Err(_) => {
                tracing::warn!("health check: database ping timed out");
                "unavailable"
            }
        },
    };

    let (status, label, message) = if database == "unavailable" {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "database unreachable")
    } else {
        (StatusCode::OK, "healthy", "API is running")
    };

    (
        status,
        Json(json!({
            "status": label,
            "message": message,
            "environment": state.config.environment,
            "database": database,
        })),
    )
}

/// POST /api/auth/login: exchange credentials for an access token
pub async fn login(
    State(state): State<Arc<AppState>>,
    Credentials(credentials): Credentials,
) -> Result<Json<LoginResponse>, AppError> {
    let session = state
        .auth
        .login(&credentials.username, &credentials.password)
        .await?;

    Ok(Json(LoginResponse {
        access_token: session.token.token,
        token_type: "bearer",
        expires_in: session.token.expires_in,
        user: session.user,
    }))
}

/// POST /api/auth/register: create a technician account
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state
        .auth
        .register(Registration {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            first_name: payload.first_name,
            last_name: payload.last_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/auth/me: profile of the token holder
pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

/// GET /api/equipment
pub async fn list_equipment(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
) -> Result<Json<Vec<Equipment>>, AppError> {
    Ok(Json(state.store.list_equipment().await?))
}

/// POST /api/equipment
pub async fn create_equipment(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<CreateEquipmentRequest>,
) -> Result<(StatusCode, Json<Equipment>), AppError> {
    let new = payload.into_new_equipment()?;
    let equipment = state
        .store
        .insert_equipment(new)
        .await
        .map_err(reference_error)?;

    tracing::info!(
        equipment_id = equipment.id,
        created_by = %user.username,
        "equipment created"
    );
    Ok((StatusCode::CREATED, Json(equipment)))
}

/// GET /api/sites
pub async fn list_sites(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
) -> Result<Json<Vec<Site>>, AppError> {
    Ok(Json(state.store.list_sites().await?))
}

/// POST /api/sites
pub async fn create_site(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<CreateSiteRequest>,
) -> Result<(StatusCode, Json<Site>), AppError> {
    let site = state
        .store
        .insert_site(NewSite {
            name: asset_name(&payload.name)?,
            description: payload.description,
            location: payload.location,
        })
        .await?;

    tracing::info!(site_id = site.id, created_by = %user.username, "site created");
    Ok((StatusCode::CREATED, Json(site)))
}

/// GET /api/production-lines
pub async fn list_production_lines(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
) -> Result<Json<Vec<ProductionLine>>, AppError> {
    Ok(Json(state.store.list_production_lines().await?))
}

/// POST /api/production-lines
pub async fn create_production_line(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<CreateProductionLineRequest>,
) -> Result<(StatusCode, Json<ProductionLine>), AppError> {
    let line = state
        .store
        .insert_production_line(NewProductionLine {
            site_id: payload.site_id,
            name: asset_name(&payload.name)?,
            description: payload.description,
        })
        .await
        .map_err(reference_error)?;

    tracing::info!(line_id = line.id, created_by = %user.username, "production line created");
    Ok((StatusCode::CREATED, Json(line)))
}

/// GET /api/dashboard/stats
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    CurrentUser(_): CurrentUser,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(state.store.dashboard_stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, status: Option<&str>) -> CreateEquipmentRequest {
        CreateEquipmentRequest {
            name: name.into(),
            description: None,
            status: status.map(String::from),
            location: None,
            site_id: None,
            production_line_id: None,
        }
    }

    #[test]
    fn test_equipment_request_defaults_to_active() {
        let new = request("  Pompe D4 ", None).into_new_equipment().unwrap();
        assert_eq!(new.name, "Pompe D4");
        assert_eq!(new.status, EquipmentStatus::Active);
    }

    #[test]
    fn test_equipment_request_rejects_blank_name() {
        assert!(matches!(
            request("   ", None).into_new_equipment(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_equipment_request_rejects_unknown_status() {
        assert!(matches!(
            request("Pompe D4", Some("exploded")).into_new_equipment(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_asset_name_bounds() {
        assert_eq!(asset_name("  Ligne 3 ").unwrap(), "Ligne 3");
        assert!(asset_name("").is_err());
        assert!(asset_name(&"x".repeat(MAX_ASSET_NAME_LEN + 1)).is_err());
        assert!(asset_name(&"x".repeat(MAX_ASSET_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_missing_reference_is_a_validation_error() {
        let err = reference_error(StoreError::MissingReference("site".into()));
        assert!(matches!(err, AppError::Validation(ref m) if m == "site does not exist"));
        assert!(matches!(
            reference_error(StoreError::Corrupt("x".into())),
            AppError::Store(_)
        ));
    }

    #[test]
    fn test_database_mode_labels() {
        assert_eq!(database_mode(StoreKind::Postgres), "connected");
        assert_eq!(database_mode(StoreKind::Memory), "fallback");
    }
}
