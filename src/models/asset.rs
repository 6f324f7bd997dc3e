// Asset catalogue: equipment on the shop floor and the sites that host it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    #[default]
    Active,
    Maintenance,
    OutOfService,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Active => "active",
            EquipmentStatus::Maintenance => "maintenance",
            EquipmentStatus::OutOfService => "out_of_service",
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EquipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(EquipmentStatus::Active),
            "maintenance" => Ok(EquipmentStatus::Maintenance),
            "out_of_service" => Ok(EquipmentStatus::OutOfService),
            other => Err(format!(
                "unknown equipment status '{}': expected active, maintenance or out_of_service",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: EquipmentStatus,
    pub location: Option<String>,
    pub site_id: Option<i64>,
    pub production_line_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEquipment {
    pub name: String,
    pub description: Option<String>,
    pub status: EquipmentStatus,
    pub location: Option<String>,
    pub site_id: Option<i64>,
    pub production_line_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// A production line, optionally attached to a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionLine {
    pub id: i64,
    pub site_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProductionLine {
    pub site_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
}

/// Equipment counters shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_equipment: i64,
    pub active_equipment: i64,
    pub maintenance_equipment: i64,
    pub out_of_service_equipment: i64,
}

impl DashboardStats {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = EquipmentStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut stats, status| {
            stats.total_equipment += 1;
            match status {
                EquipmentStatus::Active => stats.active_equipment += 1,
                EquipmentStatus::Maintenance => stats.maintenance_equipment += 1,
                EquipmentStatus::OutOfService => stats.out_of_service_equipment += 1,
            }
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!(
            "out_of_service".parse::<EquipmentStatus>().unwrap(),
            EquipmentStatus::OutOfService
        );
        assert_eq!("ACTIVE".parse::<EquipmentStatus>().unwrap(), EquipmentStatus::Active);
        assert!("broken".parse::<EquipmentStatus>().is_err());
        assert_eq!(EquipmentStatus::Maintenance.to_string(), "maintenance");
    }

    #[test]
    fn test_dashboard_stats_from_statuses() {
        let stats = DashboardStats::from_statuses([
            EquipmentStatus::Active,
            EquipmentStatus::Active,
            EquipmentStatus::Maintenance,
            EquipmentStatus::OutOfService,
        ]);
        assert_eq!(stats.total_equipment, 4);
        assert_eq!(stats.active_equipment, 2);
        assert_eq!(stats.maintenance_equipment, 1);
        assert_eq!(stats.out_of_service_equipment, 1);
    }

    #[test]
    fn test_dashboard_stats_empty() {
        assert_eq!(DashboardStats::from_statuses(Vec::new()), DashboardStats::default());
    }
}
