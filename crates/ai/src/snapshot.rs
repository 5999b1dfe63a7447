//! Input snapshots the models run on.
//!
//! These are plain values loaded by callers (infra/store adapters); this crate never
//! fetches them itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supplysight_core::{ItemId, SupplierId};

/// One supplier evaluation period. Append-only; never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub supplier_id: SupplierId,
    /// Percent, 0..=100.
    pub on_time_delivery_rate: f64,
    /// Percent, 0..=100.
    pub quality_acceptance_rate: f64,
    pub response_time_hours: f64,
    pub overall_rating: f64,
    pub evaluation_date: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Inbound,
    Outbound,
    Adjustment,
    Transfer,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "inbound",
            MovementKind::Outbound => "outbound",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Transfer => "transfer",
        }
    }

    /// Lenient parse for values read from storage; unknown kinds map to `Adjustment`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "inbound" | "in" | "receipt" => MovementKind::Inbound,
            "outbound" | "out" | "issue" | "sale" => MovementKind::Outbound,
            "transfer" => MovementKind::Transfer,
            _ => MovementKind::Adjustment,
        }
    }
}

/// A single stock movement event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub item_id: ItemId,
    pub kind: MovementKind,
    pub quantity: f64,
    /// Unit cost at the time of the movement, when the movement carries one.
    pub unit_cost: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of an inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItemSnapshot {
    pub id: ItemId,
    pub sku: String,
    pub current_stock: i64,
    pub reorder_point: i64,
    pub max_stock: i64,
    pub unit_price: f64,
    pub unit_cost: f64,
}

/// Price inputs for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricedItem {
    pub item_id: ItemId,
    pub unit_price: f64,
    pub unit_cost: f64,
}

impl From<&InventoryItemSnapshot> for PricedItem {
    fn from(item: &InventoryItemSnapshot) -> Self {
        Self {
            item_id: item.id,
            unit_price: item.unit_price,
            unit_cost: item.unit_cost,
        }
    }
}
