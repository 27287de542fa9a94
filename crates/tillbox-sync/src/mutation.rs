//! # Remote Mutations
//!
//! The three writes the backend accepts, in their wire form.
//!
//! ## Contracts
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Kind         Table        Semantics            Key                     │
//! │  ──────────   ──────────   ──────────────────   ──────────────────────  │
//! │  sale         sales        insert only          id                      │
//! │  sale_items   sale_items   insert, one per call sale_id + product_id    │
//! │  inventory    inventory    upsert (last write)  product_id + user_id    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts go over the wire as decimal strings (`"11.00"`), never floats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tillbox_core::{InventoryRecord, SaleItem, SaleRecord};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Mutation Kind
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Sale,
    SaleItems,
    Inventory,
}

impl MutationKind {
    pub const ALL: [MutationKind; 3] = [
        MutationKind::Sale,
        MutationKind::SaleItems,
        MutationKind::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Sale => "sale",
            MutationKind::SaleItems => "sale_items",
            MutationKind::Inventory => "inventory",
        }
    }

    /// Remote table the mutation writes.
    pub fn table(&self) -> &'static str {
        match self {
            MutationKind::Sale => "sales",
            MutationKind::SaleItems => "sale_items",
            MutationKind::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleMutation {
    pub id: String,
    pub user_id: String,
    pub total_amount: String,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&SaleRecord> for SaleMutation {
    fn from(sale: &SaleRecord) -> Self {
        SaleMutation {
            id: sale.id.clone(),
            user_id: sale.user_id.clone(),
            total_amount: sale.total_amount.to_decimal_string(),
            payment_method: sale.payment_method.as_str().to_string(),
            status: sale.status.as_str().to_string(),
            created_at: sale.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItemMutation {
    pub sale_id: String,
    pub inventory_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: String,
    pub total_price: String,
}

impl From<&SaleItem> for SaleItemMutation {
    fn from(item: &SaleItem) -> Self {
        SaleItemMutation {
            sale_id: item.sale_id.clone(),
            inventory_id: item.inventory_id.clone(),
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.to_decimal_string(),
            total_price: item.total_price.to_decimal_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMutation {
    pub product_id: String,
    pub user_id: String,
    pub stock: i64,
    pub buy_price: String,
    pub sell_price: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&InventoryRecord> for InventoryMutation {
    fn from(record: &InventoryRecord) -> Self {
        InventoryMutation {
            product_id: record.product_id.clone(),
            user_id: record.user_id.clone(),
            stock: record.stock,
            buy_price: record.buy_price.to_decimal_string(),
            sell_price: record.sell_price.to_decimal_string(),
            is_active: record.is_active,
            updated_at: record.updated_at,
        }
    }
}

// =============================================================================
// Mutation
// =============================================================================

/// One remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Sale(SaleMutation),
    SaleItem(SaleItemMutation),
    Inventory(InventoryMutation),
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Sale(_) => MutationKind::Sale,
            Mutation::SaleItem(_) => MutationKind::SaleItems,
            Mutation::Inventory(_) => MutationKind::Inventory,
        }
    }

    /// JSON body sent to the backend and stored in the queue.
    pub fn to_payload(&self) -> SyncResult<Value> {
        let value = match self {
            Mutation::Sale(m) => serde_json::to_value(m)?,
            Mutation::SaleItem(m) => serde_json::to_value(m)?,
            Mutation::Inventory(m) => serde_json::to_value(m)?,
        };
        Ok(value)
    }

    /// Rebuilds a mutation from a queued payload.
    pub fn from_payload(kind: MutationKind, payload: Value) -> SyncResult<Self> {
        let invalid = |e: serde_json::Error| SyncError::InvalidPayload {
            kind: kind.to_string(),
            reason: e.to_string(),
        };

        match kind {
            MutationKind::Sale => serde_json::from_value(payload).map(Mutation::Sale),
            MutationKind::SaleItems => serde_json::from_value(payload).map(Mutation::SaleItem),
            MutationKind::Inventory => serde_json::from_value(payload).map(Mutation::Inventory),
        }
        .map_err(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tillbox_core::{Money, PaymentMethod, SaleStatus};

    #[test]
    fn test_sale_contract() {
        let sale = SaleRecord {
            id: "s1".into(),
            user_id: "u1".into(),
            total_amount: Money::from_cents(1100),
            total_profit: Money::from_cents(500),
            payment_method: PaymentMethod::Card,
            status: SaleStatus::Completed,
            created_at: "2026-10-17T09:30:00Z".parse().unwrap(),
        };

        let payload = Mutation::Sale(SaleMutation::from(&sale)).to_payload().unwrap();
        assert_eq!(
            payload,
            json!({
                "id": "s1",
                "user_id": "u1",
                "total_amount": "11.00",
                "payment_method": "card",
                "status": "completed",
                "created_at": "2026-10-17T09:30:00Z",
            })
        );
    }

    #[test]
    fn test_sale_item_contract() {
        let item = SaleItem {
            id: "i1".into(),
            sale_id: "s1".into(),
            inventory_id: "inv1".into(),
            product_id: "p1".into(),
            quantity: 2,
            unit_price: Money::from_cents(300),
            total_price: Money::from_cents(600),
        };

        let payload = Mutation::SaleItem(SaleItemMutation::from(&item))
            .to_payload()
            .unwrap();
        assert_eq!(payload["unit_price"], "3.00");
        assert_eq!(payload["total_price"], "6.00");
        assert_eq!(payload["quantity"], 2);
        // The local line id never leaves the device.
        assert!(payload.get("id").is_none());
    }

    #[test]
    fn test_inventory_contract() {
        let record = InventoryRecord::new(
            "p1",
            "u1",
            6,
            Money::from_cents(100),
            Money::from_cents(300),
        );

        let mutation = Mutation::Inventory(InventoryMutation::from(&record));
        assert_eq!(mutation.kind().table(), "inventory");

        let payload = mutation.to_payload().unwrap();
        assert_eq!(payload["stock"], 6);
        assert_eq!(payload["buy_price"], "1.00");
        assert_eq!(payload["is_active"], true);

        let back = Mutation::from_payload(MutationKind::Inventory, payload).unwrap();
        assert_eq!(back, mutation);
    }

    #[test]
    fn test_payload_kind_mismatch() {
        let err = Mutation::from_payload(MutationKind::Sale, json!({"stock": 1})).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload { .. }));
    }
}
