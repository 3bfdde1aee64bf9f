//! Inventory collaborator.
//!
//! Stock is shared across every job, so each call applies a whole batch of
//! movements atomically or not at all. Stock is keyed by part code and
//! supplier; blank supplier references are refused.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMove {
    pub item_code: String,
    pub supplier_name: String,
    pub quantity: u32,
}

#[async_trait]
pub trait Inventory: Send + Sync {
    /// Decrement stock for every move, or for none.
    async fn take(&self, moves: &[StockMove]) -> EngineResult<()>;

    /// Increment stock for every move, or for none.
    async fn restock(&self, moves: &[StockMove]) -> EngineResult<()>;
}

/// Type alias for the shared inventory handle carried in router extensions.
pub type AppInventory = Arc<dyn Inventory>;

fn validate_moves(moves: &[StockMove]) -> EngineResult<()> {
    for mv in moves {
        if mv.supplier_name.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "Supplier name is required for part {}",
                mv.item_code
            )));
        }
    }
    Ok(())
}

// ============================================================================
// In-memory inventory
// ============================================================================

#[derive(Default)]
pub struct MemoryInventory {
    stock: Mutex<HashMap<(String, String), i64>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_stock(&self, item_code: &str, supplier_name: &str, quantity: i64) {
        self.stock
            .lock()
            .await
            .insert((item_code.to_string(), supplier_name.to_string()), quantity);
    }

    pub async fn available(&self, item_code: &str, supplier_name: &str) -> i64 {
        self.stock
            .lock()
            .await
            .get(&(item_code.to_string(), supplier_name.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Inventory for MemoryInventory {
    async fn take(&self, moves: &[StockMove]) -> EngineResult<()> {
        validate_moves(moves)?;
        let mut stock = self.stock.lock().await;

        // Check the whole batch against a scratch copy before touching stock.
        let mut pending: HashMap<(String, String), i64> = HashMap::new();
        for mv in moves {
            let key = (mv.item_code.clone(), mv.supplier_name.clone());
            let on_hand = *pending
                .entry(key.clone())
                .or_insert_with(|| stock.get(&key).copied().unwrap_or(0));
            let remaining = on_hand - i64::from(mv.quantity);
            if remaining < 0 {
                return Err(EngineError::Inventory(format!(
                    "Insufficient stock for {} from {}: requested {}, available {}",
                    mv.item_code, mv.supplier_name, mv.quantity, on_hand
                )));
            }
            pending.insert(key, remaining);
        }
        stock.extend(pending);
        Ok(())
    }

    async fn restock(&self, moves: &[StockMove]) -> EngineResult<()> {
        validate_moves(moves)?;
        let mut stock = self.stock.lock().await;
        for mv in moves {
            *stock
                .entry((mv.item_code.clone(), mv.supplier_name.clone()))
                .or_insert(0) += i64::from(mv.quantity);
        }
        Ok(())
    }
}

// ============================================================================
// Postgres inventory
// ============================================================================

pub struct PgInventory {
    pool: PgPool,
}

impl PgInventory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Inventory for PgInventory {
    async fn take(&self, moves: &[StockMove]) -> EngineResult<()> {
        validate_moves(moves)?;
        let mut tx = self.pool.begin().await?;

        for mv in moves {
            let updated = sqlx::query(
                r#"
                UPDATE inventory_stock
                SET quantity = quantity - $3, updated_at = NOW()
                WHERE item_code = $1 AND supplier_name = $2 AND quantity >= $3
                "#,
            )
            .bind(&mv.item_code)
            .bind(&mv.supplier_name)
            .bind(i64::from(mv.quantity))
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                // Dropping the transaction rolls back earlier lines.
                return Err(EngineError::Inventory(format!(
                    "Insufficient stock for {} from {}: requested {}",
                    mv.item_code, mv.supplier_name, mv.quantity
                )));
            }
        }

        tx.commit().await?;
        info!(lines = moves.len(), "Inventory stock taken");
        Ok(())
    }

    async fn restock(&self, moves: &[StockMove]) -> EngineResult<()> {
        validate_moves(moves)?;
        let mut tx = self.pool.begin().await?;

        for mv in moves {
            sqlx::query(
                r#"
                INSERT INTO inventory_stock (item_code, supplier_name, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (item_code, supplier_name)
                DO UPDATE SET quantity = inventory_stock.quantity + EXCLUDED.quantity,
                              updated_at = NOW()
                "#,
            )
            .bind(&mv.item_code)
            .bind(&mv.supplier_name)
            .bind(i64::from(mv.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(lines = moves.len(), "Inventory stock returned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mv(code: &str, supplier: &str, quantity: u32) -> StockMove {
        StockMove {
            item_code: code.into(),
            supplier_name: supplier.into(),
            quantity,
        }
    }

    #[tokio::test]
    async fn take_is_all_or_nothing() {
        let inventory = MemoryInventory::new();
        inventory.set_stock("SCR-01", "Acme", 3).await;
        inventory.set_stock("BAT-02", "Acme", 1).await;

        let err = inventory
            .take(&[mv("SCR-01", "Acme", 2), mv("BAT-02", "Acme", 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Inventory(_)));
        assert_eq!(inventory.available("SCR-01", "Acme").await, 3);

        inventory.take(&[mv("SCR-01", "Acme", 2)]).await.unwrap();
        assert_eq!(inventory.available("SCR-01", "Acme").await, 1);
    }

    #[tokio::test]
    async fn repeated_codes_in_one_batch_accumulate() {
        let inventory = MemoryInventory::new();
        inventory.set_stock("SCR-01", "Acme", 3).await;
        assert!(inventory
            .take(&[mv("SCR-01", "Acme", 2), mv("SCR-01", "Acme", 2)])
            .await
            .is_err());
        assert_eq!(inventory.available("SCR-01", "Acme").await, 3);
    }

    #[tokio::test]
    async fn blank_supplier_is_refused() {
        let inventory = MemoryInventory::new();
        assert!(matches!(
            inventory.restock(&[mv("SCR-01", " ", 1)]).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn restock_creates_or_adds() {
        let inventory = MemoryInventory::new();
        inventory.restock(&[mv("SCR-01", "Acme", 2)]).await.unwrap();
        inventory.restock(&[mv("SCR-01", "Acme", 1)]).await.unwrap();
        assert_eq!(inventory.available("SCR-01", "Acme").await, 3);
    }
}
