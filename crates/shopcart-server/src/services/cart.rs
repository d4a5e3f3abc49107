//! Per-user cart: add-or-increment merge, listing, removal and quantity updates.
//!
//! A cart is created by the first add and afterwards only mutated; removing the
//! last entry leaves an empty cart behind. Entries keep insertion order through
//! the `position` column.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{Cart, CartItem};
use crate::services::catalog;

/// Result of [`add_item`]: whether the call created the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Created(Cart),
    Updated(Cart),
}

impl AddOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, AddOutcome::Created(_))
    }

    pub fn into_cart(self) -> Cart {
        match self {
            AddOutcome::Created(cart) | AddOutcome::Updated(cart) => cart,
        }
    }
}

/// Adds `quantity` units of a product. An existing entry is incremented, a new
/// one is appended after the current entries.
///
/// The increment is a single upsert inside an immediate transaction, so
/// concurrent adds for the same product accumulate instead of overwriting each
/// other.
pub fn add_item(
    conn: &mut Connection,
    user_id: &str,
    product_id: &str,
    quantity: i64,
) -> AppResult<AddOutcome> {
    if quantity < 1 {
        return Err(AppError::BadRequest(
            "Quantity must be greater than zero".into(),
        ));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if !catalog::product_exists(&tx, product_id)? {
        return Err(AppError::NotFound("Product is not available".into()));
    }

    let now = db::now();
    let created = tx.execute(
        "INSERT INTO carts (id, user_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT (user_id) DO NOTHING",
        rusqlite::params![Uuid::new_v4().to_string(), user_id, now],
    )? == 1;

    let cart_id: String = tx.query_row(
        "SELECT id FROM carts WHERE user_id = ?1",
        rusqlite::params![user_id],
        |row| row.get(0),
    )?;

    let current: Option<i64> = tx
        .query_row(
            "SELECT quantity FROM cart_items WHERE cart_id = ?1 AND product_id = ?2",
            rusqlite::params![cart_id, product_id],
            |row| row.get(0),
        )
        .optional()?;
    // SQLite would silently widen an overflowing sum to REAL.
    if current.is_some_and(|q| q.checked_add(quantity).is_none()) {
        return Err(AppError::BadRequest(
            "Quantity exceeds the maximum allowed".into(),
        ));
    }

    tx.execute(
        "INSERT INTO cart_items (cart_id, product_id, quantity, position)
         VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position), -1) + 1 FROM cart_items WHERE cart_id = ?1))
         ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity",
        rusqlite::params![cart_id, product_id, quantity],
    )?;
    touch(&tx, &cart_id, &now)?;

    let cart = load_cart(&tx, user_id)?.ok_or_else(|| {
        AppError::Internal(format!("Cart {cart_id} vanished inside its own transaction"))
    })?;
    tx.commit()?;

    if created {
        tracing::info!(user_id, cart_id = %cart.id, "Cart created");
        Ok(AddOutcome::Created(cart))
    } else {
        tracing::debug!(user_id, product_id, quantity, "Cart item merged");
        Ok(AddOutcome::Updated(cart))
    }
}

pub fn list_items(conn: &Connection, user_id: &str) -> AppResult<Vec<CartItem>> {
    load_cart(conn, user_id)?
        .map(|cart| cart.items)
        .ok_or_else(cart_not_found)
}

/// Number of distinct products in the cart; 0 when the user has no cart.
pub fn count_unique_items(conn: &Connection, user_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(ci.product_id)
         FROM carts c
         LEFT JOIN cart_items ci ON ci.cart_id = c.id
         WHERE c.user_id = ?1",
        rusqlite::params![user_id],
        |row| row.get(0),
    )?)
}

pub fn remove_item(conn: &mut Connection, user_id: &str, product_id: &str) -> AppResult<Cart> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let cart_id = cart_id_for(&tx, user_id)?.ok_or_else(cart_not_found)?;

    let affected = tx.execute(
        "DELETE FROM cart_items WHERE cart_id = ?1 AND product_id = ?2",
        rusqlite::params![cart_id, product_id],
    )?;
    if affected == 0 {
        return Err(item_not_found());
    }
    touch(&tx, &cart_id, &db::now())?;

    let cart = load_cart(&tx, user_id)?.ok_or_else(cart_not_found)?;
    tx.commit()?;

    tracing::debug!(user_id, product_id, "Cart item removed");
    Ok(cart)
}

/// Overwrites the stored quantity of an entry already in the cart.
pub fn set_quantity(
    conn: &mut Connection,
    user_id: &str,
    product_id: &str,
    quantity: i64,
) -> AppResult<Cart> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "Quantity must be greater than zero".into(),
        ));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let cart_id = cart_id_for(&tx, user_id)?.ok_or_else(cart_not_found)?;

    let affected = tx.execute(
        "UPDATE cart_items SET quantity = ?3 WHERE cart_id = ?1 AND product_id = ?2",
        rusqlite::params![cart_id, product_id, quantity],
    )?;
    if affected == 0 {
        return Err(item_not_found());
    }
    touch(&tx, &cart_id, &db::now())?;

    let cart = load_cart(&tx, user_id)?.ok_or_else(cart_not_found)?;
    tx.commit()?;

    tracing::debug!(user_id, product_id, quantity, "Cart quantity set");
    Ok(cart)
}

pub fn load_cart(conn: &Connection, user_id: &str) -> AppResult<Option<Cart>> {
    let header = conn
        .query_row(
            "SELECT id, created_at, updated_at FROM carts WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((id, created_at, updated_at)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT product_id, quantity FROM cart_items WHERE cart_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(rusqlite::params![id], |row| {
        Ok(CartItem {
            product_id: row.get(0)?,
            quantity: row.get(1)?,
        })
    })?;
    let items: Result<Vec<_>, _> = rows.collect();

    Ok(Some(Cart {
        id,
        user_id: user_id.to_string(),
        items: items?,
        created_at,
        updated_at,
    }))
}

fn cart_id_for(conn: &Connection, user_id: &str) -> AppResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM carts WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn touch(conn: &Connection, cart_id: &str, now: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE carts SET updated_at = ?2 WHERE id = ?1",
        rusqlite::params![cart_id, now],
    )?;
    Ok(())
}

fn cart_not_found() -> AppError {
    AppError::NotFound("Cart not found".into())
}

fn item_not_found() -> AppError {
    AppError::NotFound("Product not found in cart".into())
}
