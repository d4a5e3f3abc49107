use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::Product;

const PRODUCT_COLUMNS: &str =
    "id, owner_id, name, image, price, title, category, description, created_at";

#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub image: String,
    pub price: Option<f64>,
    pub title: String,
    pub category: String,
    pub description: String,
}

impl NewProduct {
    fn validate(&self) -> AppResult<f64> {
        let required = [
            ("productName", &self.name),
            ("image", &self.image),
            ("title", &self.title),
            ("category", &self.category),
            ("description", &self.description),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AppError::BadRequest(format!("{field} is required")));
        }

        match self.price {
            None => Err(AppError::BadRequest("price is required".into())),
            Some(p) if !p.is_finite() || p < 0.0 => Err(AppError::BadRequest(
                "price must be a non-negative number".into(),
            )),
            Some(p) => Ok(p),
        }
    }
}

pub fn create_product(
    conn: &Connection,
    new_product: NewProduct,
    owner_id: Option<&str>,
) -> AppResult<Product> {
    let price = new_product.validate()?;

    let product = Product {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.map(str::to_string),
        name: new_product.name.trim().to_string(),
        image: new_product.image.trim().to_string(),
        price,
        title: new_product.title.trim().to_string(),
        category: new_product.category.trim().to_string(),
        description: new_product.description,
        created_at: db::now(),
    };

    conn.execute(
        "INSERT INTO products (id, owner_id, name, image, price, title, category, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            product.id,
            product.owner_id,
            product.name,
            product.image,
            product.price,
            product.title,
            product.category,
            product.description,
            product.created_at,
        ],
    )?;

    tracing::info!(product_id = %product.id, owned = product.owner_id.is_some(), "Product added");
    Ok(product)
}

pub fn list_products(conn: &Connection) -> AppResult<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map([], product_from_row)?;
    let products: Result<Vec<_>, _> = rows.collect();
    Ok(products?)
}

pub fn list_by_category(conn: &Connection, category: &str) -> AppResult<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE category = ?1 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(rusqlite::params![category], product_from_row)?;
    let products: Result<Vec<_>, _> = rows.collect();
    Ok(products?)
}

pub fn get_product(conn: &Connection, id: &str) -> AppResult<Product> {
    conn.query_row(
        &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
        rusqlite::params![id],
        product_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("Product not found".into()),
        e => AppError::Database(e),
    })
}

pub fn product_exists(conn: &Connection, id: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM products WHERE id = ?1)",
        rusqlite::params![id],
        |row| row.get(0),
    )?)
}

/// Deletes a public (ownerless) product. Cart entries pointing at it are left
/// in place; their count is logged.
pub fn delete_public_product(conn: &Connection, id: &str) -> AppResult<()> {
    let affected = conn.execute(
        "DELETE FROM products WHERE id = ?1 AND owner_id IS NULL",
        rusqlite::params![id],
    )?;

    if affected == 0 {
        return Err(AppError::NotFound("Product not found".into()));
    }

    let dangling: i64 = conn.query_row(
        "SELECT COUNT(*) FROM cart_items WHERE product_id = ?1",
        rusqlite::params![id],
        |row| row.get(0),
    )?;
    if dangling > 0 {
        tracing::warn!(product_id = %id, dangling, "Deleted product is still referenced by carts");
    }

    tracing::info!(product_id = %id, "Product deleted");
    Ok(())
}

fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        image: row.get(3)?,
        price: row.get(4)?,
        title: row.get(5)?,
        category: row.get(6)?,
        description: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
pub(crate) fn sample_product(name: &str, category: &str) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        image: format!("https://img.example/{name}.png"),
        price: Some(9.99),
        title: format!("{name} title"),
        category: category.to_string(),
        description: format!("All about {name}"),
    }
}
