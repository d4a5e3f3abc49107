use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub fullname: String,
    pub handle: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub mobile_number: String,
    pub date_of_birth: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: String,
    pub fullname: String,
    pub handle: String,
    pub mobile_number: String,
    pub date_of_birth: String,
    pub created_at: String,
}

impl From<User> for UserPublic {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            fullname: u.fullname,
            handle: u.handle,
            mobile_number: u.mobile_number,
            date_of_birth: u.date_of_birth,
            created_at: u.created_at,
        }
    }
}

/// Catalog entry. `owner_id` is set for products added by a signed-in user
/// and absent for public products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(rename = "productName")]
    pub name: String,
    pub image: String,
    pub price: f64,
    pub title: String,
    pub category: String,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub created_at: String,
    pub updated_at: String,
}

/// Identity attached to a request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
}
