use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::user::bson_to_rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub name: String,
    pub description: String,
    pub price: f64,

    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<BsonDateTime>,
}

/// Fields a partial update may touch.
#[derive(Debug, Clone, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.price.is_none()
    }

    pub fn apply(&self, product: &mut ProductDoc) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        product.updated_at = BsonDateTime::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPublic {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ProductDoc> for ProductPublic {
    fn from(p: ProductDoc) -> Self {
        Self {
            id: p.id.to_hex(),
            name: p.name,
            description: p.description,
            price: p.price,
            created_at: bson_to_rfc3339(p.created_at),
            updated_at: bson_to_rfc3339(p.updated_at),
        }
    }
}
