use serde::Deserialize;
use validator::Validate;

use crate::models::product::ProductPatch;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 3, max = 100, message = "name must be 3-100 characters"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: String,
    #[validate(range(exclusive_min = 0.0, message = "price must be greater than 0"))]
    pub price: f64,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 3, max = 100, message = "name must be 3-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "price must be greater than 0"))]
    pub price: Option<f64>,
}

impl From<UpdateProductRequest> for ProductPatch {
    fn from(r: UpdateProductRequest) -> Self {
        Self {
            name: r.name,
            description: r.description,
            price: r.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_must_be_positive() {
        let req = CreateProductRequest {
            name: "Widget".into(),
            description: String::new(),
            price: 0.0,
        };
        assert!(req.validate().is_err());

        let req = CreateProductRequest { price: 9.99, ..req };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_checks_only_present_fields() {
        assert!(UpdateProductRequest::default().validate().is_ok());

        let req = UpdateProductRequest {
            name: Some("ab".into()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }
}
