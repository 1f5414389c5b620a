use std::collections::HashMap;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use parking_lot::RwLock;

use super::{ProductStore, RefreshTokenStore, StoreResult, UserStore};
use crate::{
    errors::AppError,
    models::{
        product::{ProductDoc, ProductPatch},
        refresh_token::RefreshTokenDoc,
        user::UserDoc,
    },
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<ObjectId, UserDoc>>,
    refresh_tokens: RwLock<HashMap<ObjectId, RefreshTokenDoc>>,
    products: RwLock<HashMap<ObjectId, ProductDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a token row's expiry, for simulating aged tokens.
    pub fn set_refresh_token_expiry(&self, token_hash: &str, expires_at: BsonDateTime) {
        let mut rows = self.refresh_tokens.write();
        if let Some(row) = rows.values_mut().find(|r| r.token_hash == token_hash) {
            row.expires_at = expires_at;
        }
    }

    /// Hard-deletes a user, leaving their tokens behind.
    pub fn remove_user(&self, id: &ObjectId) {
        self.users.write().remove(id);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &UserDoc) -> StoreResult<()> {
        let mut users = self.users.write();
        if users
            .values()
            .any(|u| u.email == user.email || u.username == user.username)
        {
            return Err(AppError::Conflict("user already exists".into()));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<UserDoc>> {
        Ok(self
            .users
            .read()
            .get(id)
            .filter(|u| u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserDoc>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.email == email && u.deleted_at.is_none())
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserDoc>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username && u.deleted_at.is_none())
            .cloned())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert(&self, token: &RefreshTokenDoc) -> StoreResult<()> {
        let mut rows = self.refresh_tokens.write();
        if rows.values().any(|r| r.token_hash == token.token_hash) {
            return Err(AppError::Conflict("duplicate refresh token".into()));
        }
        rows.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        token_hash: &str,
        now: BsonDateTime,
    ) -> StoreResult<Option<RefreshTokenDoc>> {
        Ok(self
            .refresh_tokens
            .read()
            .values()
            .find(|r| r.token_hash == token_hash && r.is_active(now))
            .cloned())
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenDoc>> {
        Ok(self
            .refresh_tokens
            .read()
            .values()
            .find(|r| r.token_hash == token_hash && r.deleted_at.is_none())
            .cloned())
    }

    async fn soft_delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut rows = self.refresh_tokens.write();
        match rows.get_mut(id) {
            Some(row) if row.deleted_at.is_none() => {
                row.deleted_at = Some(BsonDateTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list(&self) -> StoreResult<Vec<ProductDoc>> {
        let mut products: Vec<_> = self
            .products
            .read()
            .values()
            .filter(|p| p.deleted_at.is_none())
            .cloned()
            .collect();
        products.sort_by_key(|p| p.created_at);
        Ok(products)
    }

    async fn insert(&self, product: &ProductDoc) -> StoreResult<()> {
        self.products.write().insert(product.id, product.clone());
        Ok(())
    }

    async fn find(&self, id: &ObjectId) -> StoreResult<Option<ProductDoc>> {
        Ok(self
            .products
            .read()
            .get(id)
            .filter(|p| p.deleted_at.is_none())
            .cloned())
    }

    async fn update(&self, id: &ObjectId, patch: &ProductPatch) -> StoreResult<Option<ProductDoc>> {
        let mut products = self.products.write();
        Ok(products
            .get_mut(id)
            .filter(|p| p.deleted_at.is_none())
            .map(|p| {
                patch.apply(p);
                p.clone()
            }))
    }

    async fn soft_delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let mut products = self.products.write();
        match products.get_mut(id) {
            Some(p) if p.deleted_at.is_none() => {
                p.deleted_at = Some(BsonDateTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
