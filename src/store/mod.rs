//! Storage traits. Every finder skips soft-deleted rows.

pub mod memory;
pub mod mongo;

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};

use crate::{
    errors::AppError,
    models::{
        product::{ProductDoc, ProductPatch},
        refresh_token::RefreshTokenDoc,
        user::UserDoc,
    },
};

pub use self::{memory::MemoryStore, mongo::MongoStore};

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. A taken email or username yields [`AppError::Conflict`].
    async fn insert(&self, user: &UserDoc) -> StoreResult<()>;

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<UserDoc>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserDoc>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserDoc>>;

    /// Round-trip to the backing store, for health checks.
    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Inserts a token row. A duplicate `token_hash` yields [`AppError::Conflict`].
    async fn insert(&self, token: &RefreshTokenDoc) -> StoreResult<()>;

    /// Row matching `token_hash` that is not soft-deleted and expires after `now`.
    async fn find_active(
        &self,
        token_hash: &str,
        now: BsonDateTime,
    ) -> StoreResult<Option<RefreshTokenDoc>>;

    /// Row matching `token_hash` that is not soft-deleted, expired or not.
    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenDoc>>;

    /// Marks a row deleted. Returns false if it was already gone.
    async fn soft_delete(&self, id: &ObjectId) -> StoreResult<bool>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<ProductDoc>>;

    async fn insert(&self, product: &ProductDoc) -> StoreResult<()>;

    async fn find(&self, id: &ObjectId) -> StoreResult<Option<ProductDoc>>;

    /// Applies `patch` and returns the updated row, or `None` if there is none.
    async fn update(&self, id: &ObjectId, patch: &ProductPatch) -> StoreResult<Option<ProductDoc>>;

    async fn soft_delete(&self, id: &ObjectId) -> StoreResult<bool>;
}

/// The three stores, as handed to [`crate::state::AppState`].
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub products: Arc<dyn ProductStore>,
}

impl Stores {
    /// Backed by a caller-held [`MemoryStore`], so tests can reach into it.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            products: store,
        }
    }

    pub fn mongo(store: MongoStore) -> Self {
        let store = Arc::new(store);
        Self {
            users: store.clone(),
            refresh_tokens: store.clone(),
            products: store,
        }
    }
}
