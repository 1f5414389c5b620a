use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{ClientOptions, IndexOptions, ReturnDocument},
    Client, Collection, Database, IndexModel,
};

use super::{ProductStore, RefreshTokenStore, StoreResult, UserStore};
use crate::{
    errors::AppError,
    models::{
        product::{ProductDoc, ProductPatch},
        refresh_token::RefreshTokenDoc,
        user::UserDoc,
    },
};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
    users: Collection<UserDoc>,
    refresh_tokens: Collection<RefreshTokenDoc>,
    products: Collection<ProductDoc>,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> mongodb::error::Result<Self> {
        let mut opts = ClientOptions::parse(uri).await?;
        opts.app_name = Some("starter-api".to_string());
        let client = Client::with_options(opts)?;
        let db = client.database(db_name);

        let store = Self {
            users: db.collection("users"),
            refresh_tokens: db.collection("refresh_tokens"),
            products: db.collection("products"),
            db,
        };
        store.ensure_indexes().await?;
        tracing::info!(db = db_name, "connected to mongodb");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        self.users.create_index(unique(doc! { "email": 1 })).await?;
        self.users
            .create_index(unique(doc! { "username": 1 }))
            .await?;
        self.refresh_tokens
            .create_index(unique(doc! { "token_hash": 1 }))
            .await?;
        self.refresh_tokens
            .create_index(unique(doc! { "jti": 1 }))
            .await?;
        self.refresh_tokens
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await?;
        Ok(())
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY
    )
}

fn insert_error(e: mongodb::error::Error, what: &str) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Conflict(format!("{what} already exists"))
    } else {
        e.into()
    }
}

fn not_deleted() -> Document {
    doc! { "deleted_at": { "$exists": false } }
}

fn live(mut filter: Document) -> Document {
    filter.extend(not_deleted());
    filter
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert(&self, user: &UserDoc) -> StoreResult<()> {
        self.users
            .insert_one(user)
            .await
            .map_err(|e| insert_error(e, "user"))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<UserDoc>> {
        Ok(self.users.find_one(live(doc! { "_id": *id })).await?)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserDoc>> {
        Ok(self.users.find_one(live(doc! { "email": email })).await?)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserDoc>> {
        Ok(self
            .users
            .find_one(live(doc! { "username": username }))
            .await?)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MongoStore {
    async fn insert(&self, token: &RefreshTokenDoc) -> StoreResult<()> {
        self.refresh_tokens
            .insert_one(token)
            .await
            .map_err(|e| insert_error(e, "refresh token"))?;
        Ok(())
    }

    async fn find_active(
        &self,
        token_hash: &str,
        now: BsonDateTime,
    ) -> StoreResult<Option<RefreshTokenDoc>> {
        Ok(self
            .refresh_tokens
            .find_one(live(doc! {
                "token_hash": token_hash,
                "expires_at": { "$gt": now },
            }))
            .await?)
    }

    async fn find_by_hash(&self, token_hash: &str) -> StoreResult<Option<RefreshTokenDoc>> {
        Ok(self
            .refresh_tokens
            .find_one(live(doc! { "token_hash": token_hash }))
            .await?)
    }

    async fn soft_delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let res = self
            .refresh_tokens
            .update_one(
                live(doc! { "_id": *id }),
                doc! { "$set": { "deleted_at": BsonDateTime::now() } },
            )
            .await?;
        Ok(res.modified_count > 0)
    }
}

#[async_trait]
impl ProductStore for MongoStore {
    async fn list(&self) -> StoreResult<Vec<ProductDoc>> {
        let cursor = self
            .products
            .find(not_deleted())
            .sort(doc! { "created_at": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert(&self, product: &ProductDoc) -> StoreResult<()> {
        self.products
            .insert_one(product)
            .await
            .map_err(|e| insert_error(e, "product"))?;
        Ok(())
    }

    async fn find(&self, id: &ObjectId) -> StoreResult<Option<ProductDoc>> {
        Ok(self.products.find_one(live(doc! { "_id": *id })).await?)
    }

    async fn update(&self, id: &ObjectId, patch: &ProductPatch) -> StoreResult<Option<ProductDoc>> {
        let mut set = doc! { "updated_at": BsonDateTime::now() };
        if let Some(name) = &patch.name {
            set.insert("name", name.clone());
        }
        if let Some(description) = &patch.description {
            set.insert("description", description.clone());
        }
        if let Some(price) = patch.price {
            set.insert("price", price);
        }

        Ok(self
            .products
            .find_one_and_update(live(doc! { "_id": *id }), doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn soft_delete(&self, id: &ObjectId) -> StoreResult<bool> {
        let res = self
            .products
            .update_one(
                live(doc! { "_id": *id }),
                doc! { "$set": { "deleted_at": BsonDateTime::now() } },
            )
            .await?;
        Ok(res.modified_count > 0)
    }
}
