use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub username: String,
    pub email: String,

    pub password_hash: String,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<BsonDateTime>,
}

impl UserDoc {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: ObjectId::new(),
            username,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// A user without credentials: what gets cached, attached to requests and
/// returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

impl From<UserDoc> for UserPublic {
    fn from(u: UserDoc) -> Self {
        Self {
            id: u.id.to_hex(),
            username: u.username,
            email: u.email,
            created_at: bson_to_rfc3339(u.created_at),
        }
    }
}

pub(crate) fn bson_to_rfc3339(dt: BsonDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(dt.timestamp_millis())
        .unwrap_or_default()
        .to_rfc3339()
}

#[cfg(test)]
mod tests {
    use mongodb::bson;

    use super::*;

    #[test]
    fn live_user_is_stored_without_deleted_at() {
        let mut user = UserDoc::new("alice".into(), "alice@example.com".into(), "hash".into());
        let stored = bson::to_document(&user).unwrap();
        assert!(!stored.contains_key("deleted_at"));

        user.deleted_at = Some(BsonDateTime::now());
        let stored = bson::to_document(&user).unwrap();
        assert!(stored.get_datetime("deleted_at").is_ok());
    }

    #[test]
    fn public_view_drops_credentials() {
        let user = UserDoc::new("alice".into(), "alice@example.com".into(), "hash".into());
        let id = user.id.to_hex();
        let public = UserPublic::from(user);
        assert_eq!(public.id, id);
        assert!(!serde_json::to_string(&public).unwrap().contains("hash"));
    }
}
