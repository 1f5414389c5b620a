use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

/// Persisted refresh token. Only the SHA-256 of the signed token is stored;
/// lookups hash the presented token and match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: ObjectId,
    pub jti: String,

    pub token_hash: String,

    pub created_at: BsonDateTime,
    pub expires_at: BsonDateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<BsonDateTime>,
}

impl RefreshTokenDoc {
    /// Usable: not soft-deleted and not yet expired at `now`.
    pub fn is_active(&self, now: BsonDateTime) -> bool {
        self.deleted_at.is_none() && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson;

    use super::*;

    fn doc(expires_in_ms: i64) -> RefreshTokenDoc {
        let now = BsonDateTime::now();
        RefreshTokenDoc {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            jti: "jti".into(),
            token_hash: "hash".into(),
            created_at: now,
            expires_at: BsonDateTime::from_millis(now.timestamp_millis() + expires_in_ms),
            deleted_at: None,
        }
    }

    #[test]
    fn active_until_expiry() {
        let now = BsonDateTime::now();
        assert!(doc(60_000).is_active(now));
        assert!(!doc(-1_000).is_active(now));
    }

    #[test]
    fn soft_deleted_is_inactive() {
        let mut d = doc(60_000);
        d.deleted_at = Some(BsonDateTime::now());
        assert!(!d.is_active(BsonDateTime::now()));
    }

    #[test]
    fn deleted_at_is_only_stored_once_set() {
        let mut d = doc(60_000);
        assert!(!bson::to_document(&d).unwrap().contains_key("deleted_at"));

        d.deleted_at = Some(BsonDateTime::now());
        assert!(bson::to_document(&d)
            .unwrap()
            .get_datetime("deleted_at")
            .is_ok());
    }
}
