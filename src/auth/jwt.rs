use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::Config,
    errors::AppError,
    models::{
        jwt::{AccessClaims, RefreshClaims, ACCESS_TOKEN_TYPE, REFRESH_TOKEN_TYPE},
        user::UserPublic,
    },
};

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// 16 random bytes, base64url without padding.
pub fn random_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct Keys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Why an access token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenError {
    /// Bad signature, malformed token or expired.
    Invalid,
    /// Verified, but the claims are not an access token's.
    BadClaims,
}

/// Signing material for both token kinds, built once from [`Config`].
#[derive(Clone)]
pub struct JwtKeys {
    access: Keys,
    refresh: Keys,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

fn validation() -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.leeway = 0;
    v
}

impl JwtKeys {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        Self {
            access: Keys::new(access_secret.as_bytes()),
            refresh: Keys::new(refresh_secret.as_bytes()),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            &cfg.jwt_access_secret,
            &cfg.jwt_refresh_secret,
            cfg.jwt_access_ttl_seconds,
            cfg.jwt_refresh_ttl_seconds,
        )
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    pub fn new_access_claims(&self, user: &UserPublic) -> AccessClaims {
        let now = Utc::now().timestamp();
        AccessClaims {
            user_id: user.id.clone(),
            username: user.username.clone(),
            typ: ACCESS_TOKEN_TYPE.into(),
            exp: now + self.access_ttl_seconds,
            iat: now,
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn new_refresh_claims(&self, user_id: &str) -> RefreshClaims {
        let now = Utc::now().timestamp();
        RefreshClaims {
            user_id: user_id.to_string(),
            jti: random_jti(),
            typ: REFRESH_TOKEN_TYPE.into(),
            exp: now + self.refresh_ttl_seconds,
            iat: now,
        }
    }

    pub fn make_access_token(&self, claims: &AccessClaims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.access.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign access token");
            AppError::Jwt
        })
    }

    pub fn make_refresh_token(&self, claims: &RefreshClaims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.refresh.encoding).map_err(|e| {
            tracing::error!(error = %e, "failed to sign refresh token");
            AppError::Jwt
        })
    }

    /// Verifies signature and expiry, then checks the claims describe an
    /// access token with a string `user_id`.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, AccessTokenError> {
        let data = decode::<AccessClaims>(token, &self.access.decoding, &validation()).map_err(
            |e| match e.kind() {
                ErrorKind::Json(_) => AccessTokenError::BadClaims,
                _ => {
                    tracing::debug!(error = %e, "access token rejected");
                    AccessTokenError::Invalid
                }
            },
        )?;

        if data.claims.typ != ACCESS_TOKEN_TYPE {
            return Err(AccessTokenError::BadClaims);
        }
        Ok(data.claims)
    }

    pub fn decode_refresh_token(
        &self,
        token: &str,
    ) -> Result<RefreshClaims, jsonwebtoken::errors::Error> {
        decode::<RefreshClaims>(token, &self.refresh.decoding, &validation()).map(|d| d.claims)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new("access-secret", "refresh-secret", 900, 3600)
    }

    fn user() -> UserPublic {
        UserPublic {
            id: "65f0c0ffee0000000000beef".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            created_at: "2024-01-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let keys = keys();
        let claims = keys.new_access_claims(&user());
        let token = keys.make_access_token(&claims).unwrap();

        let decoded = keys.decode_access_token(&token).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.exp - decoded.iat, 900);
    }

    #[test]
    fn tokens_are_bound_to_their_own_secret() {
        let keys = keys();
        let refresh = keys
            .make_refresh_token(&keys.new_refresh_claims("u1"))
            .unwrap();
        assert_eq!(
            keys.decode_access_token(&refresh),
            Err(AccessTokenError::Invalid)
        );

        let access = keys
            .make_access_token(&keys.new_access_claims(&user()))
            .unwrap();
        assert!(keys.decode_refresh_token(&access).is_err());
    }

    #[test]
    fn expired_access_token_is_invalid() {
        let keys = keys();
        let mut claims = keys.new_access_claims(&user());
        claims.exp = Utc::now().timestamp() - 5;
        let token = keys.make_access_token(&claims).unwrap();
        assert_eq!(
            keys.decode_access_token(&token),
            Err(AccessTokenError::Invalid)
        );
    }

    #[test]
    fn non_string_user_id_is_bad_claims() {
        let keys = keys();
        let exp = Utc::now().timestamp() + 60;
        let forged = json!({
            "user_id": 42,
            "username": "alice",
            "type": "access",
            "exp": exp,
            "iat": exp - 60,
            "jti": "x",
        });
        let token = encode(&Header::default(), &forged, &keys.access.encoding).unwrap();
        assert_eq!(
            keys.decode_access_token(&token),
            Err(AccessTokenError::BadClaims)
        );
    }

    #[test]
    fn wrong_type_is_bad_claims() {
        let keys = keys();
        let mut claims = keys.new_access_claims(&user());
        claims.typ = "refresh".into();
        let token = keys.make_access_token(&claims).unwrap();
        assert_eq!(
            keys.decode_access_token(&token),
            Err(AccessTokenError::BadClaims)
        );
    }

    #[test]
    fn refresh_jti_is_unique() {
        let keys = keys();
        let a = keys.new_refresh_claims("u1");
        let b = keys.new_refresh_claims("u1");
        assert_ne!(a.jti, b.jti);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a.jti).unwrap().len(), 16);
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dea2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
