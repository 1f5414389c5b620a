use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub user_id: String,
    pub username: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RefreshClaims {
    pub user_id: String,
    pub jti: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub exp: i64,
    pub iat: i64,
}
