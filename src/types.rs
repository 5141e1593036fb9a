use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[repr(transparent)]
pub struct UserID(pub i64);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[repr(transparent)]
pub struct Username(pub String);

/// A bcrypt hash string. The salt and cost are embedded in it.
#[derive(Clone, Deserialize, Serialize)]
#[repr(transparent)]
pub struct HashedPassword(pub String);

impl std::fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HashedPassword(..)")
    }
}

/// A persisted username to password-hash mapping.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub id: UserID,
    pub username: Username,
    pub password_hash: HashedPassword,
}

/// The caller's identity, attached to a request once its token has been admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: UserID,
    pub username: Username,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct Claims {
    #[serde(rename = "userId")]
    pub(crate) user_id: i64,
    pub(crate) username: String,
    pub(crate) iat: u64,
    pub(crate) exp: u64,
    pub(crate) iss: String,
    pub(crate) jti: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            user_id: UserID(claims.user_id),
            username: Username(claims.username),
        }
    }
}
