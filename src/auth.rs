use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{AuthError, StoreError},
    types::{Claims, CredentialRecord, HashedPassword, Identity, UserID, Username},
};

/// bcrypt work factor used for every stored password.
pub const DEFAULT_PASSWORD_COST: u32 = 10;

/// bcrypt only reads this many bytes of input. Longer passwords are refused
/// rather than silently truncated.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Persist a new credential record and return its id. Must fail with
    /// [`StoreError::Constraint`] if the username is already taken, leaving the
    /// existing record untouched.
    async fn insert_user(
        &self,
        username: &Username,
        hashed_password: &HashedPassword,
    ) -> Result<UserID, StoreError>;

    /// Retrieve the credential record for a username, if one exists.
    async fn find_user(&self, username: &Username) -> Result<Option<CredentialRecord>, StoreError>;
}

#[derive(Clone)]
pub struct AuthConfig {
    /// The issuer for auth tokens. We will validate that all auth tokens match the given issuer.
    pub auth_token_issuer: String,
    /// The secret used to sign JWT authorization tokens.
    /// If the secret changes, all currently authenticated sessions will be terminated.
    pub auth_token_secret: String,
    /// How long auth tokens should remain valid for. After this interval, the client will have to re-login.
    pub auth_token_lifetime: Duration,
    pub password_hash_cost: u32,
    /// Report "user not found" and "incorrect password" as separate messages on login.
    pub distinct_login_errors: bool,
    pub credential_store: Arc<dyn CredentialStore>,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>, credential_store: Arc<dyn CredentialStore>) -> Self {
        Self {
            auth_token_issuer: "hospital-crm".into(),
            auth_token_secret: secret.into(),
            auth_token_lifetime: DEFAULT_TOKEN_LIFETIME,
            password_hash_cost: DEFAULT_PASSWORD_COST,
            distinct_login_errors: false,
            credential_store,
        }
    }
}

struct AuthInternal {
    config: AuthConfig,
}

impl AuthInternal {
    // bcrypt is slow on purpose; keep it off the async workers
    async fn hash(&self, password: &str) -> Result<HashedPassword, AuthError> {
        let password = password.to_owned();
        let cost = self.config.password_hash_cost;
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(HashedPassword(hashed))
    }

    async fn verify_hash(&self, password: &str, hash: &HashedPassword) -> Result<bool, AuthError> {
        // no stored password is this long, and bcrypt would compare only a prefix
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        let password = password.to_owned();
        let hash = hash.0.clone();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
        Ok(matches)
    }

    fn generate_token_at(&self, identity: &Identity, issued_at: u64) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: identity.user_id.0,
            username: identity.username.0.clone(),
            iat: issued_at,
            exp: issued_at + self.config.auth_token_lifetime.as_secs(),
            iss: self.config.auth_token_issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.auth_token_secret.as_ref()),
        )
        .map_err(|source| AuthError::TokenSigningError { source })
    }

    fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.auth_token_issuer]);
        validation.leeway = 0;

        let token = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.auth_token_secret.as_ref()),
            &validation,
        )?;

        Ok(token.claims)
    }
}

/// Password verification plus token issuing and checking, sharing one
/// configuration. Cheap to clone.
#[derive(Clone)]
pub struct Auth {
    internal: Arc<AuthInternal>,
}

impl Auth {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            internal: Arc::new(AuthInternal { config }),
        }
    }

    /// Hash the password and store a new credential record.
    ///
    /// The hash is computed before anything is written, so a hashing failure
    /// never leaves a partial record behind.
    pub async fn register(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<CredentialRecord, AuthError> {
        if username.0.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::PasswordTooLong);
        }

        let password_hash = self.internal.hash(password).await?;

        let id = match self
            .internal
            .config
            .credential_store
            .insert_user(username, &password_hash)
            .await
        {
            Ok(id) => id,
            Err(StoreError::Constraint) => return Err(AuthError::UsernameAlreadyTaken),
            Err(e) => return Err(e.into()),
        };

        info!(user_id = id.0, username = %username.0, "registered staff account");

        Ok(CredentialRecord {
            id,
            username: username.clone(),
            password_hash,
        })
    }

    /// Check a password against the stored hash for `username`.
    pub async fn verify(&self, username: &Username, password: &str) -> Result<bool, AuthError> {
        let record = self.find(username).await?;
        self.internal.verify_hash(password, &record.password_hash).await
    }

    /// Verify the credentials and mint a token for the account.
    pub async fn login(&self, username: &Username, password: &str) -> Result<String, AuthError> {
        let distinct = self.internal.config.distinct_login_errors;

        let record = match self.find(username).await {
            Ok(record) => record,
            Err(AuthError::UserNotFound) if !distinct => return Err(AuthError::LoginFailed),
            Err(e) => return Err(e),
        };

        if !self
            .internal
            .verify_hash(password, &record.password_hash)
            .await?
        {
            warn!(username = %username.0, "failed login attempt");
            return Err(if distinct {
                AuthError::IncorrectPassword
            } else {
                AuthError::LoginFailed
            });
        }

        let token = self.issue(&Identity {
            user_id: record.id,
            username: record.username,
        })?;

        info!(username = %username.0, "login successful");

        Ok(token)
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        self.internal.generate_token_at(identity, now_secs())
    }

    /// Validate a presented token and recover the identity it was issued to.
    /// Pure: no storage access, so the same token yields the same answer until it expires.
    pub fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = self.internal.verify_token(token)?;
        debug!(username = %claims.username, "admitted token");
        Ok(claims.into())
    }

    async fn find(&self, username: &Username) -> Result<CredentialRecord, AuthError> {
        self.internal
            .config
            .credential_store
            .find_user(username)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
