use warp::{http::StatusCode, reject::Reject};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,
    #[error("password is longer than bcrypt can hash")]
    PasswordTooLong,
    #[error("an account with that username already exists")]
    UsernameAlreadyTaken,
    #[error("no account with that username")]
    UserNotFound,
    #[error("password does not match")]
    IncorrectPassword,
    #[error("username or password incorrect")]
    LoginFailed,
    #[error("no bearer token provided")]
    NoTokenProvided,
    #[error("error with token")]
    TokenError {
        #[from]
        source: Option<jsonwebtoken::errors::Error>,
    },
    #[error("failed to sign token")]
    TokenSigningError {
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    #[error("error hashing or verifying password")]
    HashingError {
        #[from]
        source: bcrypt::BcryptError,
    },
    #[error("error during database operation")]
    DatabaseError {
        #[from]
        source: StoreError,
    },
    #[error("blocking task did not complete")]
    TaskError {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl Reject for AuthError {}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials | AuthError::PasswordTooLong => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound | AuthError::IncorrectPassword | AuthError::LoginFailed => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::NoTokenProvided => StatusCode::UNAUTHORIZED,
            AuthError::TokenError { .. } => StatusCode::FORBIDDEN,
            // a duplicate username surfaces as a server error, same as any failed insert
            AuthError::UsernameAlreadyTaken
            | AuthError::TokenSigningError { .. }
            | AuthError::HashingError { .. }
            | AuthError::DatabaseError { .. }
            | AuthError::TaskError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "Username and password are required",
            AuthError::PasswordTooLong => "Password must be at most 72 bytes",
            AuthError::UsernameAlreadyTaken => "Server Error (Username might already exist)",
            AuthError::UserNotFound => "User not found!",
            AuthError::IncorrectPassword => "Incorrect password!",
            AuthError::LoginFailed => "Invalid username or password",
            AuthError::NoTokenProvided => "Access Denied: No Token Provided!",
            AuthError::TokenError { .. } => "Access Denied: Invalid Token!",
            _ => "Server Error",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("record violates a uniqueness or reference constraint")]
    Constraint,
    #[error("record not found")]
    NotFound,
    #[error("storage backend failure")]
    Backend {
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("appointment references an unknown patient or doctor")]
    InvalidReference,
    #[error("no LLM backend is configured")]
    TriageUnavailable,
    #[error("LLM request failed")]
    TriageFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("error during database operation")]
    DatabaseError {
        #[from]
        source: StoreError,
    },
    #[error("blocking task did not complete")]
    TaskError {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl Reject for ApiError {}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::InvalidReference => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TriageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::TriageFailed { .. } => StatusCode::BAD_GATEWAY,
            ApiError::DatabaseError { .. } | ApiError::TaskError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            ApiError::InvalidInput(what) => format!("Invalid input: {}", what),
            ApiError::NotFound(what) => format!("{} not found", what),
            ApiError::InvalidReference => "Unknown patient or doctor".into(),
            ApiError::TriageUnavailable => "AI triage is not configured".into(),
            ApiError::TriageFailed { .. } => "AI triage failed".into(),
            _ => "Server Error".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_failures_use_distinct_statuses() {
        assert_eq!(AuthError::NoTokenProvided.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::TokenError { source: None }.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn internal_failures_are_opaque() {
        let err = AuthError::DatabaseError {
            source: StoreError::Backend {
                source: "disk I/O error at /var/lib/db".into(),
            },
        };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Server Error");

        let err = ApiError::from(StoreError::Backend {
            source: "syntax error near SELECT".into(),
        });
        assert_eq!(err.public_message(), "Server Error");
    }

    #[test]
    fn login_failures_share_a_status() {
        for err in [
            AuthError::UserNotFound,
            AuthError::IncorrectPassword,
            AuthError::LoginFailed,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
