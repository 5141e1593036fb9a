mod api;
mod auth;
mod authorization_header_ext;
mod clinic;
mod config;
mod error;
mod notify;
mod routes;
mod sqlite;
mod triage;
mod types;

pub use api::*;
pub use auth::*;
pub use clinic::*;
pub use config::*;
pub use error::*;
pub use notify::*;
pub use routes::*;
pub use sqlite::*;
pub use triage::*;
pub use types::*;
