//! REST API access: credentials, the request executor and session refresh.

mod body;
mod client;
mod credentials;
mod error;
mod query;
mod refresh;

pub use body::{RequestBody, RequestOptions, ResponseBody};
pub use client::{ApiClient, REFRESH_PATH};
pub use credentials::{Credential, CredentialKind, CredentialStore, InvalidCredential};
pub use error::{ApiError, RequestError};
pub use query::{Query, QueryValue};
pub use refresh::RefreshCoordinator;
pub use reqwest::Method;
