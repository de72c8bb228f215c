//! Remote workspace directory access: credentials, HTTP client, factory.

mod client;
mod credentials;
mod factory;

pub use client::{classify, ApiRequest, GoogleClient};
pub use credentials::{DelegatedSession, ScopedToken, ServiceAccountKey, StaticToken, TokenSource};
pub use factory::{scope_for, ClientFactory, Endpoints};
