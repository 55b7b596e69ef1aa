//! Bearer token acquisition: static keys and OAuth2 client credentials.

pub mod client_credentials;
pub mod credentials;
pub mod error;
pub mod token;

pub use client_credentials::{ClientCredentialsProvider, REQUIRED_SCOPE};
pub use credentials::{resolve, Credentials, StaticTokenProvider, TokenProvider};
pub use error::AuthError;
pub use token::Token;
