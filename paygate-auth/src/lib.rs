// Authentication for paygate internal endpoints

pub mod api_key;
pub mod error;
pub mod principal;

pub use api_key::{API_KEY_HEADER, InternalApiKeyFilter, UNAUTHORIZED_BODY};
pub use error::{AuthError, Result};
pub use principal::{Principal, ServicePrincipal};
