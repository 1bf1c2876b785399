//! Remote collaborators: identity provider, role store, cart, order and
//! catalog services.
//!
//! # Architecture
//!
//! - Each collaborator is a trait so the session/cart/checkout core can run
//!   against the REST backend ([`ApiClient`]), the password identity provider
//!   ([`PasswordIdentityProvider`]), or in-memory fakes in tests
//! - The backend is source of truth - the client never trusts a mutation
//!   response body and always reads state back
//! - Every call except the catalog listing carries a bearer [`Credential`]
//!
//! # Example
//!
//! ```rust,ignore
//! use camstore_storefront::backend::{ApiClient, CartService};
//!
//! let api = ApiClient::new(&config)?;
//! let lines = api.fetch_cart(&credential).await?;
//! ```

use std::future::Future;

use thiserror::Error;

use camstore_core::{OrderId, OrderStatus, ProductId, UserId};

use crate::models::{
    AdminUser, CartLineInput, Credential, Order, OrderDraft, Product, ProductInput,
    RemoteCartLine, Role, Session, SignInCredentials, UserProfile,
};

pub mod api;
pub mod identity;

#[cfg(test)]
pub(crate) mod mock_server;

pub use api::ApiClient;
pub use identity::PasswordIdentityProvider;

/// Errors that can occur when talking to a remote collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        /// Which collaborator answered.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Service answered with a success status other than the one the
    /// operation requires (e.g. 200 where 201 confirms creation).
    #[error("{service} returned unexpected HTTP {status}")]
    UnexpectedStatus {
        service: &'static str,
        status: u16,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Identity provider rejected the request with an error code.
    #[error("identity provider error: {0}")]
    Provider(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Service could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Classify a transport failure. Refused connections and timeouts mean the
/// service is unreachable; anything else is reported as an HTTP error.
pub(crate) fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_connect() || err.is_timeout() {
        RemoteError::Unavailable(err.to_string())
    } else {
        RemoteError::Http(err)
    }
}

/// External identity provider.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across async tasks.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Authenticate and return the new identity.
    fn sign_in(
        &self,
        credentials: &SignInCredentials,
    ) -> impl Future<Output = Result<Session, RemoteError>> + Send;

    /// Create an account and sign it in.
    fn sign_up(
        &self,
        credentials: &SignInCredentials,
    ) -> impl Future<Output = Result<Session, RemoteError>> + Send;

    /// End the provider-side session.
    fn sign_out(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Issue a bearer token for `session`.
    ///
    /// Each call is independent; implementations may reuse a token that is
    /// still well inside its lifetime.
    fn issue_token(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<Credential, RemoteError>> + Send;

    /// The identity the provider believes is signed in, if any.
    fn last_known_session(&self) -> Option<Session>;
}

/// User records keyed by identity: role lookup and profile creation.
pub trait RoleStore: Send + Sync + 'static {
    fn get_role(
        &self,
        identity: &UserId,
        credential: &Credential,
    ) -> impl Future<Output = Result<Role, RemoteError>> + Send;

    /// `PUT /users/{id}` with the new account's profile.
    fn create_profile(
        &self,
        identity: &UserId,
        profile: &UserProfile,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// The per-session remote cart.
pub trait CartService: Send + Sync + 'static {
    /// `GET /cart`.
    fn fetch_cart(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<RemoteCartLine>, RemoteError>> + Send;

    /// `POST /cart/add`; the server adds to an existing line.
    fn add_line(
        &self,
        credential: &Credential,
        line: &CartLineInput,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `PUT /cart/quantity`.
    fn set_quantity(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `DELETE /cart/remove/{productId}`.
    fn remove_line(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `DELETE /cart/clear`.
    fn clear(&self, credential: &Credential)
    -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// The order service, as seen by a buyer.
pub trait OrderService: Send + Sync + 'static {
    /// `POST /orders`. Returns the new order's id only on a confirmed creation.
    fn submit_order(
        &self,
        credential: &Credential,
        draft: &OrderDraft,
    ) -> impl Future<Output = Result<OrderId, RemoteError>> + Send;

    /// `GET /orders` for the credential's identity.
    fn list_orders(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<Order>, RemoteError>> + Send;

    /// `PUT /orders/{id}/status`.
    fn update_order_status(
        &self,
        credential: &Credential,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// The public catalog and its admin-only writes.
pub trait CatalogService: Send + Sync + 'static {
    /// `GET /cameras`. No credential.
    fn list_products(&self) -> impl Future<Output = Result<Vec<Product>, RemoteError>> + Send;

    /// `POST /cameras`.
    fn create_product(
        &self,
        credential: &Credential,
        product: &ProductInput,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `PUT /cameras/{id}`.
    fn update_product(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        product: &ProductInput,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `DELETE /cameras/{id}`.
    fn delete_product(
        &self,
        credential: &Credential,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

/// Endpoints only a privileged identity may call.
pub trait AdminService: Send + Sync + 'static {
    /// `GET /orders/admin`, optionally filtered by status.
    fn list_all_orders(
        &self,
        credential: &Credential,
        status: Option<OrderStatus>,
    ) -> impl Future<Output = Result<Vec<Order>, RemoteError>> + Send;

    /// `PUT /orders/admin/{id}/status`.
    fn set_any_order_status(
        &self,
        credential: &Credential,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// `GET /admin/users`.
    fn list_users(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<AdminUser>, RemoteError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Status {
            service: "cart",
            status: 503,
            body: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "cart returned HTTP 503: maintenance");

        let err = RemoteError::UnexpectedStatus {
            service: "orders",
            status: 200,
        };
        assert_eq!(err.to_string(), "orders returned unexpected HTTP 200");
    }

    #[test]
    fn test_rate_limited_error() {
        let err = RemoteError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");
    }
}
