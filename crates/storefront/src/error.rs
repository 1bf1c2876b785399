//! Unified error handling with Sentry integration.
//!
//! [`StoreError`] is the taxonomy every session, cart and order operation
//! returns. Remote failures are wrapped in [`RemoteError`] and reported to
//! Sentry by [`StoreError::report`] before the caller shows an inline message.

use thiserror::Error;

use crate::backend::RemoteError;

/// Errors surfaced by storefront operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session where one is required.
    #[error("not signed in")]
    Unauthenticated,

    /// Role lookup denied access or failed.
    #[error("not authorized")]
    Unauthorized,

    /// Network or service failure on a cart, order or catalog call.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Required fields are blank, or a value is out of range.
    #[error("missing or invalid fields: {}", .missing.join(", "))]
    Validation {
        /// Field names, in form order.
        missing: Vec<&'static str>,
    },

    /// Checkout was attempted with an empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A checkout submission is already waiting for the order service.
    #[error("an order submission is already in progress")]
    SubmissionInFlight,

    /// The order cannot move to the requested status.
    #[error("order in status {from} cannot be {to}")]
    InvalidTransition {
        from: camstore_core::OrderStatus,
        to: camstore_core::OrderStatus,
    },
}

impl StoreError {
    /// Whether the caller should silently send the user to sign-in instead
    /// of showing a message.
    #[must_use]
    pub const fn redirects_to_sign_in(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Unauthorized)
    }

    /// Whether retrying the same call can succeed without user changes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::SubmissionInFlight)
    }

    /// Message for the inline error banner.
    ///
    /// Remote error details are not shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated => "You must be logged in to proceed.".to_string(),
            Self::Unauthorized => "You do not have access to this page.".to_string(),
            Self::Remote(RemoteError::RateLimited(secs)) => {
                format!("Too many requests, please try again in {secs} seconds.")
            }
            Self::Remote(_) => "Something went wrong, please try again.".to_string(),
            Self::Validation { missing } if *missing == ["quantity"] => {
                "That quantity is too large.".to_string()
            }
            Self::Validation { .. } => "Please fill in all required fields.".to_string(),
            Self::EmptyCart => "Your cart is empty.".to_string(),
            Self::SubmissionInFlight => "Your order is already being placed.".to_string(),
            Self::InvalidTransition { from, .. } => {
                format!("This order is {from} and can no longer be changed.")
            }
        }
    }

    /// Capture remote failures to Sentry and log them.
    pub fn report(&self, operation: &str) {
        if let Self::Remote(err) = self {
            let event_id = sentry::capture_error(err);
            tracing::error!(
                error = %err,
                operation,
                sentry_event_id = %event_id,
                "Remote call failed"
            );
        }
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Set the Sentry user context for the signed-in identity.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context on sign-out.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart and
/// checkout actions leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Set quantity", Some(&[("product_id", "cam1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
