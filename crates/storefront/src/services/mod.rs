//! Storefront core services.
//!
//! # Services
//!
//! - `session` - [`SessionManager`], the owner of the signed-in identity
//! - `gate` - [`AuthorizationGate`], role resolution for protected views
//! - `cart` - [`CartStore`], the write-then-refetch cart cache
//! - `checkout` - [`OrderSubmission`], validated order placement
//! - `orders` - [`OrderHistory`], the buyer's orders and cancellation
//! - `catalog` - [`Catalog`], the cached product listing
//! - `registration` - [`Registration`], account creation
//! - `admin` - [`AdminConsole`], privileged order, user and product management
//!
//! Components that react to identity changes are mounted as `Arc<Self>` and
//! subscribe with a weak reference, so dropping the last handle ends the
//! subscription.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod gate;
pub mod orders;
pub mod registration;
pub mod session;

pub use admin::AdminConsole;
pub use cart::CartStore;
pub use catalog::Catalog;
pub use checkout::OrderSubmission;
pub use gate::{AuthorizationGate, AuthorizedContext, GateDecision, GateState, SignInRedirect};
pub use orders::OrderHistory;
pub use registration::Registration;
pub use session::{SessionManager, Subscription};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
