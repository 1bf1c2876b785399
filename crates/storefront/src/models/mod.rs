//! Domain models for the storefront client.
//!
//! These are validated domain types. Wire shapes that need renaming or
//! legacy aliases are handled with serde attributes here rather than in a
//! separate row layer, since the backend is the only producer.

pub mod cart;
pub mod order;
pub mod product;
pub mod session;

pub use cart::{Cart, CartLine, CartLineInput, RemoteCartLine};
pub use order::{AdminUser, BuyerDetails, CheckoutForm, Order, OrderDraft, OrderItem};
pub use product::{Product, ProductInput};
pub use session::{
    Credential, RegistrationForm, Role, Session, SessionEvent, SignInCredentials, UserProfile,
};
