//! Admin console operations.
//!
//! Every method takes an [`AuthorizedContext`], which only an `Authorized`
//! [`AuthorizationGate`](super::AuthorizationGate) hands out. The context
//! proves authorization; each call still acquires its own credential for
//! the context's session.

use std::sync::Arc;

use tracing::{info, instrument};

use camstore_core::{OrderId, OrderStatus, ProductId};

use crate::backend::{AdminService, CatalogService, IdentityProvider};
use crate::error::{Result, StoreError, add_breadcrumb};
use crate::models::{AdminUser, Credential, Order, ProductInput};

use super::catalog::Catalog;
use super::gate::AuthorizedContext;
use super::session::SessionManager;

/// Privileged order, user and product management.
pub struct AdminConsole<P, C, A> {
    sessions: Arc<SessionManager<P>>,
    catalog: Arc<Catalog<C>>,
    admin: A,
}

impl<P: IdentityProvider, C: CatalogService, A: AdminService> AdminConsole<P, C, A> {
    pub const fn new(sessions: Arc<SessionManager<P>>, catalog: Arc<Catalog<C>>, admin: A) -> Self {
        Self {
            sessions,
            catalog,
            admin,
        }
    }

    /// A fresh credential for the context's session.
    ///
    /// Fails with `StoreError::Unauthorized` for an unprivileged context and
    /// `StoreError::Unauthenticated` once its session has been replaced.
    async fn credential(&self, context: &AuthorizedContext) -> Result<Credential> {
        if !context.is_privileged() {
            return Err(StoreError::Unauthorized);
        }
        self.sessions.credential_for(context.session()).await
    }

    /// All orders, optionally only those in `status`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthenticated` once the context's session has
    /// been replaced, or `StoreError::Remote` if the admin service fails.
    /// The other methods fail the same way.
    #[instrument(skip(self, context))]
    pub async fn orders(
        &self,
        context: &AuthorizedContext,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let credential = self.credential(context).await?;
        Ok(self.admin.list_all_orders(&credential, status).await?)
    }

    /// Move any order to `status`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Remote` if the admin service fails.
    #[instrument(skip(self, context), fields(order_id = %order_id, status = %status))]
    pub async fn set_order_status(
        &self,
        context: &AuthorizedContext,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<()> {
        let credential = self.credential(context).await?;
        add_breadcrumb(
            "admin",
            "Set order status",
            Some(&[("order_id", order_id.as_str()), ("status", status.as_str())]),
        );
        self.admin
            .set_any_order_status(&credential, order_id, status)
            .await?;
        info!("Order status updated");
        Ok(())
    }

    /// Registered users.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Remote` if the admin service fails.
    #[instrument(skip_all)]
    pub async fn users(&self, context: &AuthorizedContext) -> Result<Vec<AdminUser>> {
        let credential = self.credential(context).await?;
        Ok(self.admin.list_users(&credential).await?)
    }

    /// Create a product, or update `existing` when given.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` for blank required fields before
    /// anything is sent, or `StoreError::Remote` if the write fails.
    #[instrument(skip(self, context, product), fields(name = %product.name))]
    pub async fn save_product(
        &self,
        context: &AuthorizedContext,
        existing: Option<&ProductId>,
        product: &ProductInput,
    ) -> Result<()> {
        if !context.is_privileged() {
            return Err(StoreError::Unauthorized);
        }
        product.validate()?;
        let credential = self.credential(context).await?;

        let service = self.catalog.service();
        match existing {
            Some(id) => {
                service
                    .update_product(&credential, id, product)
                    .await?;
            }
            None => service.create_product(&credential, product).await?,
        }
        self.catalog.invalidate();
        info!(created = existing.is_none(), "Product saved");
        Ok(())
    }

    /// Delete a product from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Remote` if the delete fails.
    #[instrument(skip(self, context), fields(product_id = %product_id))]
    pub async fn delete_product(
        &self,
        context: &AuthorizedContext,
        product_id: &ProductId,
    ) -> Result<()> {
        let credential = self.credential(context).await?;
        add_breadcrumb(
            "admin",
            "Delete product",
            Some(&[("product_id", product_id.as_str())]),
        );
        self.catalog
            .service()
            .delete_product(&credential, product_id)
            .await?;
        self.catalog.invalidate();
        Ok(())
    }
}
