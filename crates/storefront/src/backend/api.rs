//! REST client for the camera store backend.
//!
//! One [`ApiClient`] serves every backend seam: roles, cart, orders, the
//! public catalog and the admin endpoints. Paths are resolved against
//! `CAMSTORE_API_URL`.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use camstore_core::{OrderId, OrderStatus, ProductId, UserId};

use super::{
    AdminService, CartService, CatalogService, OrderService, RemoteError, RoleStore,
    transport_error,
};
use crate::config::StorefrontConfig;
use crate::models::{
    AdminUser, CartLineInput, Credential, Order, OrderDraft, Product, ProductInput,
    RemoteCartLine, Role, UserProfile,
};

const USER_AGENT: &str = concat!("camstore/", env!("CARGO_PKG_VERSION"));

/// Characters of a failed response body kept in logs.
const LOG_BODY_CHARS: usize = 500;
/// Characters of a failed response body kept in the returned error.
const ERROR_BODY_CHARS: usize = 200;

/// Client for the store's REST backend.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base: Url,
}

#[derive(Deserialize)]
struct Created<T> {
    id: T,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct QuantityUpdate<'a> {
    product_id: &'a ProductId,
    quantity: u32,
}

#[derive(serde::Serialize)]
struct StatusUpdate {
    status: OrderStatus,
}

impl ApiClient {
    /// Create a client for `config.api_url`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Http` if the HTTP client cannot be built, or
    /// `RemoteError::Unavailable` if the API URL cannot carry a path.
    pub fn new(config: &StorefrontConfig) -> Result<Self, RemoteError> {
        if config.api_url.cannot_be_a_base() {
            return Err(RemoteError::Unavailable(format!(
                "{} cannot be used as an API base URL",
                config.api_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base: config.api_url.clone(),
            }),
        })
    }

    /// Resolve path segments against the base URL. Segments are
    /// percent-encoded, so ids cannot escape their position in the path.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.inner.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::Unavailable(format!("{} cannot be a base URL", self.inner.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, credential: Option<&Credential>) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match credential {
            Some(credential) => builder.bearer_auth(credential.expose()),
            None => builder,
        }
    }

    /// Send a request and read the body as text.
    ///
    /// 429 responses become `RateLimited`; every other status is returned
    /// to the caller together with the body.
    async fn execute(
        &self,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        // Text first so failures can be logged with the body
        let body = response.text().await.map_err(transport_error)?;
        Ok((status, body))
    }

    /// Send a request and fail on any non-success status.
    async fn call(
        &self,
        service: &'static str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, String), RemoteError> {
        let (status, body) = self.execute(request).await?;
        ensure_success(service, status, &body)?;
        Ok((status, body))
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let (_, body) = self.call(service, request).await?;
        parse(service, &body)
    }
}

fn truncate(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}

fn ensure_success(service: &'static str, status: StatusCode, body: &str) -> Result<(), RemoteError> {
    if status.is_success() {
        return Ok(());
    }
    tracing::error!(
        service,
        status = %status,
        body = %truncate(body, LOG_BODY_CHARS),
        "Backend returned non-success status"
    );
    Err(RemoteError::Status {
        service,
        status: status.as_u16(),
        body: truncate(body, ERROR_BODY_CHARS),
    })
}

fn parse<T: DeserializeOwned>(service: &'static str, body: &str) -> Result<T, RemoteError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            service,
            error = %e,
            body = %truncate(body, LOG_BODY_CHARS),
            "Failed to parse backend response"
        );
        RemoteError::Parse(e)
    })
}

// =============================================================================
// Roles
// =============================================================================

impl RoleStore for ApiClient {
    #[instrument(skip(self, credential), fields(user_id = %identity))]
    async fn get_role(&self, identity: &UserId, credential: &Credential) -> Result<Role, RemoteError> {
        let url = self.endpoint(&["users", identity.as_str(), "role"])?;
        let (status, body) = self
            .execute(self.request(Method::GET, url, Some(credential)))
            .await?;

        // No role record means an ordinary buyer
        if status == StatusCode::NOT_FOUND {
            debug!("No role record, treating as unprivileged");
            return Ok(Role::default());
        }
        ensure_success("roles", status, &body)?;
        parse("roles", &body)
    }

    #[instrument(skip(self, profile, credential), fields(user_id = %identity))]
    async fn create_profile(
        &self,
        identity: &UserId,
        profile: &UserProfile,
        credential: &Credential,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["users", identity.as_str()])?;
        self.call("users", self.request(Method::PUT, url, Some(credential)).json(profile))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Cart
// =============================================================================

impl CartService for ApiClient {
    #[instrument(skip_all)]
    async fn fetch_cart(&self, credential: &Credential) -> Result<Vec<RemoteCartLine>, RemoteError> {
        let url = self.endpoint(&["cart"])?;
        self.call_json("cart", self.request(Method::GET, url, Some(credential)))
            .await
    }

    #[instrument(skip(self, credential, line), fields(product_id = %line.product_id))]
    async fn add_line(&self, credential: &Credential, line: &CartLineInput) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart", "add"])?;
        self.call("cart", self.request(Method::POST, url, Some(credential)).json(line))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn set_quantity(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart", "quantity"])?;
        let body = QuantityUpdate {
            product_id,
            quantity,
        };
        self.call("cart", self.request(Method::PUT, url, Some(credential)).json(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn remove_line(&self, credential: &Credential, product_id: &ProductId) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart", "remove", product_id.as_str()])?;
        self.call("cart", self.request(Method::DELETE, url, Some(credential)))
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn clear(&self, credential: &Credential) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart", "clear"])?;
        self.call("cart", self.request(Method::DELETE, url, Some(credential)))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

impl OrderService for ApiClient {
    #[instrument(skip(self, credential, draft), fields(user_id = %draft.user_id(), items = draft.items().len()))]
    async fn submit_order(&self, credential: &Credential, draft: &OrderDraft) -> Result<OrderId, RemoteError> {
        let url = self.endpoint(&["orders"])?;
        let (status, body) = self
            .call("orders", self.request(Method::POST, url, Some(credential)).json(draft))
            .await?;

        // Only 201 confirms the order exists
        if status != StatusCode::CREATED {
            tracing::error!(status = %status, "Order service did not confirm creation");
            return Err(RemoteError::UnexpectedStatus {
                service: "orders",
                status: status.as_u16(),
            });
        }

        let created: Created<OrderId> = parse("orders", &body)?;
        Ok(created.id)
    }

    #[instrument(skip_all)]
    async fn list_orders(&self, credential: &Credential) -> Result<Vec<Order>, RemoteError> {
        let url = self.endpoint(&["orders"])?;
        self.call_json("orders", self.request(Method::GET, url, Some(credential)))
            .await
    }

    #[instrument(skip(self, credential), fields(order_id = %order_id, status = %status))]
    async fn update_order_status(
        &self,
        credential: &Credential,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["orders", order_id.as_str(), "status"])?;
        self.call(
            "orders",
            self.request(Method::PUT, url, Some(credential))
                .json(&StatusUpdate { status }),
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Catalog
// =============================================================================

impl CatalogService for ApiClient {
    #[instrument(skip_all)]
    async fn list_products(&self) -> Result<Vec<Product>, RemoteError> {
        let url = self.endpoint(&["cameras"])?;
        self.call_json("catalog", self.request(Method::GET, url, None))
            .await
    }

    #[instrument(skip(self, credential, product), fields(name = %product.name))]
    async fn create_product(&self, credential: &Credential, product: &ProductInput) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cameras"])?;
        self.call("catalog", self.request(Method::POST, url, Some(credential)).json(product))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, credential, product), fields(product_id = %product_id))]
    async fn update_product(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        product: &ProductInput,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cameras", product_id.as_str()])?;
        self.call("catalog", self.request(Method::PUT, url, Some(credential)).json(product))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    async fn delete_product(&self, credential: &Credential, product_id: &ProductId) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cameras", product_id.as_str()])?;
        self.call("catalog", self.request(Method::DELETE, url, Some(credential)))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Admin
// =============================================================================

impl AdminService for ApiClient {
    #[instrument(skip(self, credential))]
    async fn list_all_orders(
        &self,
        credential: &Credential,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RemoteError> {
        let mut url = self.endpoint(&["orders", "admin"])?;
        if let Some(status) = status {
            url.query_pairs_mut().append_pair("status", status.as_str());
        }
        self.call_json("admin", self.request(Method::GET, url, Some(credential)))
            .await
    }

    #[instrument(skip(self, credential), fields(order_id = %order_id, status = %status))]
    async fn set_any_order_status(
        &self,
        credential: &Credential,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["orders", "admin", order_id.as_str(), "status"])?;
        self.call(
            "admin",
            self.request(Method::PUT, url, Some(credential))
                .json(&StatusUpdate { status }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn list_users(&self, credential: &Credential) -> Result<Vec<AdminUser>, RemoteError> {
        let url = self.endpoint(&["admin", "users"])?;
        self.call_json("admin", self.request(Method::GET, url, Some(credential)))
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::SocketAddr;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::backend::mock_server::{Reply, closed_addr, serve};

    const KEY: &str = "AIzaSyB7q2kLm9Xc4Rt8Vw1Pz6Hn3Jd5Fg0Qe";

    fn client_for(addr: SocketAddr) -> ApiClient {
        let config = StorefrontConfig::from_lookup(|key| match key {
            "CAMSTORE_IDENTITY_API_KEY" => Some(KEY.to_string()),
            "CAMSTORE_API_URL" => Some(format!("http://{addr}/api")),
            _ => None,
        })
        .unwrap();
        ApiClient::new(&config).unwrap()
    }

    async fn serve_once(reply: Reply) -> (ApiClient, UnboundedReceiver<String>) {
        let (addr, requests) = serve(vec![reply]).await;
        (client_for(addr), requests)
    }

    fn credential() -> Credential {
        Credential::new("token-abc")
    }

    #[tokio::test]
    async fn test_role_lookup_sends_bearer_to_user_path() {
        let (api, mut requests) = serve_once(Reply::json("200 OK", r#"{"isPrivileged": true}"#)).await;
        let role = api
            .get_role(&UserId::parse("uid-7").unwrap(), &credential())
            .await
            .unwrap();
        assert!(role.is_privileged);

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("GET /api/users/uid-7/role "));
        assert!(request.to_lowercase().contains("authorization: bearer token-abc"));
    }

    #[tokio::test]
    async fn test_missing_role_record_is_unprivileged() {
        let (api, _) = serve_once(Reply::json("404 Not Found", r#"{"message": "no such user"}"#)).await;
        let role = api
            .get_role(&UserId::parse("uid-7").unwrap(), &credential())
            .await
            .unwrap();
        assert!(!role.is_privileged);
    }

    #[tokio::test]
    async fn test_create_profile_puts_unprivileged_record() {
        let (api, mut requests) = serve_once(Reply::json("200 OK", "{}")).await;
        let profile = UserProfile {
            email: "new@example.com".to_string(),
            phone: "9800000000".to_string(),
            address: "Pune".to_string(),
            is_admin: false,
        };
        api.create_profile(&UserId::parse("uid-9").unwrap(), &profile, &credential())
            .await
            .unwrap();

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("PUT /api/users/uid-9 "));
        assert!(request.contains(r#""isAdmin":false"#));
    }

    #[tokio::test]
    async fn test_fetch_cart_reads_legacy_lines() {
        let (api, _) = serve_once(Reply::json(
            "200 OK",
            r#"[{"cameraId": "cam1", "name": "Dome", "price": 2499, "imageUrl": "d.jpg", "quantity": 2}]"#,
        ))
        .await;
        let lines = api.fetch_cart(&credential()).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id.as_str(), "cam1");
        assert_eq!(lines[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_set_quantity_body() {
        let (api, mut requests) = serve_once(Reply::json("200 OK", "{}")).await;
        api.set_quantity(&credential(), &ProductId::parse("cam1").unwrap(), 3)
            .await
            .unwrap();
        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("PUT /api/cart/quantity "));
        assert!(request.contains(r#"{"productId":"cam1","quantity":3}"#));
    }

    #[tokio::test]
    async fn test_product_id_is_path_encoded() {
        let (api, mut requests) = serve_once(Reply::json("200 OK", "{}")).await;
        api.remove_line(&credential(), &ProductId::parse("cam 1?x").unwrap())
            .await
            .unwrap();
        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("DELETE /api/cart/remove/cam%201%3Fx "));
    }

    #[tokio::test]
    async fn test_submit_order_requires_created() {
        let (api, _) = serve_once(Reply::json("200 OK", r#"{"id": "ord-1"}"#)).await;
        let draft = sample_draft();
        let err = api.submit_order(&credential(), &draft).await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::UnexpectedStatus {
                service: "orders",
                status: 200
            }
        ));
    }

    #[tokio::test]
    async fn test_submit_order_returns_created_id() {
        let (api, mut requests) = serve_once(Reply::json("201 Created", r#"{"id": "ord-1"}"#)).await;
        let id = api
            .submit_order(&credential(), &sample_draft())
            .await
            .unwrap();
        assert_eq!(id.as_str(), "ord-1");
        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("POST /api/orders "));
        assert!(request.contains(r#""status":"Pending""#));
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let (api, _) = serve_once(Reply::json("503 Service Unavailable", "down for maintenance")).await;
        let err = api.clear(&credential()).await.unwrap_err();
        match err {
            RemoteError::Status {
                service,
                status,
                body,
            } => {
                assert_eq!(service, "cart");
                assert_eq!(status, 503);
                assert_eq!(body, "down for maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let (api, _) = serve_once(Reply::json("429 Too Many Requests", "{}").with_header("retry-after", "7")).await;
        let err = api.list_products().await.unwrap_err();
        assert!(matches!(err, RemoteError::RateLimited(7)));
    }

    #[tokio::test]
    async fn test_catalog_is_public() {
        let (api, mut requests) = serve_once(Reply::json(
            "200 OK",
            r#"[{"id": "cam1", "name": "Dome", "price": 2499}]"#,
        ))
        .await;
        let products = api.list_products().await.unwrap();
        assert_eq!(products.len(), 1);
        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("GET /api/cameras "));
        assert!(!request.to_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn test_admin_orders_status_filter() {
        let (api, mut requests) = serve_once(Reply::json("200 OK", "[]")).await;
        let orders = api
            .list_all_orders(&credential(), Some(OrderStatus::Shipped))
            .await
            .unwrap();
        assert!(orders.is_empty());
        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("GET /api/orders/admin?status=Shipped "));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let api = client_for(closed_addr().await);
        let err = api.list_products().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unavailable(_)));
    }

    fn sample_draft() -> OrderDraft {
        use crate::models::{Cart, CheckoutForm, Session};
        use camstore_core::{Email, Price};
        use rust_decimal::Decimal;

        let session = Session {
            id: UserId::parse("uid-1").unwrap(),
            email: Email::parse("buyer@example.com").unwrap(),
        };
        let cart = Cart::from_remote(vec![RemoteCartLine {
            product_id: ProductId::parse("cam1").unwrap(),
            name: "Dome".to_string(),
            unit_price: Price::new(Decimal::new(2499, 0)).unwrap(),
            image_ref: String::new(),
            quantity: 1,
        }]);
        let form = CheckoutForm {
            buyer_name: "Asha".to_string(),
            buyer_phone: "9800000000".to_string(),
            shipping_address: "12 MG Road".to_string(),
        };
        OrderDraft::new(&session, &form, &cart)
    }
}
