//! camstore CLI - storefront client from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog (no sign-in needed)
//! camstore products
//!
//! # Create an account from CAMSTORE_EMAIL / CAMSTORE_PASSWORD
//! camstore register --phone 9800000000 --address "12 MG Road, Pune"
//!
//! # Cart and checkout, signed in from CAMSTORE_EMAIL / CAMSTORE_PASSWORD
//! camstore cart add cam-dome-4mp
//! camstore cart set cam-dome-4mp 3
//! camstore checkout --name "Asha Rao" --phone 9800000000 --address "12 MG Road, Pune"
//!
//! # Order history
//! camstore orders list
//! camstore orders cancel <order-id>
//!
//! # Admin (requires a privileged account)
//! camstore admin orders --status pending
//! camstore admin status <order-id> shipped
//! ```
//!
//! # Commands
//!
//! - `products` - List the catalog
//! - `register` - Create an account
//! - `cart` - Show and change the signed-in user's cart
//! - `checkout` - Place an order for the cart
//! - `orders` - List or cancel your orders
//! - `admin` - Manage orders, users and products

#![cfg_attr(not(test), forbid(unsafe_code))]

use camstore_core::{OrderId, OrderStatus, ProductId};
use camstore_storefront::config::StorefrontConfig;
use camstore_storefront::models::RegistrationForm;
use camstore_storefront::state::AppState;
use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "camstore")]
#[command(author, version, about = "camstore storefront client")]
struct Cli {
    #[command(flatten)]
    account: Account,

    #[command(subcommand)]
    command: Commands,
}

/// Account used by commands that need a session.
#[derive(Args)]
struct Account {
    /// Account email
    #[arg(long, env = "CAMSTORE_EMAIL", global = true)]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "CAMSTORE_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the catalog
    Products,
    /// Create an account with --email and --password
    Register {
        /// Contact phone number
        #[arg(long)]
        phone: String,

        /// Default shipping address
        #[arg(long)]
        address: String,
    },
    /// Show or change your cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Place an order for everything in your cart
    Checkout {
        /// Buyer name
        #[arg(long)]
        name: String,

        /// Buyer phone number
        #[arg(long)]
        phone: String,

        /// Shipping address
        #[arg(long)]
        address: String,
    },
    /// Your orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Store administration
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the cart
    Show,
    /// Add one unit of a product
    Add { product_id: ProductId },
    /// Remove a product
    Remove { product_id: ProductId },
    /// Set a product's quantity (0 removes it)
    Set { product_id: ProductId, quantity: i64 },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List your orders, newest first
    List,
    /// Cancel a pending or processing order
    Cancel { order_id: OrderId },
}

#[derive(Subcommand)]
enum AdminAction {
    /// List all orders
    Orders {
        /// Only orders in this status
        #[arg(short, long)]
        status: Option<OrderStatus>,
    },
    /// Move an order to a new status
    Status {
        order_id: OrderId,
        status: OrderStatus,
    },
    /// List registered users
    Users,
    /// Delete a product from the catalog
    DeleteProduct { product_id: ProductId },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "camstore_storefront=info,camstore_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Sentry must be initialized before the tracing subscriber
    let config = StorefrontConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(CliError::from(e)),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

impl Commands {
    /// Whether the command runs signed in with the account arguments.
    const fn needs_session(&self) -> bool {
        !matches!(self, Self::Products | Self::Register { .. })
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CliError> {
    let state = AppState::new(config)?;
    let Cli { account, command } = cli;

    if !command.needs_session() {
        return dispatch(&state, &account, command).await;
    }

    commands::sign_in(&state, account.email.as_deref(), account.password.as_deref()).await?;
    let result = dispatch(&state, &account, command).await;
    commands::sign_out(&state).await;
    result
}

async fn dispatch(state: &AppState, account: &Account, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Products => commands::shop::products(state).await,
        Commands::Register { phone, address } => {
            let form = RegistrationForm { phone, address };
            let result = commands::register(
                state,
                account.email.as_deref(),
                account.password.as_deref(),
                &form,
            )
            .await;
            if state.sessions().current().is_some() {
                commands::sign_out(state).await;
            }
            result
        }
        Commands::Cart { action } => match action {
            CartAction::Show => commands::shop::show_cart(state).await,
            CartAction::Add { product_id } => commands::shop::add(state, &product_id).await,
            CartAction::Remove { product_id } => commands::shop::remove(state, &product_id).await,
            CartAction::Set {
                product_id,
                quantity,
            } => commands::shop::set_quantity(state, &product_id, quantity).await,
            CartAction::Clear => commands::shop::clear(state).await,
        },
        Commands::Checkout {
            name,
            phone,
            address,
        } => commands::shop::checkout(state, name, phone, address).await,
        Commands::Orders { action } => match action {
            OrdersAction::List => commands::shop::list_orders(state).await,
            OrdersAction::Cancel { order_id } => commands::shop::cancel_order(state, &order_id).await,
        },
        Commands::Admin { action } => match action {
            AdminAction::Orders { status } => commands::admin::orders(state, status).await,
            AdminAction::Status { order_id, status } => {
                commands::admin::set_status(state, &order_id, status).await
            }
            AdminAction::Users => commands::admin::users(state).await,
            AdminAction::DeleteProduct { product_id } => {
                commands::admin::delete_product(state, &product_id).await
            }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_runs_without_prior_sign_in() {
        let cli = Cli::try_parse_from([
            "camstore",
            "--email",
            "new@example.com",
            "register",
            "--phone",
            "9800000000",
            "--address",
            "12 MG Road, Pune",
        ])
        .unwrap();
        assert!(!cli.command.needs_session());
        assert_eq!(cli.account.email.as_deref(), Some("new@example.com"));
        assert!(matches!(cli.command, Commands::Register { ref phone, .. } if phone == "9800000000"));
    }

    #[test]
    fn test_cart_commands_need_a_session() {
        let cli = Cli::try_parse_from(["camstore", "cart", "show"]).unwrap();
        assert!(cli.command.needs_session());
        assert!(Cli::try_parse_from(["camstore", "register"]).is_err());
    }
}
