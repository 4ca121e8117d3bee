//! VentHub CLI - drive the storefront flows from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Look up an order's status
//! vh-cli order status 0b6c9c7e-3d1a-4d5e-8f60-2a1b3c4d5e6f
//!
//! # Watch the pending order until its payment settles
//! vh-cli watch
//!
//! # Manage the local cart
//! vh-cli cart add 5f1e... --name "Kanal Fanı 200" --price 1499.90 -q 2
//! vh-cli cart show
//!
//! # Merge the local cart into the signed-in user's server cart
//! VENTHUB_USER_ID=... VENTHUB_ACCESS_TOKEN=... vh-cli cart sync
//!
//! # Pay for the cart with a checkout form read from JSON
//! vh-cli checkout --form checkout.json
//!
//! # Apply a payment return query string
//! vh-cli result "orderId=...&status=success"
//! ```
//!
//! Configuration comes from the environment (see `StorefrontConfig`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use secrecy::SecretString;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use venthub_core::{OrderId, ProductId, UserId};
use venthub_storefront::config::StorefrontConfig;

mod commands;
mod host;

#[derive(Parser)]
#[command(name = "vh-cli")]
#[command(author, version, about = "VentHub storefront CLI tools")]
struct Cli {
    /// Signed-in user; enables server cart sync
    #[arg(long, env = "VENTHUB_USER_ID", global = true)]
    user_id: Option<UserId>,

    /// Supabase access token for the signed-in user
    #[arg(long, env = "VENTHUB_ACCESS_TOKEN", global = true, hide_env_values = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Poll the pending order until its payment settles
    Watch,
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Pay for the current cart
    Checkout {
        /// Checkout form as JSON
        #[arg(short, long)]
        form: PathBuf,
    },
    /// Apply a payment return query string
    Result {
        /// Query string from the return URL
        query: String,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Show an order's status
    Status {
        /// Order ID
        order_id: OrderId,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// List cart lines and the total
    Show,
    /// Add a product to the cart
    Add {
        /// Product ID
        product_id: ProductId,

        /// Product name shown in the cart
        #[arg(short, long)]
        name: String,

        /// List price
        #[arg(short, long)]
        price: Decimal,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Remove a product from the cart
    Remove {
        /// Product ID
        product_id: ProductId,
    },
    /// Merge the local cart with the server cart
    Sync,
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
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "venthub_storefront=info,venthub_cli=info".into());

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
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = commands::Session {
        user_id: cli.user_id,
        access_token: cli.access_token.map(SecretString::from),
    };
    let ctx = commands::Context::new(config, session)?;

    match cli.command {
        Commands::Order { action } => match action {
            OrderAction::Status { order_id } => commands::order::status(&ctx, order_id).await?,
        },
        Commands::Watch => commands::watch::run(&ctx).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx),
            CartAction::Add {
                product_id,
                name,
                price,
                quantity,
            } => commands::cart::add(&ctx, product_id, name, price, quantity).await?,
            CartAction::Remove { product_id } => commands::cart::remove(&ctx, product_id).await?,
            CartAction::Sync => commands::cart::sync(&ctx).await?,
        },
        Commands::Checkout { form } => commands::checkout::run(&ctx, &form).await?,
        Commands::Result { query } => commands::checkout::result(&ctx, &query).await?,
    }
    Ok(())
}
