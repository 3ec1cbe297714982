//! Mercato CLI - Database migrations, seeding and inspection.
//!
//! # Usage
//!
//! ```bash
//! # Apply pending migrations
//! mercato migrate
//!
//! # Load reference data (countries, categories, products, providers)
//! mercato seed -f seed.yaml
//!
//! # Inspect stored aggregates
//! mercato country list --limit 20
//! mercato order show 41
//! mercato user show 7c4f0f5e-2f7e-4c8e-9d55-5b1f1f0a9c01
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string (required)
//! - `DATABASE_MAX_CONNECTIONS`, `DATABASE_MIN_CONNECTIONS`,
//!   `DATABASE_ACQUIRE_TIMEOUT_SECS` - pool tuning
//! - `RUST_LOG` - log filter (default `info`)
//! - `LOG_FORMAT=json` - structured JSON logs instead of text

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "mercato")]
#[command(author, version, about = "Mercato CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Load reference data from a YAML file
    Seed {
        /// Path to the seed file
        #[arg(short, long, default_value = "seed.yaml")]
        file: String,

        /// Only validate the file, without connecting
        #[arg(long)]
        check: bool,
    },
    /// Inspect countries
    Country {
        #[command(subcommand)]
        action: CountryAction,
    },
    /// Inspect orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Inspect users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum CountryAction {
    /// List countries by name
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Show an order with its lines and payments
    Show {
        /// Order id
        id: i32,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Show a user with addresses, payment systems and reviews
    Show {
        /// User id
        id: Uuid,
    },
}

fn init_tracing() {
    // Defaults to info level if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { file, check } => {
            if check {
                commands::seed::check(&file).await?;
            } else {
                commands::seed::run(&file).await?;
            }
        }
        Commands::Country { action } => match action {
            CountryAction::List { limit, offset } => {
                commands::show::countries(limit, offset).await?;
            }
        },
        Commands::Order { action } => match action {
            OrderAction::Show { id } => commands::show::order(id).await?,
        },
        Commands::User { action } => match action {
            UserAction::Show { id } => commands::show::user(id).await?,
        },
    }
    Ok(())
}
