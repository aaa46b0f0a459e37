use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use engine::{
    LedgerFeed, LedgerSummary, Money, MovementDoc, MovementForm, MovementKind, NewProduct,
    PaymentMethod, ProductStore, SqliteStore, Till, Viewport, clock::civil_date,
};
use migration::{Migrator, MigratorTrait};

use error::{AppError, Result};
use settings::{DEFAULT_CONFIG_PATH, Settings};

mod error;
mod settings;

#[derive(Parser, Debug)]
#[command(name = "vivero")]
#[command(about = "Cash ledger for the nursery till")]
struct Cli {
    /// Optional config file path (TOML).
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the configured database (e.g. `sqlite:./vivero.db?mode=rwc`).
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Running balances, today's totals and this month's movements.
    Summary,
    /// Record a movement through the till.
    Record(RecordArgs),
    /// Delete every movement of the current month.
    PurgeMonth {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
    Product(Product),
}

#[derive(Args, Debug)]
struct RecordArgs {
    /// sale, purchase, cash_in or cash_out.
    #[arg(long, value_parser = parse_kind)]
    kind: MovementKind,
    #[arg(long, default_value = "")]
    price: String,
    /// Explicit total; computed from price and quantity when omitted.
    #[arg(long, default_value = "")]
    total: String,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    /// Product id or name.
    #[arg(long)]
    product: Option<String>,
    /// cash or mobile_wallet.
    #[arg(long, value_parser = parse_method, default_value = "cash")]
    method: PaymentMethod,
    /// `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM`; now when omitted.
    #[arg(long)]
    date: Option<String>,
    #[arg(long, default_value = "")]
    detail: String,
    #[arg(long, default_value = "")]
    location: String,
    #[arg(long, default_value = "")]
    notes: String,
    /// Record as the mobile till does: sales are stamped with the current time.
    #[arg(long)]
    narrow: bool,
}

#[derive(Args, Debug)]
struct Product {
    #[command(subcommand)]
    command: ProductCommand,
}

#[derive(Subcommand, Debug)]
enum ProductCommand {
    Add(ProductAddArgs),
    List,
}

#[derive(Args, Debug)]
struct ProductAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "0")]
    base_price: Money,
    #[arg(long, default_value = "0")]
    purchase_price: Money,
    #[arg(long, default_value_t = 0)]
    stock: u32,
    #[arg(long, default_value = engine::DEFAULT_PRODUCT_KIND)]
    kind: String,
}

fn parse_kind(raw: &str) -> std::result::Result<MovementKind, String> {
    MovementKind::try_from(raw).map_err(|err| err.to_string())
}

fn parse_method(raw: &str) -> std::result::Result<PaymentMethod, String> {
    PaymentMethod::try_from(raw).map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new(&cli.config)?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!(
            "vivero={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    run(cli, settings).await
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url());
    let store = Arc::new(open_store(&url).await?);
    tracing::debug!("ledger opened at {url}");
    let feed = LedgerFeed::subscribe(store.as_ref());
    let till = Till::new(store.clone(), store.clone(), feed);

    match cli.command {
        Command::Summary => {
            let state = till.snapshot();
            print_summary(&state.summary(Utc::now()), |id| {
                state.product(id).map(|product| product.name.clone())
            });
        }
        Command::Record(args) => {
            let viewport = if args.narrow {
                Viewport::Narrow
            } else {
                settings.till.viewport
            };
            record(&till, args, viewport).await?;
        }
        Command::PurgeMonth { yes } => {
            if !yes {
                let pending = till.snapshot().summary(Utc::now()).this_month.len();
                println!("{pending} movements would be deleted; pass --yes to confirm");
                return Ok(());
            }
            let deleted = till.purge_month(Utc::now()).await?;
            println!("deleted {deleted} movements");
        }
        Command::Product(product) => match product.command {
            ProductCommand::Add(args) => {
                let id = ProductStore::create(
                    store.as_ref(),
                    NewProduct {
                        name: args.name,
                        base_price: args.base_price,
                        purchase_price: args.purchase_price,
                        stock: args.stock,
                        kind: args.kind,
                    },
                )
                .await?;
                println!("{id}");
            }
            ProductCommand::List => {
                for product in till.snapshot().products() {
                    println!(
                        "{}\t{}\t{}\t{}\t{} in stock",
                        product.id, product.name, product.kind, product.base_price, product.stock
                    );
                }
            }
        },
    }
    Ok(())
}

async fn open_store(url: &str) -> Result<SqliteStore> {
    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(SqliteStore::builder().database(database).build().await?)
}

async fn record(
    till: &Till<SqliteStore, SqliteStore>,
    args: RecordArgs,
    viewport: Viewport,
) -> Result<()> {
    let mut form = MovementForm::default();
    form.input.set_kind(args.kind);
    form.input.price = args.price;
    form.input.total = args.total;
    form.input.quantity = args.quantity;
    form.input.payment_method = args.method;
    form.input.date = args.date;
    form.input.detail = args.detail;
    form.input.location = args.location;
    form.input.notes = args.notes;

    if let Some(typed) = args.product {
        if !args.kind.is_trade() {
            return Err(AppError::Argument(format!(
                "--product only applies to sales and purchases, not {}",
                args.kind
            )));
        }
        if !form.choose_product(&till.snapshot(), &typed) {
            if let Some(name) = &form.ui.suggested_product {
                println!("\"{name}\" is not in the catalogue; add it with `vivero product add --name \"{name}\"`");
            }
        }
    }

    let receipt = till.submit_form(&mut form, viewport, Utc::now()).await?;
    println!("{} {}", receipt.kind, receipt.movement_id);
    Ok(())
}

fn print_summary(summary: &LedgerSummary, product_name: impl Fn(&str) -> Option<String>) {
    let running = summary.running;
    println!("balance");
    println!("  cash           {}", running.cash);
    println!("  mobile wallet  {}", running.mobile_wallet);
    println!("  total          {}", running.total());

    let today = summary.today_totals;
    println!("today ({} units sold)", today.units_sold);
    for kind in MovementKind::ALL {
        let totals = today.by_kind(kind);
        println!(
            "  {:<9} cash {}  mobile wallet {}",
            kind.as_str(),
            totals.cash,
            totals.mobile_wallet
        );
    }

    println!("this month");
    for movement in &summary.this_month {
        println!("  {}", describe(movement, &product_name));
    }
}

fn describe(movement: &MovementDoc, product_name: &impl Fn(&str) -> Option<String>) -> String {
    let date = movement
        .occurred_at()
        .map(|at| civil_date(at).to_string())
        .unwrap_or_else(|| "????-??-??".to_string());
    let kind = movement.kind().map_or("?", MovementKind::as_str);
    let method = movement.payment_method().map_or("?", PaymentMethod::as_str);
    let label = match movement.product_id() {
        Some(id) => format!(
            "{} x {} {}",
            movement.quantity(),
            movement.price(),
            product_name(id).unwrap_or_else(|| id.to_string())
        ),
        None => movement.detail().to_string(),
    };
    format!(
        "{date}  {kind:<9} {method:<13} {:>12}  {label}",
        movement.total().to_string()
    )
}
