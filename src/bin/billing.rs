use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use colecta::{
    config::Settings,
    domain::BillingPeriod,
    notifications::{EmailNotifier, LogNotifier, NotificationManager},
    payments::{
        redsys::{read_reconciliation, RedsysGateway, ReqwestTransport},
        sepa::{read_returns, write_csv},
    },
    service::ServiceContext,
};

/// Periodic billing tasks: card charges and the SEPA collection cycle.
#[derive(Parser)]
#[command(name = "colecta-billing")]
#[command(version, about)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Day to run as (defaults to today)
    #[arg(long, global = true)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Charge every payable collaboration for the current period
    Charge,

    /// Mark the period's bank orders as charging and export the debit batch
    SepaSubmit {
        /// CSV file to write (defaults to the configured export directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Mark the period's charging bank orders as paid
    SepaSettle,

    /// Apply a bank return file (`order_id,reason_code`)
    SepaReturns {
        file: PathBuf,
    },

    /// Resolve card orders left charging by a gateway failure
    /// (`order_id,paid,response_code`)
    CardReconcile {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colecta=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let settings = Settings::new().context("Failed to load configuration")?;
    let context = build_context(&settings).await?;

    let now = Utc::now();
    let date = cli.date.unwrap_or_else(|| now.date_naive());

    match cli.command {
        Commands::Charge => {
            let summary = context.billing_service.charge_all(date, now).await?;
            println!(
                "{} collaborations: {} paid, {} declined, {} queued for SEPA, {} awaiting payer, {} skipped, {} failed",
                summary.collaborations,
                summary.paid,
                summary.declined,
                summary.queued,
                summary.awaiting_payer,
                summary.skipped,
                summary.failed
            );
        }
        Commands::SepaSubmit { output } => {
            let marked = context.sepa_batch.mark_due_orders_as_charging(date, now).await?;
            let records = context.sepa_batch.export(date).await?;

            let path = match output {
                Some(path) => path,
                None => {
                    let dir = PathBuf::from(&settings.sepa.export_dir);
                    std::fs::create_dir_all(&dir)
                        .with_context(|| format!("Failed to create {}", dir.display()))?;
                    let period = BillingPeriod::of(date);
                    dir.join(format!("debits-{:04}{:02}.csv", period.year(), period.month()))
                }
            };

            let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
            write_csv(file, &records)?;
            println!("{} orders marked as charging, {} debits written to {}", marked, records.len(), path.display());
        }
        Commands::SepaSettle => {
            let paid = context.sepa_batch.mark_charging_orders_as_paid(date).await?;
            println!("{} orders marked as paid", paid);
        }
        Commands::SepaReturns { file } => {
            let reader = File::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;
            let lines = read_returns(reader)?;
            let summary = context.sepa_batch.process_returns(lines).await;

            println!("{} returns processed, {} failed", summary.processed, summary.failed.len());
            for (order_id, error) in &summary.failed {
                println!("  order {}: {}", order_id, error);
            }
        }
        Commands::CardReconcile { file } => {
            let reader = File::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;
            let lines = read_reconciliation(reader)?;
            let summary = context.billing_service.reconcile_card_orders(lines, now).await;

            println!(
                "{} orders paid, {} declined, {} failed",
                summary.paid,
                summary.declined,
                summary.failed.len()
            );
            for (order_id, error) in &summary.failed {
                println!("  order {}: {}", order_id, error);
            }
        }
    }

    Ok(())
}

async fn build_context(settings: &Settings) -> anyhow::Result<Arc<ServiceContext>> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let notification_manager = Arc::new(NotificationManager::new());
    notification_manager.register(Arc::new(LogNotifier)).await;
    if let Some(smtp) = settings.notifications.smtp.clone() {
        notification_manager.register(Arc::new(EmailNotifier::new(smtp)?)).await;
    }

    let transport = Arc::new(ReqwestTransport::new(settings.redsys.request_timeout())?);
    let gateway = Arc::new(RedsysGateway::new(settings.redsys.clone(), transport));

    Ok(Arc::new(ServiceContext::new(
        db_pool,
        notification_manager,
        gateway,
        settings.sepa.clone(),
        settings.billing_policy(),
    )))
}
