use clap::{Parser, Subcommand};
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use tracing::{error, info, warn};

use webmonitor::db::schema::ensure_schema;
use webmonitor::db::services::{self as db_services, NewWebsite};
use webmonitor::db::store::SeaOrmStore;
use webmonitor::monitor::probes::{ReqwestHttpProbe, RustlsExpiryProbe, WhoisExpiryProbe};
use webmonitor::monitor::{CheckOutcome, CheckPipeline, TargetScheduler};
use webmonitor::notifications::senders::{EmailSender, LogSender, NotificationSender};
use webmonitor::notifications::NotificationService;
use webmonitor::server::config::MonitorConfig;
use webmonitor::server::logging::init_logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule checks for every website until Ctrl-C (default)
    Run,
    /// Check one website now
    Check { id: i32 },
    /// Check every website now
    CheckAll,
    /// Send a test email through the configured channel
    TestEmail { to: String },
    /// Add a website to monitor
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        /// Seconds between checks
        #[arg(long, default_value_t = 300)]
        interval: i32,
        /// Address for up/down notifications
        #[arg(long)]
        email: Option<String>,
    },
    /// Stop monitoring a website and delete its history
    Remove { id: i32 },
    /// Show the recorded incidents of a website
    History { id: i32 },
}

fn log_outcome(outcome: &CheckOutcome) {
    info!(
        website_id = outcome.website_id,
        status = outcome.status,
        prev_status = ?outcome.prev_status,
        notify_up = outcome.decision.notify_up,
        notify_down = outcome.decision.notify_down,
        notified = outcome.notified,
        "Check complete."
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = match MonitorConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting webmonitor, version: {}", VERSION);

    // --- Database Setup ---
    let mut opt = ConnectOptions::new(config.database_url.clone());
    opt.max_connections(10).sqlx_logging(false);
    let db = Database::connect(opt).await?;
    ensure_schema(&db).await?;

    // --- Notification Setup ---
    let sender: Arc<dyn NotificationSender> = match &config.smtp {
        Some(smtp) => Arc::new(EmailSender::new(smtp)?),
        None => {
            warn!("SMTP_HOST is not set; notifications will only be logged.");
            Arc::new(LogSender)
        }
    };
    let notifications = NotificationService::new(sender, config.templates.clone());

    // --- Engine Setup ---
    let pipeline = Arc::new(CheckPipeline::new(
        Arc::new(SeaOrmStore::new(db.clone())),
        Arc::new(ReqwestHttpProbe::new(config.http_timeout())?),
        Arc::new(RustlsExpiryProbe::new(config.probe_timeout())?),
        Arc::new(WhoisExpiryProbe::new(config.probe_timeout())),
        notifications.clone(),
    ));
    let scheduler = TargetScheduler::new(pipeline, config.max_in_flight_per_target);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            scheduler.start().await?;
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received.");
            scheduler.shutdown().await;
        }
        Command::Check { id } => {
            let outcome = scheduler.run_check_now(id).await?;
            log_outcome(&outcome);
        }
        Command::CheckAll => {
            for (website_id, result) in scheduler.run_check_all().await? {
                match result {
                    Ok(outcome) => log_outcome(&outcome),
                    Err(e) => error!(website_id, error = %e, "Check failed."),
                }
            }
        }
        Command::TestEmail { to } => {
            notifications.send_test_email(&to).await?;
        }
        Command::Add {
            name,
            url,
            interval,
            email,
        } => {
            let website = db_services::create_website(
                &db,
                NewWebsite {
                    name,
                    url,
                    checking_interval: interval,
                    email_notifications: email.is_some(),
                    notification_email: email,
                },
            )
            .await?;
            info!(website_id = website.id, url = %website.url, "Website added.");
        }
        Command::Remove { id } => {
            let removed = db_services::delete_website(&db, id).await?;
            if removed == 0 {
                warn!(website_id = id, "No such website.");
            } else {
                info!(website_id = id, "Website removed.");
            }
        }
        Command::History { id } => {
            for entry in db_services::list_history(&db, id).await? {
                println!("{}\t{}", entry.timestamp.to_rfc3339(), entry.status_code);
            }
        }
    }

    Ok(())
}
