use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::FaceEncoder;
use rollcall_store::{gallery, Aggregation, AttendanceRecord};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a photo for recognition and record attendance
    Recognize {
        /// Path to the photo (any common raster format)
        image: PathBuf,
    },
    /// Show the full attendance log
    Log,
    /// Show daemon status
    Status,
    /// Rebuild the gallery from a dataset directory (offline; bypasses
    /// the daemon, which picks the new gallery up on restart)
    Generate {
        /// Dataset directory: one sub-directory per identity
        dataset: PathBuf,
        /// How to aggregate an identity's sample embeddings
        #[arg(long, default_value = "mean", value_parser = parse_aggregation)]
        aggregation: Aggregation,
    },
}

fn parse_aggregation(s: &str) -> Result<Aggregation, String> {
    Aggregation::parse(s).ok_or_else(|| format!("unknown aggregation '{s}' (mean|medoid)"))
}

#[zbus::proxy(
    interface = "org.rollcall.Kiosk1",
    default_service = "org.rollcall.Kiosk1",
    default_path = "/org/rollcall/Kiosk1"
)]
trait Kiosk {
    async fn recognize(&self, image: Vec<u8>) -> zbus::Result<String>;
    async fn attendance_log(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Recognize { image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("could not read {}", image.display()))?;
            let proxy = kiosk_proxy().await?;
            let message = proxy.recognize(bytes).await?;
            println!("{message}");
        }
        Commands::Log => {
            let proxy = kiosk_proxy().await?;
            let json = proxy.attendance_log().await?;
            let records: Vec<AttendanceRecord> =
                serde_json::from_str(&json).context("daemon returned malformed log")?;
            print_log(&records);
        }
        Commands::Status => {
            let proxy = kiosk_proxy().await?;
            let status = proxy.status().await?;
            let value: serde_json::Value =
                serde_json::from_str(&status).context("daemon returned malformed status")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Generate {
            dataset,
            aggregation,
        } => {
            generate(&dataset, aggregation)?;
        }
    }

    Ok(())
}

async fn kiosk_proxy() -> Result<KioskProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("could not connect to the session bus")?;
    KioskProxy::new(&conn)
        .await
        .context("is rollcalld running?")
}

fn print_log(records: &[AttendanceRecord]) {
    if records.is_empty() {
        println!("No attendance records.");
        return;
    }

    let id_width = records
        .iter()
        .map(|r| r.identity.len())
        .max()
        .unwrap_or(0)
        .max("IDENTITY".len());

    println!("{:<id_width$}  {:<19}  EVENT", "IDENTITY", "TIMESTAMP");
    for r in records {
        println!(
            "{:<id_width$}  {}  {}",
            r.identity,
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.event.as_str(),
        );
    }
}

/// Offline gallery rebuild. Uses the same env-configured paths as the
/// daemon so the freshly written gallery is the one it loads next.
fn generate(dataset: &PathBuf, aggregation: Aggregation) -> Result<()> {
    let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| rollcall_core::default_model_dir());
    let model_path = model_dir.join("w600k_r50.onnx");

    let db_path = std::env::var("ROLLCALL_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let data_dir = std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                    PathBuf::from(home).join(".local/share")
                });
            data_dir.join("rollcall").join("kiosk.db")
        });

    let mut encoder = FaceEncoder::load(&model_path.to_string_lossy())
        .context("could not load the ArcFace model")?;

    println!("Generating gallery from {}...", dataset.display());
    let entries = gallery::generate(dataset, &mut encoder, aggregation)
        .context("gallery generation failed")?;

    let mut conn = rollcall_store::open(&db_path)?;
    gallery::save(&mut conn, &entries)?;

    println!(
        "Enrolled {} identities into {}",
        entries.len(),
        db_path.display()
    );
    Ok(())
}
