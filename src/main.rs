use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod config;
mod digest;
mod features;
mod map;
mod models;
mod resolver;
mod scorer;
mod store;
mod table;
mod threshold;

use config::Config;
use table::Table;

#[derive(Parser)]
#[command(name = "locum-tracker")]
#[command(about = "Locum coverage need scoring, mapping and outreach digests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score the facility features file and rewrite the scores store
    Train,
    /// Enrich a facility CSV with stored scores, or dump the store
    Predict {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Re-score a facility CSV with the persisted model, without refitting
    Apply {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Render the interactive opportunities map to an HTML file
    Map {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value = "map.html")]
        out: PathBuf,
    },
    /// Build and send the daily email digest
    Digest {
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Train => {
            store::run_training(&config)?;
        }
        Commands::Predict { input, out } => {
            let input = input.map(|p| Table::from_csv_path(&p)).transpose()?;
            let resolved = resolver::predict_needs(&config, input)?;
            match out {
                Some(out) => {
                    resolved.write_csv_path(&out)?;
                    println!("Wrote {} scored rows to {}.", resolved.len(), out.display());
                }
                None => {
                    let bytes = resolved.to_csv_bytes()?;
                    print!("{}", String::from_utf8_lossy(&bytes));
                }
            }
        }
        Commands::Apply { input, out } => {
            let model = store::load_model(&config.model_path)?;
            let mut table = Table::from_csv_path(&input)?;
            let scores = scorer::apply_coefs(&table, &model.coefficients);
            store::attach_scores(&mut table, &scores, &config.thresholds)?;
            table.write_csv_path(&out)?;
            println!(
                "Scored {} rows with model trained {} on {}.",
                table.len(),
                model.trained_at,
                model.label_col
            );
        }
        Commands::Map { input, out } => {
            let input = input.map(|p| Table::from_csv_path(&p)).transpose()?;
            let resolved = resolver::predict_needs(&config, input)?;
            let contacts = store::load_contacts(&config.contacts_path);
            let rendered = map::create_map(&resolved, &contacts);
            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&out, rendered.render())?;
            println!(
                "Rendered {} markers to {}.",
                rendered.markers.len(),
                out.display()
            );
        }
        Commands::Digest { dry_run } => {
            digest::run_digest(&config, dry_run)?;
        }
    }

    Ok(())
}
