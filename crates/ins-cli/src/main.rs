//! Insurance Portal document CLI

use chrono::Utc;
use clap::{Parser, Subcommand};
use ins_core::render::text;
use ins_core::{Contract, ContractDraft, ContractType, PolicyDuration, Renderer};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ins-cli")]
#[command(about = "Render and preview insurance contract documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a contract to contract-{id}.pdf
    Render {
        /// Contract JSON file (a stored contract or a creation payload)
        #[arg(short, long)]
        contract: PathBuf,

        /// Signature image to embed
        #[arg(short, long)]
        signature: Option<PathBuf>,

        /// Letterhead logo
        #[arg(short, long)]
        logo: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Print the document layout as text
    Preview {
        /// Contract JSON file (a stored contract or a creation payload)
        #[arg(short, long)]
        contract: PathBuf,

        /// Signature image to embed
        #[arg(short, long)]
        signature: Option<PathBuf>,

        /// Letterhead logo
        #[arg(short, long)]
        logo: Option<PathBuf>,
    },

    /// List contract types and durations
    Types,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    match cli.command {
        Commands::Render { contract, signature, logo, out_dir } => {
            cmd_render(contract, signature, logo, out_dir);
        }
        Commands::Preview { contract, signature, logo } => {
            cmd_preview(contract, signature, logo);
        }
        Commands::Types => {
            cmd_types();
        }
    }
}

/// Read a stored contract, or build a pending one from a creation payload.
fn load_contract(path: &Path) -> Result<Contract, String> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    if let Ok(contract) = serde_json::from_str::<Contract>(&data) {
        return Ok(contract);
    }

    let draft: ContractDraft =
        serde_json::from_str(&data).map_err(|e| format!("Invalid contract JSON: {}", e))?;
    draft
        .into_contract(Uuid::new_v4(), Uuid::nil(), Utc::now())
        .map_err(|e| e.to_string())
}

fn cmd_render(contract: PathBuf, signature: Option<PathBuf>, logo: Option<PathBuf>, out_dir: PathBuf) {
    info!("Rendering contract: {}", contract.display());

    let contract = match load_contract(&contract) {
        Ok(contract) => contract,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        error!("Failed to create {}: {}", out_dir.display(), e);
        std::process::exit(1);
    }

    let renderer = Renderer::new(&out_dir).with_logo(logo);
    match renderer
        .render(&contract, signature.as_deref())
        .and_then(|staged| staged.commit())
    {
        Ok(path) => info!("Document written to: {}", path.display()),
        Err(e) => {
            error!("Render failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_preview(contract: PathBuf, signature: Option<PathBuf>, logo: Option<PathBuf>) {
    let contract = match load_contract(&contract) {
        Ok(contract) => contract,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let renderer = Renderer::new(".").with_logo(logo);
    let layout = renderer.layout(&contract, signature.as_deref());
    println!("{}", text::generate(&layout));
}

fn cmd_types() {
    println!("\nContract Types\n{}", "=".repeat(50));
    for contract_type in ContractType::ALL {
        println!("  - {}", contract_type);
    }

    println!("\nDurations:");
    for duration in [PolicyDuration::SixMonths, PolicyDuration::OneYear] {
        println!("  - {} ({} months)", duration, duration.months());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_contract_from_creation_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.json");
        std::fs::write(
            &path,
            r#"{
                "type": "VOYAGE",
                "duration": "6_MONTHS",
                "prix": "120.00",
                "nameAgent": "Agent A",
                "emailAssurance": "agent@assurance.tn",
                "adresseAssurance": "Tunis"
            }"#,
        )
        .unwrap();

        let contract = load_contract(&path).unwrap();
        assert_eq!(contract.contract_type, ContractType::Voyage);
        assert!(contract.description.is_empty());
        assert!(contract.client_id.is_none());
    }

    #[test]
    fn test_load_contract_round_trips_stored_json() {
        let dir = tempfile::tempdir().unwrap();
        let draft: ContractDraft = serde_json::from_value(serde_json::json!({
            "type": "SANTE",
            "duration": "1_YEAR",
            "prix": 300,
            "nameAgent": "Agent A",
            "emailAssurance": "agent@assurance.tn",
            "adresseAssurance": "Tunis"
        }))
        .unwrap();
        let stored = draft.into_contract(Uuid::new_v4(), Uuid::new_v4(), Utc::now()).unwrap();
        let path = dir.path().join("contract.json");
        std::fs::write(&path, serde_json::to_string(&stored).unwrap()).unwrap();

        assert_eq!(load_contract(&path).unwrap(), stored);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(load_contract(&path).is_err());
    }
}
