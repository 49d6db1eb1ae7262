//! Interface en ligne de commande du téléchargeur parallèle.
//!
//! Étapes:
//! 1. Lire les arguments et, si fourni, le fichier de configuration TOML.
//! 2. Télécharger l'URL vers le fichier local via `DownloadManager`.
//! 3. Afficher le bilan (texte ou JSON) et sortir avec un code d'état.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use pdl::config::Config;
use pdl::downloader::{DownloadManager, DownloadReport, DownloadTask};

#[derive(Parser, Debug)]
#[command(version, about = "Télécharge un fichier par segments HTTP Range en parallèle.", long_about = None)]
struct Args {
    /// URL du fichier à télécharger.
    url: String,

    /// Fichier de destination (par défaut: dernier segment de l'URL).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Nombre maximum de workers concurrents.
    #[arg(short = 'w', long, alias = "maxgoroutines")]
    max_workers: Option<usize>,

    /// Taille d'un segment en octets.
    #[arg(short, long, alias = "chunksize")]
    chunk_size: Option<u64>,

    /// Nouvelles tentatives par segment en cas d'échec.
    #[arg(short, long)]
    retries: Option<u32>,

    /// Délai maximum par requête, en secondes.
    #[arg(short, long = "timeout")]
    timeout_secs: Option<u64>,

    /// Fichier de configuration TOML.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ne pas comparer le MD5 du fichier avec l'ETag.
    #[arg(long)]
    no_verify: bool,

    /// Afficher le bilan en JSON.
    #[arg(long)]
    json: bool,

    /// Journalisation détaillée.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Config {
        Config {
            max_workers: self.max_workers,
            chunk_size: self.chunk_size,
            retries: self.retries,
            timeout_secs: self.timeout_secs,
            backoff_ms: None,
            verify: self.no_verify.then_some(false),
        }
    }

    fn output_path(&self) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("download.bin"))
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_report(report: &DownloadReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "{} -> {} ({} octets, {} segments, {} workers, md5 {}{}, {} ms)",
            report.url,
            report.output.display(),
            report.size,
            report.chunks,
            report.workers,
            report.digest,
            if report.verified { "" } else { " non vérifié" },
            report.elapsed_ms
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let file_config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{:#}", anyhow::Error::from(e));
                return ExitCode::from(1);
            }
        },
        None => Config::default(),
    };
    let options = file_config.merge(args.overrides()).to_options();
    let task = DownloadTask::new(args.url.clone(), args.output_path()).with_options(options);

    match DownloadManager::new().download(&task).await {
        Ok(report) => match print_report(&report, args.json).context("écriture du bilan") {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Erreur: {:#}", e);
                ExitCode::from(1)
            }
        },
        Err(e) => {
            let integrity_only = e.is_integrity_only();
            let e = anyhow::Error::from(e).context(format!("téléchargement de {}", task.url));
            eprintln!("Erreur de téléchargement: {:#}", e);
            if integrity_only {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}
