use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;

use crate::downloader::types::Chunk;

/// Étapes de l'orchestrateur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Allocating,
    Fetching,
    Verifying,
    Done,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Planning => "planning",
            Phase::Allocating => "allocating",
            Phase::Fetching => "fetching",
            Phase::Verifying => "verifying",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Échec d'une tentative unique sur un segment. Toujours réessayable.
#[derive(thiserror::Error, Debug)]
pub enum ChunkError {
    #[error("erreur de transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("statut HTTP inattendu: {0}")]
    Status(StatusCode),
    #[error("délai dépassé après {0:?}")]
    Timeout(Duration),
    #[error("plage inattendue: {requested} demandée, {received} reçue")]
    UnexpectedRange { requested: String, received: String },
    #[error("corps trop court: {received} octets reçus sur {expected}")]
    ShortBody { expected: u64, received: u64 },
    #[error("erreur d'écriture: {0}")]
    Write(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("configuration invalide: {0}")]
    Configuration(String),
    #[error("cible injoignable {url}: {source}")]
    UnreachableTarget {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("statut inattendu pour {url}: {status}")]
    UnexpectedStatus { url: String, status: StatusCode },
    #[error("en-tête {header} absent ou invalide pour {url}")]
    MissingHeader { url: String, header: &'static str },
    #[error("erreur système de fichiers ({phase}) sur {}: {source}", .path.display())]
    Filesystem {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("segment {chunk} en échec après {attempts} tentative(s): {source}")]
    ChunkFetchExhausted {
        chunk: Chunk,
        attempts: u32,
        #[source]
        source: ChunkError,
    },
    #[error("tâche de téléchargement interrompue: {0}")]
    Worker(String),
    #[error("empreinte invalide: attendue {expected}, obtenue {actual}")]
    IntegrityMismatch { expected: String, actual: String },
}

impl DownloadError {
    /// Étape de l'orchestrateur à laquelle l'erreur s'est produite.
    pub fn phase(&self) -> Phase {
        match self {
            DownloadError::Configuration(_)
            | DownloadError::UnreachableTarget { .. }
            | DownloadError::UnexpectedStatus { .. }
            | DownloadError::MissingHeader { .. } => Phase::Planning,
            DownloadError::Filesystem { phase, .. } => *phase,
            DownloadError::ChunkFetchExhausted { .. } | DownloadError::Worker(_) => Phase::Fetching,
            DownloadError::IntegrityMismatch { .. } => Phase::Verifying,
        }
    }

    /// Les octets sont sur disque mais n'ont pas pu être validés.
    pub fn is_integrity_only(&self) -> bool {
        matches!(self, DownloadError::IntegrityMismatch { .. })
    }
}

/// Options contrôlant le comportement
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    /// nombre de workers concurrents
    pub max_workers: usize,
    /// taille cible d'un segment en octets
    pub chunk_size: u64,
    /// nombre de nouvelles tentatives par segment (0 = une seule tentative)
    pub retries: u32,
    /// borne de durée pour chaque tentative (requête, corps et écriture)
    pub request_timeout: Duration,
    /// délai de base entre deux tentatives, doublé à chaque échec
    pub retry_backoff: Duration,
    /// comparer le MD5 du fichier final avec l'`ETag`
    pub verify_digest: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_workers: 8,
            chunk_size: 4 * 1024 * 1024, // 4 MiB
            retries: 3,
            request_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(500),
            verify_digest: true,
        }
    }
}

impl DownloadOptions {
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.max_workers == 0 {
            return Err(DownloadError::Configuration(
                "il faut au moins un worker".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::Configuration(
                "la taille de chunk doit être strictement positive".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(DownloadError::Configuration(
                "le délai par requête doit être strictement positif".into(),
            ));
        }
        Ok(())
    }
}
