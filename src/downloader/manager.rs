//! Orchestrateur du téléchargement.
//!
//! Rôle:
//! - `Planning`: valider la tâche, résoudre les métadonnées (`HEAD`) et découper en segments.
//! - `Allocating`: créer le fichier de sortie à sa taille finale.
//! - `Fetching`: lancer un pool borné de workers sur une file partagée, puis attendre
//!   la fin de tous les workers (barrière).
//! - `Verifying`: comparer le MD5 du fichier à l'`ETag` annoncé.
//!
//! Nettoyage:
//! - Un segment épuisé rend le fichier incohérent: il est supprimé.
//! - Une empreinte invalide laisse le fichier en place pour inspection.
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use reqwest::Client;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::downloader::metadata::resolve;
use crate::downloader::params::{DownloadError, Phase};
use crate::downloader::types::{Chunk, DownloadReport, DownloadTask, TargetMetadata, split};
use crate::downloader::utils::{create_empty_file, file_md5};
use crate::downloader::worker::{ChunkFailure, ChunkQueue, FetchContext, WorkerReport, run_worker};

/// Plan calculé avant toute écriture sur disque.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub metadata: TargetMetadata,
    pub chunks: Vec<Chunk>,
}

pub struct DownloadManager {
    client: Client,
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadManager {
    /// Initialise un nouveau gestionnaire de téléchargement avec un client par défaut
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Utilise un client HTTP fourni par l'appelant (pool de connexions partagé, proxy, tests).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Prépare les métadonnées et les segments, sans effet sur le système de fichiers.
    pub async fn prepare(&self, task: &DownloadTask) -> Result<DownloadPlan, DownloadError> {
        task.validate()?;
        let metadata = resolve(&self.client, &task.url, task.options.request_timeout).await?;
        let chunks = split(metadata.content_length, task.options.chunk_size)?;
        Ok(DownloadPlan { metadata, chunks })
    }

    /// Exécute le téléchargement complet et retourne son bilan.
    pub async fn download(&self, task: &DownloadTask) -> Result<DownloadReport, DownloadError> {
        let started = Instant::now();
        info!(
            url = %task.url,
            output = %task.output.display(),
            max_workers = task.options.max_workers,
            chunk_size = task.options.chunk_size,
            retries = task.options.retries,
            "début du téléchargement"
        );

        let result = self.run(task, started).await;
        match &result {
            Ok(report) => {
                transition(Phase::Done);
                info!(
                    size = report.size,
                    chunks = report.chunks,
                    elapsed_ms = report.elapsed_ms as u64,
                    "téléchargement terminé"
                );
            }
            Err(e) => {
                transition(Phase::Failed);
                error!(phase = %e.phase(), error = %e, "téléchargement en échec");
            }
        }
        result
    }

    async fn run(&self, task: &DownloadTask, started: Instant) -> Result<DownloadReport, DownloadError> {
        transition(Phase::Planning);
        let plan = self.prepare(task).await?;
        info!(
            size = plan.metadata.content_length,
            etag = %plan.metadata.digest,
            chunks = plan.chunks.len(),
            "plan établi"
        );

        transition(Phase::Allocating);
        allocate(&task.output, plan.metadata.content_length)?;

        transition(Phase::Fetching);
        let chunk_count = plan.chunks.len();
        let workers = task.options.max_workers.min(chunk_count);
        if let Err(e) = self.fetch_all(task, plan.chunks, workers).await {
            remove_output(&task.output).await;
            return Err(e);
        }

        let digest = if task.options.verify_digest {
            transition(Phase::Verifying);
            let actual = digest_of(&task.output).await?;
            if !actual.eq_ignore_ascii_case(&plan.metadata.digest) {
                warn!(
                    expected = %plan.metadata.digest,
                    actual = %actual,
                    "empreinte différente, fichier conservé"
                );
                return Err(DownloadError::IntegrityMismatch {
                    expected: plan.metadata.digest,
                    actual,
                });
            }
            actual
        } else {
            plan.metadata.digest
        };

        Ok(DownloadReport {
            url: task.url.clone(),
            output: task.output.clone(),
            size: plan.metadata.content_length,
            chunks: chunk_count,
            workers,
            digest,
            verified: task.options.verify_digest,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    /// Distribue les segments au pool et attend que chaque worker ait vidé la file.
    async fn fetch_all(
        &self,
        task: &DownloadTask,
        chunks: Vec<Chunk>,
        workers: usize,
    ) -> Result<(), DownloadError> {
        let ctx = Arc::new(FetchContext {
            client: self.client.clone(),
            url: task.url.clone(),
            output: task.output.clone(),
            retries: task.options.retries,
            request_timeout: task.options.request_timeout,
            retry_backoff: task.options.retry_backoff,
            bytes_written: AtomicU64::new(0),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let queue: ChunkQueue = Arc::new(Mutex::new(rx));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(run_worker(id, Arc::clone(&ctx), Arc::clone(&queue)));
        }

        for chunk in chunks {
            // les workers ne lâchent le récepteur qu'à la fin: l'envoi ne peut échouer qu'après un panic
            if tx.send(chunk).is_err() {
                break;
            }
        }
        // fermeture de la file: les workers sortent une fois qu'elle est vide
        drop(tx);

        let mut failures: Vec<ChunkFailure> = Vec::new();
        let mut panicked = None;
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(WorkerReport {
                    worker,
                    completed,
                    bytes,
                    failures: worker_failures,
                }) => {
                    debug!(worker, completed, bytes, failed = worker_failures.len(), "worker terminé");
                    failures.extend(worker_failures);
                }
                Err(e) => {
                    error!(error = %e, "worker interrompu");
                    panicked.get_or_insert_with(|| e.to_string());
                }
            }
        }

        if let Some(failure) = failures.into_iter().min_by_key(|f| f.chunk.start) {
            return Err(DownloadError::ChunkFetchExhausted {
                chunk: failure.chunk,
                attempts: failure.attempts,
                source: failure.cause,
            });
        }
        if let Some(reason) = panicked {
            return Err(DownloadError::Worker(reason));
        }

        debug!(
            bytes = ctx.bytes_written.load(std::sync::atomic::Ordering::Relaxed),
            "tous les segments sont écrits"
        );
        Ok(())
    }
}

fn transition(phase: Phase) {
    debug!(%phase, "transition");
}

/// Crée le fichier à sa taille finale. Un fichier déjà présent que l'on n'a pas pu
/// ouvrir reste intact: seul `create_empty_file` retire ce qu'il a lui-même créé.
fn allocate(path: &Path, size: u64) -> Result<(), DownloadError> {
    create_empty_file(path, size)
        .map(drop)
        .map_err(|source| DownloadError::Filesystem {
            phase: Phase::Allocating,
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "fichier incomplet supprimé"),
        Err(e) => warn!(path = %path.display(), error = %e, "impossible de supprimer le fichier"),
    }
}

/// MD5 calculé sur un thread bloquant.
async fn digest_of(path: &Path) -> Result<String, DownloadError> {
    let owned = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || file_md5(&owned))
        .await
        .map_err(|e| interrupted_digest(path, e))?;
    result.map_err(|source| DownloadError::Filesystem {
        phase: Phase::Verifying,
        path: path.to_path_buf(),
        source,
    })
}

/// Un calcul d'empreinte interrompu reste une erreur de l'étape `Verifying`.
fn interrupted_digest(path: &Path, e: JoinError) -> DownloadError {
    DownloadError::Filesystem {
        phase: Phase::Verifying,
        path: path.to_path_buf(),
        source: io::Error::other(e.to_string()),
    }
}
