//! Pool de workers: chaque worker consomme la file partagée de segments jusqu'à sa
//! fermeture, télécharge le segment avec une requête `Range` et l'écrit à son offset.
//!
//! Cycle de vie d'un segment:
//! `Pending(n) → tentative → Succeeded | Pending(n - 1) | Exhausted`.
//! Un segment épuisé est consigné dans le rapport du worker, qui continue avec la suite
//! de la file: un échec n'interrompt jamais les autres segments.
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use tokio::sync::{Mutex, mpsc};
use tracing::{Instrument, debug, info_span, warn};

use crate::downloader::params::ChunkError;
use crate::downloader::types::Chunk;
use crate::downloader::utils::write_at;

/// Plafond du délai exponentiel entre deux tentatives.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// File partagée, non ordonnée. `recv` rend `None` une fois l'émetteur fermé et la file vide.
pub type ChunkQueue = Arc<Mutex<mpsc::UnboundedReceiver<Chunk>>>;

/// Dépendances communes à tous les workers d'un téléchargement.
#[derive(Debug)]
pub struct FetchContext {
    pub client: Client,
    pub url: String,
    pub output: PathBuf,
    pub retries: u32,
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
    /// octets écrits par l'ensemble des workers
    pub bytes_written: AtomicU64,
}

/// Segment dont toutes les tentatives ont échoué.
#[derive(Debug)]
pub struct ChunkFailure {
    pub chunk: Chunk,
    pub attempts: u32,
    pub cause: ChunkError,
}

/// Bilan d'un worker une fois la file épuisée.
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub worker: usize,
    pub completed: usize,
    pub bytes: u64,
    pub failures: Vec<ChunkFailure>,
}

enum ChunkState {
    Pending { retries_left: u32 },
    Succeeded(u64),
    Exhausted(ChunkError),
}

/// Boucle d'un worker: prend le prochain segment disponible jusqu'à fermeture de la file.
pub async fn run_worker(id: usize, ctx: Arc<FetchContext>, queue: ChunkQueue) -> WorkerReport {
    let mut report = WorkerReport {
        worker: id,
        ..WorkerReport::default()
    };

    async {
        loop {
            // le verrou n'est gardé que le temps d'obtenir un segment
            let next = queue.lock().await.recv().await;
            let Some(chunk) = next else {
                break;
            };

            match fetch_chunk(&ctx, chunk).await {
                Ok(bytes) => {
                    report.completed += 1;
                    report.bytes += bytes;
                }
                Err(failure) => report.failures.push(failure),
            }
        }
        debug!(
            completed = report.completed,
            failed = report.failures.len(),
            "file épuisée"
        );
    }
    .instrument(info_span!("worker", id))
    .await;

    report
}

/// Télécharge un segment avec son budget de tentatives.
pub async fn fetch_chunk(ctx: &FetchContext, chunk: Chunk) -> Result<u64, ChunkFailure> {
    let mut state = ChunkState::Pending {
        retries_left: ctx.retries,
    };
    let mut attempts = 0u32;

    loop {
        state = match state {
            ChunkState::Pending { retries_left } => {
                attempts += 1;
                match attempt(ctx, chunk).await {
                    Ok(bytes) => ChunkState::Succeeded(bytes),
                    Err(cause) if retries_left == 0 => ChunkState::Exhausted(cause),
                    Err(cause) => {
                        warn!(%chunk, attempt = attempts, retries_left, error = %cause, "tentative en échec");
                        tokio::time::sleep(backoff(ctx.retry_backoff, attempts)).await;
                        ChunkState::Pending {
                            retries_left: retries_left - 1,
                        }
                    }
                }
            }
            ChunkState::Succeeded(bytes) => {
                ctx.bytes_written.fetch_add(bytes, Ordering::Relaxed);
                debug!(%chunk, attempts, "segment écrit");
                return Ok(bytes);
            }
            ChunkState::Exhausted(cause) => {
                warn!(%chunk, attempts, error = %cause, "segment abandonné");
                return Err(ChunkFailure {
                    chunk,
                    attempts,
                    cause,
                });
            }
        };
    }
}

/// Une tentative unique, bornée par `request_timeout`.
async fn attempt(ctx: &FetchContext, chunk: Chunk) -> Result<u64, ChunkError> {
    match tokio::time::timeout(ctx.request_timeout, request_and_write(ctx, chunk)).await {
        Ok(result) => result,
        Err(_) => Err(ChunkError::Timeout(ctx.request_timeout)),
    }
}

async fn request_and_write(ctx: &FetchContext, chunk: Chunk) -> Result<u64, ChunkError> {
    let resp = ctx
        .client
        .get(&ctx.url)
        .header(RANGE, chunk.range_header())
        .send()
        .await?;

    // 206: la plage est honorée; 200: le serveur renvoie tout le fichier
    let skip = match resp.status() {
        StatusCode::PARTIAL_CONTENT => {
            check_content_range(&resp, chunk)?;
            0
        }
        StatusCode::OK => chunk.start,
        other => return Err(ChunkError::Status(other)),
    };

    write_at(&ctx.output, chunk.start, skip, chunk.len(), resp.bytes_stream()).await
}

/// Une réponse 206 doit commencer à l'offset demandé, sinon les octets seraient
/// écrits au mauvais endroit. Un en-tête absent est toléré.
fn check_content_range(resp: &reqwest::Response, chunk: Chunk) -> Result<(), ChunkError> {
    let Some(value) = resp.headers().get(CONTENT_RANGE) else {
        return Ok(());
    };
    let received = String::from_utf8_lossy(value.as_bytes()).into_owned();
    if content_range_start(&received) == Some(chunk.start) {
        return Ok(());
    }
    Err(ChunkError::UnexpectedRange {
        requested: chunk.range_header(),
        received,
    })
}

/// Premier octet d'un `Content-Range: bytes start-end/total`.
fn content_range_start(value: &str) -> Option<u64> {
    let (start, _) = value.trim().strip_prefix("bytes ")?.split_once('-')?;
    start.trim().parse().ok()
}

/// `base * 2^(attempt - 1)`, plafonné.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}
