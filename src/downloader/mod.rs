//! Gestionnaire de téléchargement parallèle par plages d'octets.
//!
//! Ce module regroupe:
//! - **types**: structures de données (`Chunk`, `DownloadTask`, `TargetMetadata`) et le découpage.
//! - **params**: options, étapes et taxonomie des erreurs.
//! - **metadata**: résolution de la taille et de l'`ETag` par `HEAD`.
//! - **utils**: fonctions d'E/S (préallocation, écriture à un offset, MD5).
//! - **worker**: pool borné de workers consommant une file de segments.
//! - **manager**: orchestration, vérification et nettoyage.
//!
//! Conception:
//! - Le fichier de sortie est pré‑alloué à sa taille finale; chaque segment est écrit
//!   directement à son offset, sans fichiers de parties ni fusion.
//! - Les segments sont disjoints: deux workers n'écrivent jamais les mêmes octets.
//! - Le client HTTP est injecté dans `DownloadManager`, ce qui permet de tester contre
//!   un serveur local.
mod manager;
mod metadata;
mod params;
mod types;
mod utils;
mod worker;

#[cfg(test)]
mod test_server;

pub use manager::{DownloadManager, DownloadPlan};
pub use metadata::resolve;
pub use params::{ChunkError, DownloadError, DownloadOptions, Phase};
pub use types::{Chunk, DownloadReport, DownloadTask, TargetMetadata, split};
pub use utils::{create_empty_file, file_md5};

use std::path::PathBuf;

/// API publique minimale: télécharge une ressource `url` vers `output` avec les options
/// par défaut. Cache l'ensemble des détails d'orchestration.
pub async fn download_to(url: String, output: PathBuf) -> Result<DownloadReport, DownloadError> {
    let task = DownloadTask::new(url, output);
    DownloadManager::new().download(&task).await
}
