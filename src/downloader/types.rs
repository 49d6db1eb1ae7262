//! Types de base pour décrire une tâche de téléchargement et ses segments.
//!
//! Invariants principaux:
//! - `total_size` représente la taille totale attendue du fichier (en octets).
//! - `chunk_size` (> 0) est la taille cible d'un segment; le dernier peut être plus petit.
//! - Les segments générés couvrent l'intervalle `[0, total_size - 1]` sans chevauchement,
//!   et dans l'ordre croissant. Les bornes `end` sont inclusives, comme dans l'en‑tête
//!   HTTP `Range: bytes=start-end`.
use std::path::PathBuf;

use serde::Serialize;

use crate::downloader::params::{DownloadError, DownloadOptions};

/// Représente un intervalle (chunk) d'un téléchargement, bornes inclusives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    /// Nombre d'octets couverts par le segment.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Valeur de l'en‑tête `Range` pour ce segment.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} [{}-{}]", self.index, self.start, self.end)
    }
}

/// Génère les segments à partir de la taille totale et de la taille cible des chunks.
///
/// Contrats:
/// - Retourne `DownloadError::Configuration` si `total_size == 0` ou `chunk_size == 0`.
/// - Produit `ceil(total_size / chunk_size)` segments continus, sans trou ni chevauchement.
/// - La capacité du vecteur est réservée pour minimiser les réallocations.
pub fn split(total_size: u64, chunk_size: u64) -> Result<Vec<Chunk>, DownloadError> {
    if total_size == 0 {
        return Err(DownloadError::Configuration(
            "la taille totale doit être strictement positive".into(),
        ));
    }
    if chunk_size == 0 {
        return Err(DownloadError::Configuration(
            "la taille de chunk doit être strictement positive".into(),
        ));
    }

    let estimated_chunks = total_size.div_ceil(chunk_size) as usize;
    let mut chunks = Vec::with_capacity(estimated_chunks);
    let mut start = 0u64;
    let mut index = 0usize;

    while start < total_size {
        let end = start.saturating_add(chunk_size - 1).min(total_size - 1);
        chunks.push(Chunk { index, start, end });
        index += 1;
        start = end + 1;
    }

    Ok(chunks)
}

/// Métadonnées de la ressource distante, résolues une seule fois par téléchargement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMetadata {
    pub content_length: u64,
    /// Valeur de l'`ETag` sans guillemets, interprétée comme un MD5 hexadécimal.
    pub digest: String,
}

/// Représente une tâche de téléchargement (fichier complet)
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub output: PathBuf,
    pub options: DownloadOptions,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
            options: DownloadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Vérifie l'URL et les options avant toute E/S.
    pub fn validate(&self) -> Result<(), DownloadError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| DownloadError::Configuration(format!("URL invalide {}: {}", self.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::Configuration(format!(
                "schéma non supporté: {}",
                parsed.scheme()
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(DownloadError::Configuration("chemin de sortie vide".into()));
        }
        self.options.validate()
    }
}

/// Résumé d'un téléchargement réussi.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub url: String,
    pub output: PathBuf,
    pub size: u64,
    pub chunks: usize,
    pub workers: usize,
    pub digest: String,
    /// `false` lorsque la vérification d'intégrité a été désactivée.
    pub verified: bool,
    pub elapsed_ms: u128,
}
