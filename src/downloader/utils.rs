//! Fonctions utilitaires d'E/S pour le téléchargement.
//!
//! Objectifs:
//! - Pré‑allouer le fichier de sortie à sa taille finale pour que les écritures
//!   concurrentes ne l'étendent jamais.
//! - Écrire un flux d'octets à un décalage donné avec un descripteur ouvert le temps
//!   d'un seul segment.
//! - Calculer l'empreinte MD5 du fichier final avec un tampon de 1 MiB.
use std::fs::File;
use std::io::{self, BufReader, Read, SeekFrom};
use std::path::Path;

use futures::{Stream, StreamExt};
use md5::{Digest, Md5};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

use crate::downloader::params::ChunkError;

/// Crée ou tronque un fichier à la taille spécifiée.
/// Le contenu reste indéfini (creux ou zéros selon le système de fichiers)
/// jusqu'à ce que les segments soient écrits.
///
/// Si `File::create` échoue, rien n'a été touché et aucun fichier n'est supprimé.
/// Seul un fichier créé ici puis impossible à dimensionner est retiré.
pub fn create_empty_file(path: &Path, size: u64) -> io::Result<File> {
    let file = File::create(path)?;
    // alloue l'espace sur disque
    if let Err(e) = file.set_len(size) {
        drop(file);
        if let Err(cleanup) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %cleanup, "impossible de supprimer le fichier partiel");
        }
        return Err(e);
    }
    Ok(file)
}

/// Écrit au plus `len` octets du flux `body` dans `path` à partir de `offset`,
/// après avoir ignoré les `skip` premiers octets du flux.
///
/// Le fichier doit déjà exister: il est ouvert en lecture/écriture sans troncature,
/// puis fermé à la sortie de la fonction, y compris en cas d'erreur.
/// Retourne le nombre d'octets écrits; un flux trop court donne `ChunkError::ShortBody`.
pub async fn write_at<S, B, E>(
    path: &Path,
    offset: u64,
    skip: u64,
    len: u64,
    body: S,
) -> Result<u64, ChunkError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    ChunkError: From<E>,
{
    let mut file = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await?;
    file.seek(SeekFrom::Start(offset)).await?;

    tokio::pin!(body);
    let mut to_skip = skip;
    let mut written = 0u64;

    while written < len {
        let Some(piece) = body.next().await else {
            break;
        };
        let piece = piece?;
        let mut bytes = piece.as_ref();

        if to_skip > 0 {
            let n = to_skip.min(bytes.len() as u64);
            bytes = &bytes[n as usize..];
            to_skip -= n;
        }

        let take = (len - written).min(bytes.len() as u64) as usize;
        file.write_all(&bytes[..take]).await?;
        written += take as u64;
    }

    // tokio::fs::File termine ses écritures en arrière-plan: flush avant fermeture
    file.flush().await?;

    if written < len {
        return Err(ChunkError::ShortBody {
            expected: len,
            received: written,
        });
    }
    Ok(written)
}

/// Calcule le MD5 d'un fichier, en hexadécimal minuscule.
pub fn file_md5(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(1 << 20, file);
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; 1 << 20]; // 1 MiB

    loop {
        let read_count = reader.read(&mut buffer)?;
        if read_count == 0 {
            break;
        }
        hasher.update(&buffer[..read_count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
