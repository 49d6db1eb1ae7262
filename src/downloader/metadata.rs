//! Résolution des métadonnées de la ressource distante par une requête `HEAD`.
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::downloader::params::DownloadError;
use crate::downloader::types::TargetMetadata;

/// Interroge `url` sans télécharger le corps et retourne la taille et l'empreinte annoncées.
///
/// `timeout` borne la requête entière; un serveur muet donne `UnreachableTarget`.
pub async fn resolve(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<TargetMetadata, DownloadError> {
    let resp = client
        .head(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| DownloadError::UnreachableTarget {
            url: url.to_string(),
            source,
        })?;

    if resp.status() != StatusCode::OK {
        return Err(DownloadError::UnexpectedStatus {
            url: url.to_string(),
            status: resp.status(),
        });
    }

    // `content_length()` reflète le corps (vide) d'une réponse HEAD: lire l'en-tête
    let content_length = resp
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| DownloadError::MissingHeader {
            url: url.to_string(),
            header: "content-length",
        })?;

    let digest = resp
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(normalize_etag)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DownloadError::MissingHeader {
            url: url.to_string(),
            header: "etag",
        })?;

    debug!(url, content_length, digest = %digest, "métadonnées résolues");

    Ok(TargetMetadata {
        content_length,
        digest,
    })
}

/// Retire le préfixe faible `W/` et tous les guillemets.
fn normalize_etag(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    raw.replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::test_server::{Behaviour, TestServer};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_normalize_etag() {
        assert_eq!(
            normalize_etag("\"6ab45198235ba77c5b99a2e68a030d7f\""),
            "6ab45198235ba77c5b99a2e68a030d7f"
        );
        assert_eq!(normalize_etag("W/\"abc\""), "abc");
        assert_eq!(normalize_etag("abc"), "abc");
        assert_eq!(normalize_etag("\"\""), "");
    }

    #[tokio::test]
    async fn test_resolve_reads_length_and_etag() {
        let data = b"hello world".to_vec();
        let server = TestServer::start(data, Behaviour::default()).await;

        let meta = resolve(&Client::new(), &server.url, TIMEOUT).await.unwrap();
        assert_eq!(meta.content_length, 11);
        assert_eq!(meta.digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        // HEAD only, no body fetched
        assert_eq!(server.get_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_missing_etag() {
        let behaviour = Behaviour {
            omit_etag: true,
            ..Behaviour::default()
        };
        let server = TestServer::start(vec![1, 2, 3], behaviour).await;

        let result = resolve(&Client::new(), &server.url, TIMEOUT).await;
        match result {
            Err(DownloadError::MissingHeader { header, .. }) => assert_eq!(header, "etag"),
            other => panic!("expected MissingHeader, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_unexpected_status() {
        let behaviour = Behaviour {
            head_status: Some(StatusCode::NOT_FOUND),
            ..Behaviour::default()
        };
        let server = TestServer::start(vec![1, 2, 3], behaviour).await;

        let result = resolve(&Client::new(), &server.url, TIMEOUT).await;
        match result {
            Err(DownloadError::UnexpectedStatus { status, .. }) => {
                assert_eq!(status, StatusCode::NOT_FOUND)
            }
            other => panic!("expected UnexpectedStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_unreachable() {
        // port 9 (discard) on loopback is not served by the test harness
        let result = resolve(&Client::new(), "http://127.0.0.1:9/file.bin", TIMEOUT).await;
        assert!(matches!(result, Err(DownloadError::UnreachableTarget { .. })));
    }

    #[tokio::test]
    async fn test_resolve_stalled_head_times_out() {
        let behaviour = Behaviour {
            head_delay: Duration::from_secs(5),
            ..Behaviour::default()
        };
        let server = TestServer::start(vec![1, 2, 3], behaviour).await;

        let started = std::time::Instant::now();
        let result = resolve(&Client::new(), &server.url, Duration::from_millis(100)).await;

        match result {
            Err(DownloadError::UnreachableTarget { source, .. }) => assert!(source.is_timeout()),
            other => panic!("expected UnreachableTarget, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    #[ignore = "network access to the public NYC TLC dataset"]
    async fn test_resolve_remote_fixture() {
        const TEST_URL: &str =
            "https://s3.amazonaws.com/nyc-tlc/trip+data/green_tripdata_2018-03.parquet";
        let meta = resolve(&Client::new(), TEST_URL, TIMEOUT).await.unwrap();
        assert_eq!(meta.content_length, 13_304_186);
        assert_eq!(meta.digest, "6ab45198235ba77c5b99a2e68a030d7f");
    }
}
