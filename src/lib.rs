//! Téléchargement d'un fichier volumineux par segments HTTP `Range` concurrents.
//!
//! ```no_run
//! use pdl::downloader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let report = downloader::download_to(
//!     "https://example.com/file.zip".to_string(),
//!     "file.zip".into(),
//! )
//! .await?;
//! println!("{} octets, md5 {}", report.size, report.digest);
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod downloader;
