//! # Downloader
//!
//! HTTP client construction and the streaming fetch that materializes
//! a remote resource as a local file.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::CacheError;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &HttpConfig) -> Result<Client, CacheError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5) // Allow multiple connections to same host
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    client_builder.build().map_err(CacheError::from)
}

/// Download a URL into `dest`, streaming through a `.part` sidecar.
///
/// The final path only ever holds complete bytes: chunks stream into
/// `<dest>.part`, which is renamed over `dest` after a clean finish
/// and removed on any failure. A non-success status is a failure, not
/// a partial file. Returns the number of bytes written.
pub async fn download_to_file(client: &Client, url: &str, dest: &Path) -> Result<u64, CacheError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(CacheError::Status(response.status()));
    }

    let part = part_path(dest);
    match write_stream(response, &part).await {
        Ok(written) => match fs::rename(&part, dest).await {
            Ok(()) => {
                debug!(url = %url, path = ?dest, bytes = written, "downloaded media");
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                Err(e.into())
            }
        },
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            Err(e)
        }
    }
}

async fn write_stream(response: reqwest::Response, part: &Path) -> Result<u64, CacheError> {
    let mut file = File::create(part).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Sidecar path for an in-progress download (`<dest>.part`)
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_create_client_defaults() {
        assert!(create_client(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/data/cache/video/video_clip.mp4")),
            Path::new("/data/cache/video/video_clip.mp4.part")
        );
    }

    #[tokio::test]
    async fn test_download_writes_complete_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/photo.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes("hello media"))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("image_photo.jpg");
        let client = create_client(&HttpConfig::default()).unwrap();

        let written = download_to_file(&client, &format!("{}/media/photo.jpg", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello media");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("image_gone.jpg");
        let client = create_client(&HttpConfig::default()).unwrap();

        let err = download_to_file(&client, &format!("{}/media/gone.jpg", server.uri()), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Status(status) if status.as_u16() == 404));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }
}
