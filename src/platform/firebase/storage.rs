//! Image uploads to the storage bucket.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Deserialize;

use super::{check_response, Firebase};
use crate::platform::BlobStore;

const STORAGE: &str = "https://firebasestorage.googleapis.com/v0/b";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    download_tokens: Option<String>,
}

/// Percent-encode an object path as a single URL component.
fn encode_object_name(path: &str) -> String {
    url::form_urlencoded::byte_serialize(path.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn download_url(bucket: &str, object: &str, token: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}/o/{}?alt=media",
        STORAGE,
        bucket,
        encode_object_name(object)
    );
    if let Some(token) = token {
        url.push_str("&token=");
        url.push_str(token);
    }
    url
}

impl BlobStore for Firebase {
    fn upload<'a>(
        &'a self,
        path: &'a str,
        bytes: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let token = self.inner.id_token().await?;
            let bucket = &self.inner.config.storage_bucket;
            let url = format!("{}/{}/o", STORAGE, bucket);
            tracing::debug!("Uploading {} ({} bytes)", path, bytes.len());

            let resp = self
                .inner
                .http
                .post(&url)
                .header("Authorization", format!("Firebase {}", token))
                .header("Content-Type", content_type)
                .query(&[("uploadType", "media"), ("name", path)])
                .body(bytes)
                .send()
                .await
                .with_context(|| format!("Storage upload to {} failed", url))?;
            let resp = check_response(resp, &url).await?;
            let uploaded: UploadResponse = resp
                .json()
                .await
                .context("Failed to parse upload response")?;

            Ok(download_url(
                bucket,
                &uploaded.name,
                uploaded.download_tokens.as_deref(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_encodes_path() {
        let url = download_url("b.appspot.com", "uploads/u1/x-my cat.png", Some("tok"));
        assert_eq!(
            url,
            "https://firebasestorage.googleapis.com/v0/b/b.appspot.com/o/uploads%2Fu1%2Fx-my%20cat.png?alt=media&token=tok"
        );
    }
}
