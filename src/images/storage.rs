use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use tracing::info;

use super::services::DecodedImage;
use crate::config::StorageConfig;

/// S3 refuses presigned URLs that live longer than a week.
const MAX_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Where recipe images live. Keys are produced by `images::services`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, key: &str, image: DecodedImage) -> anyhow::Result<()>;
    /// Removing a key that is already gone succeeds.
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
    /// Time-limited GET URL handed to API clients.
    async fn url(&self, key: &str) -> anyhow::Result<String>;
}

pub(crate) fn url_ttl(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(1, MAX_URL_TTL_SECS))
}

/// Recipe images in an S3 bucket (MinIO in development).
#[derive(Clone)]
pub struct S3ImageStore {
    client: Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3ImageStore {
    /// Build the client and make sure the image bucket exists.
    pub async fn connect(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "foodgram-env",
            ))
            .load()
            .await;

        // MinIO only understands path-style addressing.
        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        let store = Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            url_ttl: url_ttl(cfg.url_ttl_secs),
        };
        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> anyhow::Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .with_context(|| format!("create image bucket {}", self.bucket))?;
                info!(bucket = %self.bucket, "image bucket created");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("check image bucket {}", self.bucket)),
        }
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put(&self, key: &str, image: DecodedImage) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&image.content_type)
            .content_length(image.body.len() as i64)
            .body(ByteStream::from(image.body))
            .send()
            .await
            .with_context(|| format!("upload image {key}"))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("delete image {key}"))?;
        Ok(())
    }

    async fn url(&self, key: &str) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(self.url_ttl)?)
            .await
            .with_context(|| format!("presign image {key}"))?;
        Ok(presigned.uri().to_string())
    }
}

/// In-process store that remembers what was put, for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryImageStore {
    objects: std::sync::Mutex<std::collections::BTreeMap<String, String>>,
}

#[cfg(test)]
impl MemoryImageStore {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put(&self, key: &str, image: DecodedImage) -> anyhow::Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), image.content_type);
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn url(&self, key: &str) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_ttl_stays_within_presign_limits() {
        assert_eq!(url_ttl(0), Duration::from_secs(1));
        assert_eq!(url_ttl(1800), Duration::from_secs(1800));
        assert_eq!(url_ttl(u64::MAX), Duration::from_secs(MAX_URL_TTL_SECS));
    }

    #[tokio::test]
    async fn memory_store_forgets_removed_keys() {
        let store = MemoryImageStore::default();
        let image = DecodedImage {
            body: bytes::Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        };
        store.put("recipes/images/a.png", image).await.unwrap();
        assert_eq!(store.keys(), vec!["recipes/images/a.png".to_string()]);

        store.remove("recipes/images/a.png").await.unwrap();
        store.remove("recipes/images/a.png").await.unwrap();
        assert!(store.keys().is_empty());
    }
}
