//! S3-compatible object storage client
//!
//! The pipeline's boundary to durable object storage: raw documents are
//! downloaded from here (deposited by the upstream acquisition service) and
//! quarantine records are uploaded back. Works against AWS S3 or a
//! MinIO-style endpoint (path-style addressing).

use anyhow::{Context, Result};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

pub mod config;

pub use config::ObjectStoreConfig;

#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        debug!("Initializing object store with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "pdp-object-store",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("Object store client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    /// Bucket this client is bound to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self))]
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context(format!("Failed to download from object store: {}", key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read object store response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(data)
    }

    #[instrument(skip(self, data))]
    pub async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        request
            .send()
            .await
            .context("Failed to upload to object store")?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(())
    }
}
