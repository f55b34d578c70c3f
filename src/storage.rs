use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::{error::DisplayErrorContext, presigning::PresigningConfig, primitives::ByteStream};
use bytes::Bytes;
use tracing::info;

use crate::error::LaasError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), LaasError>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, LaasError>;
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, LaasError>;
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(config: &SdkConfig) -> Self {
        Self { client: aws_sdk_s3::Client::new(config) }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), LaasError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| LaasError::Storage(format!("put s3://{bucket}/{key}: {}", DisplayErrorContext(&e))))?;
        info!(bucket, key, size, content_type, "object stored");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, LaasError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| LaasError::Storage(format!("get s3://{bucket}/{key}: {}", DisplayErrorContext(&e))))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| LaasError::Storage(format!("read s3://{bucket}/{key}: {e}")))?;
        Ok(data.into_bytes())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, LaasError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| LaasError::Storage(format!("invalid presign expiry: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| LaasError::Storage(format!("presign s3://{bucket}/{key}: {}", DisplayErrorContext(&e))))?;
        Ok(request.uri().to_string())
    }
}
