use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tracing::info;
use uuid::Uuid;

use crate::{
    config::Settings,
    error::LaasError,
    models::{LandingContent, ThemeInfo},
    storage::ObjectStore,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedAsset {
    pub key: String,
    pub url: String,
}

/// Writes generated artifacts to the output bucket under fresh keys.
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    cdn_domain: Option<String>,
    public_bucket: bool,
    presign_expiry: Duration,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, settings: &Settings) -> Self {
        Self {
            store,
            bucket: settings.output_bucket.clone(),
            cdn_domain: settings.cdn_domain.clone(),
            public_bucket: settings.public_bucket,
            presign_expiry: settings.presign_expiry,
        }
    }

    /// Stores `bytes` at `{key_prefix}{uuid}.{ext}` and returns where it can be read.
    /// Storage failures are not retried.
    pub async fn publish(&self, bytes: Vec<u8>, content_type: &str, key_prefix: &str) -> Result<PublishedAsset, LaasError> {
        let key = format!("{key_prefix}{}.{}", Uuid::new_v4(), extension_for(content_type));
        self.store.put_object(&self.bucket, &key, bytes, content_type).await?;
        let url = self.url_for(&key).await?;
        info!(key = %key, "asset published");
        Ok(PublishedAsset { key, url })
    }

    pub async fn url_for(&self, key: &str) -> Result<String, LaasError> {
        if let Some(domain) = &self.cdn_domain {
            return Ok(format!("https://{domain}/{key}"));
        }
        if self.public_bucket {
            return Ok(format!("https://{}.s3.amazonaws.com/{key}", self.bucket));
        }
        self.presigned_url(key).await
    }

    pub async fn presigned_url(&self, key: &str) -> Result<String, LaasError> {
        self.store.presign_get(&self.bucket, key, self.presign_expiry).await
    }

    pub fn s3_uri(&self, key: &str) -> String {
        format!("s3://{}/{key}", self.bucket)
    }

    pub async fn put_json<T: serde::Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), LaasError> {
        let body = serde_json::to_vec(value).map_err(|e| LaasError::Unexpected(format!("encode {key}: {e}")))?;
        self.store.put_object(&self.bucket, key, body, "application/json").await
    }

    pub async fn put_html(&self, key: &str, html: &str) -> Result<(), LaasError> {
        self.store.put_object(&self.bucket, key, html.as_bytes().to_vec(), "text/html; charset=utf-8").await
    }

    /// Stores the generated sections and the theme under `generated/{id}/`.
    pub async fn store_landing_assets(
        &self,
        content: &LandingContent,
        theme: &ThemeInfo,
    ) -> Result<(String, BTreeMap<String, String>), LaasError> {
        let generation_id = Uuid::new_v4().to_string();
        let mut assets = BTreeMap::new();

        let content_key = format!("generated/{generation_id}/landing_content.json");
        self.put_json(&content_key, content).await?;
        assets.insert("content_key".to_string(), content_key);

        let theme_key = format!("generated/{generation_id}/theme_info.json");
        self.put_json(&theme_key, theme).await?;
        assets.insert("theme_key".to_string(), theme_key);

        info!(generation_id = %generation_id, assets = ?assets.keys().collect::<Vec<_>>(), "assets stored");
        Ok((generation_id, assets))
    }
}

const EXTENSIONS: [(&str, &str); 14] = [
    ("text/html", "html"),
    ("application/json", "json"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("image/x-icon", "ico"),
    ("image/vnd.microsoft.icon", "ico"),
    ("text/css", "css"),
    ("text/javascript", "js"),
    ("application/javascript", "js"),
    ("font/woff2", "woff2"),
    ("font/woff", "woff"),
];

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ct, _)| *ct == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

/// Content type implied by the extension of a URL path, for servers that send none.
pub fn guess_content_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    let extension = file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).unwrap_or_default();
    match extension.as_str() {
        "jpeg" => "image/jpeg",
        "htm" => "text/html",
        "mjs" => "text/javascript",
        ext => EXTENSIONS
            .iter()
            .find(|(_, e)| *e == ext)
            .map(|(ct, _)| *ct)
            .unwrap_or("application/octet-stream"),
    }
}
