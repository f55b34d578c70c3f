//! In-memory stand-ins for the external services, used by unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::{
    bedrock::ModelInvoker,
    config::Settings,
    error::LaasError,
    fetch::{FetchedAsset, PageFetcher},
    pipeline::{Laas, Services},
    prompts::ParameterStore,
    storage::ObjectStore,
};

pub fn test_settings() -> Settings {
    let env: HashMap<&str, &str> = [
        ("OUTPUT_BUCKET", "pages"),
        ("INPUT_BUCKET", "templates"),
        ("INPUT_KEY", "template.html"),
        ("BEDROCK_LLM_MODEL_ID", "text-model"),
        ("BEDROCK_IMAGE_MODEL_ID", "image-model"),
        ("BEDROCK_MODEL_ID", "rewrite-model"),
    ]
    .into_iter()
    .collect();
    let mut settings = Settings::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
    settings.retry.base_delay = Duration::from_millis(1);
    settings.fetch_retry_delay = Duration::from_millis(1);
    settings
}

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<(String, String), (Vec<u8>, String)>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self { fail_writes: true, ..Self::default() }
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &str, content_type: &str) {
        self.objects
            .write()
            .insert((bucket.into(), key.into()), (body.as_bytes().to_vec(), content_type.into()));
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects.read().get(&(bucket.to_string(), key.to_string())).map(|(b, _)| b.clone())
    }

    pub fn text(&self, bucket: &str, key: &str) -> Option<String> {
        self.object(bucket, key).and_then(|b| String::from_utf8(b).ok())
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects.read().get(&(bucket.to_string(), key.to_string())).map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), LaasError> {
        if self.fail_writes {
            return Err(LaasError::Storage(format!("put s3://{bucket}/{key}: AccessDenied")));
        }
        self.objects.write().insert((bucket.into(), key.into()), (body, content_type.into()));
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, LaasError> {
        self.object(bucket, key)
            .map(Bytes::from)
            .ok_or_else(|| LaasError::Storage(format!("get s3://{bucket}/{key}: NoSuchKey")))
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String, LaasError> {
        Ok(format!("https://presigned.test/{bucket}/{key}?expires={}", expires_in.as_secs()))
    }
}

#[derive(Default)]
pub struct StaticParameters {
    values: HashMap<String, String>,
}

impl StaticParameters {
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self { values: pairs.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }
    }
}

#[async_trait]
impl ParameterStore for StaticParameters {
    async fn get_parameter(&self, name: &str) -> Result<String, LaasError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| LaasError::Config(format!("ParameterNotFound: {name}")))
    }
}

/// Replays queued responses per model id and records every call.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, LaasError>>>>,
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl ScriptedModel {
    pub fn respond(self, model_id: &str, response: Result<Vec<u8>, LaasError>) -> Self {
        self.responses.lock().entry(model_id.to_string()).or_default().push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn invoke(&self, model_id: &str, body: &[u8]) -> Result<Vec<u8>, LaasError> {
        let payload = serde_json::from_slice(body).unwrap_or(serde_json::Value::Null);
        self.calls.lock().push((model_id.to_string(), payload));
        self.responses
            .lock()
            .get_mut(model_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(LaasError::Generation(format!("no scripted response for {model_id}"))))
    }
}

/// Serves fixed pages and binary assets by URL and records every request.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    assets: HashMap<String, (Vec<u8>, String)>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn with_asset(mut self, url: &str, body: &[u8], content_type: &str) -> Self {
        self.assets.insert(url.to_string(), (body.to_vec(), content_type.to_string()));
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, LaasError> {
        self.requested.lock().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| LaasError::Fetch(format!("GET {url}: connection refused")))
    }

    async fn fetch_asset(&self, url: &str) -> Result<FetchedAsset, LaasError> {
        self.requested.lock().push(url.to_string());
        if let Some((body, content_type)) = self.assets.get(url) {
            return Ok(FetchedAsset { body: Bytes::from(body.clone()), content_type: Some(content_type.clone()) });
        }
        self.pages
            .get(url)
            .map(|page| FetchedAsset { body: Bytes::from(page.clone()), content_type: None })
            .ok_or_else(|| LaasError::Fetch(format!("GET {url}: connection refused")))
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub model: Arc<ScriptedModel>,
    pub fetcher: Arc<StaticFetcher>,
    pub laas: Laas,
}

pub fn harness(store: MemoryStore, model: ScriptedModel, params: StaticParameters, fetcher: StaticFetcher) -> Harness {
    harness_with_settings(test_settings(), store, model, params, fetcher)
}

pub fn harness_with_settings(
    settings: Settings,
    store: MemoryStore,
    model: ScriptedModel,
    params: StaticParameters,
    fetcher: StaticFetcher,
) -> Harness {
    let store = Arc::new(store);
    let model = Arc::new(model);
    let fetcher = Arc::new(fetcher);
    let services = Services {
        store: store.clone(),
        model: model.clone(),
        params: Arc::new(params),
        fetcher: fetcher.clone(),
    };
    let laas = Laas::new(settings, services);
    Harness { store, model, fetcher, laas }
}
