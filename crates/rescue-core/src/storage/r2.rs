//! Cloudflare R2 blob storage for report photos and videos.

use std::env;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;
use chrono::Utc;
use uuid::Uuid;

use crate::dispatch::BlobStore;
use crate::util::is_http_url;
use crate::{Error, Result};

const ENV_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
const ENV_BUCKET: &str = "R2_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
const ENV_PUBLIC_BASE_URL: &str = "R2_PUBLIC_BASE_URL";

const REQUIRED_KEYS: [&str; 4] = [
    ENV_ACCOUNT_ID,
    ENV_BUCKET,
    ENV_ACCESS_KEY_ID,
    ENV_SECRET_ACCESS_KEY,
];

/// Bucket credentials and the optional public URL reports should link to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct R2Config {
    pub account_id: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Public base URL; uploaded attachments are linked through it when set.
    pub public_base_url: Option<String>,
}

impl R2Config {
    /// `Ok(None)` when no R2 variable is set, an error when only some are.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

/// Uploads inline report attachments to an R2 bucket.
#[derive(Clone, Debug)]
pub struct R2BlobStore {
    config: R2Config,
    client: Client,
}

impl R2BlobStore {
    #[must_use]
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "rescue-attachments",
        );
        let sdk_config = aws_sdk_s3::config::Builder::new()
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url())
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &R2Config {
        &self.config
    }

    pub async fn put_attachment(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(ByteStream::from(bytes));
        if !content_type.trim().is_empty() {
            request = request.content_type(content_type.trim());
        }

        request.send().await.map_err(|error| {
            Error::Storage(format!(
                "R2 upload to {}/{key} failed: {error}",
                self.config.bucket
            ))
        })?;
        tracing::debug!("Uploaded attachment {key} to {}", self.config.bucket);
        Ok(())
    }

    /// Where a stored object can be fetched from: the public URL when one is
    /// configured, else an `r2://bucket/key` locator.
    pub fn locate(&self, key: &str) -> String {
        let key = key.trim_matches('/');
        match &self.config.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("r2://{}/{key}", self.config.bucket),
        }
    }
}

#[async_trait]
impl BlobStore for R2BlobStore {
    async fn upload(
        &self,
        namespace: &str,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let key = attachment_key(namespace, file_name, Utc::now().timestamp_millis())?;
        self.put_attachment(&key, bytes, content_type).await?;
        Ok(self.locate(&key))
    }
}

/// `<namespace>/<ms>-<uuid>-<file>`; every segment reduced to `[a-z0-9-]`.
fn attachment_key(namespace: &str, file_name: &str, timestamp_ms: i64) -> Result<String> {
    let prefix = namespace
        .split('/')
        .map(slug)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();
    if prefix.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Attachment namespace '{namespace}' has no usable segments"
        )));
    }

    let trimmed = file_name.trim();
    let (stem, extension) = trimmed.rsplit_once('.').unwrap_or((trimmed, ""));
    let stem = match slug(stem) {
        stem if stem.is_empty() => "attachment".to_string(),
        stem => stem,
    };
    let file = match slug(extension) {
        extension if extension.is_empty() => stem,
        extension => format!("{stem}.{extension}"),
    };

    Ok(format!(
        "{}/{timestamp_ms}-{}-{file}",
        prefix.join("/"),
        Uuid::now_v7()
    ))
}

fn slug(input: &str) -> String {
    input
        .to_lowercase()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<R2Config>> {
    let read = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let public_base_url = read(ENV_PUBLIC_BASE_URL);
    let required = REQUIRED_KEYS.map(read);
    if public_base_url.is_none() && required.iter().all(Option::is_none) {
        return Ok(None);
    }

    let [Some(account_id), Some(bucket), Some(access_key_id), Some(secret_access_key)] = required
    else {
        let missing = REQUIRED_KEYS
            .iter()
            .zip(&required)
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();
        return Err(Error::InvalidInput(format!(
            "R2 configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    };

    let public_base_url = match public_base_url {
        Some(url) if !is_http_url(&url) => {
            return Err(Error::InvalidInput(format!(
                "{ENV_PUBLIC_BASE_URL} must be an http(s) URL, got '{url}'"
            )));
        }
        other => other.map(|url| url.trim_end_matches('/').to_string()),
    };

    Ok(Some(R2Config {
        account_id,
        bucket,
        access_key_id,
        secret_access_key,
        public_base_url,
    }))
}
