use anyhow::{Context, Result, bail};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use bytes::Bytes;
use catalog_types::api::ObjectInfo;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub force_path_style: bool,
    /// Base of public object URLs. Defaults to the endpoint.
    pub public_url: Option<String>,
}

enum Backend {
    S3(Client),
    /// Objects in `dir`; uploads are staged in `scratch`, which is never served.
    Local { dir: PathBuf, scratch: PathBuf },
}

/// Object storage for uploaded files.
///
/// Objects are flat keys in one bucket, public at `{public_url}/{bucket}/{key}`.
pub struct Storage {
    backend: Backend,
    bucket: String,
    public_url: String,
}

impl Storage {
    pub async fn s3(settings: S3Settings) -> Result<Self> {
        check_bucket(&settings.bucket)?;
        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "catalog",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .credentials_provider(credentials)
            .load()
            .await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.force_path_style)
            .build();

        info!(
            "Object storage: S3 bucket {} at {} (region {})",
            settings.bucket, settings.endpoint, settings.region
        );
        let public_url = settings.public_url.as_deref().unwrap_or(&settings.endpoint);
        Ok(Self {
            backend: Backend::S3(Client::from_conf(config)),
            public_url: public_url.trim_end_matches('/').to_string(),
            bucket: settings.bucket,
        })
    }

    /// Disk-backed bucket at `{root}/{bucket}` for development.
    pub async fn local(root: PathBuf, bucket: &str, public_url: &str) -> Result<Self> {
        check_bucket(bucket)?;
        let dir = root.join(bucket);
        let scratch = root.join(".partial");
        fs::create_dir_all(&dir).await?;
        fs::create_dir_all(&scratch).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self {
            backend: Backend::Local { dir, scratch },
            bucket: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Directory holding the objects when the bucket is on local disk.
    pub fn local_dir(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Local { dir, .. } => Some(dir),
            Backend::S3(_) => None,
        }
    }

    /// Fresh key for an uploaded file: `{uuid}-{sanitized filename}`.
    pub fn new_key(filename: &str) -> String {
        format!("{}-{}", uuid::Uuid::new_v4(), sanitize(filename))
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket, key)
    }

    /// Writes a publicly readable object, replacing any previous one under the same key.
    pub async fn put(&self, key: &str, data: &Bytes, content_type: &str) -> Result<u64> {
        check_key(key)?;
        match &self.backend {
            Backend::S3(client) => {
                client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(data.clone()))
                    .content_type(content_type)
                    .acl(ObjectCannedAcl::PublicRead)
                    .send()
                    .await
                    .with_context(|| format!("Failed to upload {}/{}", self.bucket, key))?;
            }
            Backend::Local { dir, scratch } => {
                let tmp = scratch.join(format!("{}.part", uuid::Uuid::new_v4()));
                let mut file = fs::File::create(&tmp).await?;
                file.write_all(data).await?;
                file.flush().await?;
                drop(file);
                if let Err(e) = fs::rename(&tmp, dir.join(key)).await {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(e.into());
                }
            }
        }
        Ok(data.len() as u64)
    }

    /// Deletes an object. A missing object is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        match &self.backend {
            Backend::S3(client) => {
                client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .with_context(|| format!("Failed to delete {}/{}", self.bucket, key))?;
                info!("Deleted object {}/{}", self.bucket, key);
                Ok(())
            }
            Backend::Local { dir, .. } => match fs::remove_file(dir.join(key)).await {
                Ok(()) => {
                    info!("Deleted object {}/{}", self.bucket, key);
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Object {}/{} already gone", self.bucket, key);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    pub async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        check_key(key)?;
        match &self.backend {
            Backend::S3(client) => {
                let out = match client.head_object().bucket(&self.bucket).key(key).send().await {
                    Ok(out) => out,
                    Err(e) if e.as_service_error().is_some_and(|e| e.is_not_found()) => {
                        return Ok(None);
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("Failed to stat {}/{}", self.bucket, key));
                    }
                };
                Ok(Some(ObjectInfo {
                    key: key.to_string(),
                    size: out.content_length().unwrap_or(0).max(0) as u64,
                    last_modified: out.last_modified().and_then(to_utc).unwrap_or_else(Utc::now),
                    content_type: out.content_type().map(str::to_string),
                }))
            }
            Backend::Local { dir, .. } => match fs::metadata(dir.join(key)).await {
                Ok(meta) => Ok(Some(ObjectInfo {
                    key: key.to_string(),
                    size: meta.len(),
                    last_modified: meta.modified().map(DateTime::<Utc>::from)?,
                    content_type: None,
                })),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Every object in the bucket, newest first.
    pub async fn list(&self) -> Result<Vec<ObjectInfo>> {
        let mut objects = match &self.backend {
            Backend::S3(client) => self.list_s3(client).await?,
            Backend::Local { dir, .. } => list_dir(dir).await?,
        };
        objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(objects)
    }

    async fn list_s3(&self, client: &Client) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut token = None;
        loop {
            let page = client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(token)
                .send()
                .await
                .with_context(|| format!("Failed to list bucket {}", self.bucket))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectInfo {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_utc).unwrap_or_else(Utc::now),
                    content_type: None,
                });
            }
            match page.next_continuation_token() {
                Some(next) if page.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(objects)
    }
}

async fn list_dir(dir: &Path) -> Result<Vec<ObjectInfo>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut objects = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        objects.push(ObjectInfo {
            key: name,
            size: meta.len(),
            last_modified: meta.modified().map(DateTime::<Utc>::from)?,
            content_type: None,
        });
    }
    Ok(objects)
}

fn to_utc(time: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

fn check_bucket(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket.starts_with('.') || bucket.contains(['/', '\\']) {
        bail!("Invalid bucket name: {:?}", bucket);
    }
    Ok(())
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
        bail!("Invalid object key: {:?}", key);
    }
    Ok(())
}

/// Keeps ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`.
fn sanitize(filename: &str) -> String {
    let name: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_start_matches('.');
    if name.is_empty() {
        "file".to_string()
    } else {
        name.chars().take(100).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("catalog-storage-{}", uuid::Uuid::new_v4()))
    }

    async fn storage() -> Storage {
        Storage::local(temp_root(), "catalog", "http://localhost:3000/public/")
            .await
            .unwrap()
    }

    #[test]
    fn keys_are_unique_and_sanitized() {
        let a = Storage::new_key("my cat.png");
        let b = Storage::new_key("my cat.png");
        assert_ne!(a, b);
        assert!(a.ends_with("-my_cat.png"));
        assert!(Storage::new_key("../../etc/passwd").ends_with("-_.._etc_passwd"));
        assert!(Storage::new_key("").ends_with("-file"));
    }

    #[tokio::test]
    async fn put_head_list_delete() {
        let storage = storage().await;
        let key = Storage::new_key("cat.png");
        let size = storage
            .put(&key, &Bytes::from_static(b"meow"), "image/png")
            .await
            .unwrap();
        assert_eq!(size, 4);

        let info = storage.head(&key).await.unwrap().unwrap();
        assert_eq!(info.size, 4);

        let listed = storage.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, key);

        storage.delete(&key).await.unwrap();
        assert!(storage.head(&key).await.unwrap().is_none());
        // Deleting twice is fine.
        storage.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn staging_files_stay_out_of_the_bucket() {
        let root = temp_root();
        let storage = Storage::local(root.clone(), "catalog", "http://x").await.unwrap();
        let key = Storage::new_key("cat.png");
        storage
            .put(&key, &Bytes::from_static(b"meow"), "image/png")
            .await
            .unwrap();

        let dir = storage.local_dir().unwrap();
        assert_eq!(dir, root.join("catalog"));
        let names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![key]);
        assert_eq!(std::fs::read_dir(root.join(".partial")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn urls_and_key_validation() {
        let storage = storage().await;
        assert_eq!(
            storage.url_for("abc-cat.png"),
            "http://localhost:3000/public/catalog/abc-cat.png"
        );
        assert!(storage.head("../secret").await.is_err());
        assert!(storage.put(".hidden", &Bytes::new(), "text/plain").await.is_err());
    }

    #[tokio::test]
    async fn rejects_bad_bucket() {
        assert!(Storage::local(temp_root(), "../up", "http://x").await.is_err());
        assert!(Storage::local(temp_root(), ".partial", "http://x").await.is_err());
    }

    #[tokio::test]
    async fn s3_urls_default_to_the_endpoint() {
        let storage = Storage::s3(S3Settings {
            endpoint: "http://minio:9000/".into(),
            region: "us-east-1".into(),
            access_key: "access".into(),
            secret_key: "secret".into(),
            bucket: "catalog".into(),
            force_path_style: true,
            public_url: None,
        })
        .await
        .unwrap();
        assert!(storage.local_dir().is_none());
        assert_eq!(
            storage.url_for("abc-cat.png"),
            "http://minio:9000/catalog/abc-cat.png"
        );
    }
}
