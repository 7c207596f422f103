//! S3 store implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from bfs-core for a
//! single bucket.

use std::ops::Range;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tracing::{debug, warn};
use url::Url;

use bfs_core::{
    DeleteOutcome, Error, ListRequest, ListResult, ListVersion, ObjectMeta, ObjectStore,
    ObjectSummary, Profile, Result,
};

/// How a failed request is reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Missing,
    Denied,
    PreconditionFailed,
    Other,
}

fn classify(status: Option<u16>, code: Option<&str>) -> Failure {
    match (status, code) {
        (Some(404), _) | (_, Some("NoSuchKey" | "NotFound")) => Failure::Missing,
        (Some(403), _)
        | (_, Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch")) => {
            Failure::Denied
        }
        (Some(412 | 409), _) | (_, Some("PreconditionFailed" | "ConditionalRequestConflict")) => {
            Failure::PreconditionFailed
        }
        _ => Failure::Other,
    }
}

fn failure_of<E>(err: &SdkError<E, HttpResponse>) -> Failure
where
    E: ProvideErrorMetadata,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    classify(status, err.code())
}

fn map_error<E>(err: SdkError<E, HttpResponse>, key: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match failure_of(&err) {
        Failure::Missing => Error::NotFound(key.to_string()),
        Failure::Denied => Error::Auth(format!("{key}: {}", DisplayErrorContext(&err))),
        Failure::PreconditionFailed | Failure::Other => {
            Error::Network(DisplayErrorContext(&err).to_string())
        }
    }
}

fn timestamp(dt: Option<&aws_smithy_types::DateTime>) -> Option<jiff::Timestamp> {
    dt.and_then(|d| jiff::Timestamp::from_second(d.secs()).ok())
}

fn size_of(len: Option<i64>) -> u64 {
    len.and_then(|l| u64::try_from(l).ok()).unwrap_or(0)
}

/// `x-amz-copy-source` value: bucket and percent-encoded key
fn copy_source(bucket: &str, key: &str) -> Result<String> {
    let mut url = Url::parse("s3://copy-source/")?;
    url.path_segments_mut()
        .map_err(|_| Error::General("cannot encode copy source".into()))?
        .clear()
        .push(bucket)
        .extend(key.split('/'));
    Ok(url.path().trim_start_matches('/').to_string())
}

/// `Range` header for a half-open byte range
fn range_header(range: &Range<u64>) -> String {
    format!("bytes={}-{}", range.start, range.end - 1)
}

/// Marker resuming a truncated V1 listing
///
/// Without a delimiter servers may omit NextMarker; the greatest returned
/// entry is the marker then.
fn v1_marker(page: &ListResult, next_marker: Option<&str>) -> Option<String> {
    if !page.truncated {
        return None;
    }
    let last_key = page.objects.last().map(|o| o.key.clone());
    let last_prefix = page.common_prefixes.last().cloned();
    next_marker.map(str::to_string).or_else(|| last_key.max(last_prefix))
}

/// One bucket of an S3-compatible endpoint
pub struct S3Store {
    inner: aws_sdk_s3::Client,
    bucket: String,
    list_version: ListVersion,
}

impl S3Store {
    /// Create a new store from a profile configuration
    pub async fn new(profile: &Profile, bucket: impl Into<String>) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            profile.access_key.clone(),
            profile.secret_key.clone(),
            None, // session token
            None, // expiry
            "bfs-static-credentials",
        );

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(profile.region.clone()))
            .endpoint_url(&profile.endpoint)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(profile.force_path_style())
            .build();

        Ok(Self::from_client(
            aws_sdk_s3::Client::from_conf(s3_config),
            bucket,
            profile.list_version,
        ))
    }

    /// Wrap an already configured client
    pub fn from_client(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        list_version: ListVersion,
    ) -> Self {
        Self {
            inner: client,
            bucket: bucket.into(),
            list_version,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    async fn list_v2(&self, request: &ListRequest) -> Result<ListResult> {
        let response = self
            .inner
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .max_keys(request.max_keys)
            .set_continuation_token(request.continuation_token.clone())
            .send()
            .await
            .map_err(|e| map_error(e, &request.prefix))?;

        Ok(ListResult {
            objects: response
                .contents()
                .iter()
                .map(|o| ObjectSummary {
                    key: o.key().unwrap_or_default().to_string(),
                    size: size_of(o.size()),
                    last_modified: timestamp(o.last_modified()),
                })
                .collect(),
            common_prefixes: response
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            truncated: response.is_truncated().unwrap_or(false),
            continuation_token: response.next_continuation_token().map(str::to_string),
        })
    }

    async fn list_v1(&self, request: &ListRequest) -> Result<ListResult> {
        let response = self
            .inner
            .list_objects()
            .bucket(&self.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .max_keys(request.max_keys)
            .set_marker(request.continuation_token.clone())
            .send()
            .await
            .map_err(|e| map_error(e, &request.prefix))?;

        let mut result = ListResult {
            objects: response
                .contents()
                .iter()
                .map(|o| ObjectSummary {
                    key: o.key().unwrap_or_default().to_string(),
                    size: size_of(o.size()),
                    last_modified: timestamp(o.last_modified()),
                })
                .collect(),
            common_prefixes: response
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            truncated: response.is_truncated().unwrap_or(false),
            continuation_token: None,
        };
        result.continuation_token = v1_marker(&result, response.next_marker());
        Ok(result)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head_object(&self, key: &str) -> Result<ObjectMeta> {
        let response = self
            .inner
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_error(e, key))?;

        let mut meta = ObjectMeta::new(key, size_of(response.content_length()));
        meta.last_modified = timestamp(response.last_modified());
        meta.etag = response.e_tag().map(|e| e.trim_matches('"').to_string());
        Ok(meta)
    }

    async fn list_objects(&self, request: &ListRequest) -> Result<ListResult> {
        match self.list_version {
            ListVersion::V1 => self.list_v1(request).await,
            ListVersion::V2 => self.list_v2(request).await,
        }
    }

    async fn get_object(&self, key: &str, range: Option<Range<u64>>) -> Result<Vec<u8>> {
        if let Some(r) = &range
            && r.start >= r.end
        {
            return Ok(Vec::new());
        }

        let response = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_range(range.as_ref().map(range_header))
            .send()
            .await
            .map_err(|e| map_error(e, key))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.inner
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_error(e, key))?;
        Ok(())
    }

    async fn put_object_if_absent(&self, key: &str, data: Vec<u8>) -> Result<bool> {
        let result = self
            .inner
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .body(ByteStream::from(data))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if failure_of(&e) == Failure::PreconditionFailed => {
                debug!(key, "Conditional put found an existing object");
                Ok(false)
            }
            Err(e) => Err(map_error(e, key)),
        }
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<()> {
        self.inner
            .copy_object()
            .copy_source(copy_source(&self.bucket, src_key)?)
            .bucket(&self.bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| map_error(e, src_key))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_error(e, key))?;
        Ok(())
    }

    async fn delete_objects(&self, keys: Vec<String>) -> Result<DeleteOutcome> {
        if keys.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::General(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| Error::General(e.to_string()))?;

        let response = self
            .inner
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_error(e, &keys[0]))?;

        let deleted: Vec<String> = response
            .deleted()
            .iter()
            .filter_map(|d| d.key().map(str::to_string))
            .collect();

        let failed: Vec<String> = response
            .errors()
            .iter()
            .filter_map(|e| e.key().map(str::to_string))
            .collect();
        if !failed.is_empty() {
            warn!(count = failed.len(), "Failed to delete some objects: {:?}", failed);
        }

        Ok(DeleteOutcome { deleted, failed })
    }
}
