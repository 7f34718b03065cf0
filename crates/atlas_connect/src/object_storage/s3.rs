use super::backend::{ListedObject, ObjectStorageBackend};
use crate::descriptor::S3Settings;
use crate::error::{ConnectorError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Service error codes that mean the credentials are unusable.
const AUTH_ERROR_CODES: &[&str] = &[
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "InvalidToken",
    "ExpiredToken",
];

/// Backend over the AWS SDK, pointed at any S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    /// Build a client. No request is sent until the first call.
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "atlas",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(settings.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(settings.path_style)
            .build();

        debug!(endpoint = %settings.endpoint, "Configured S3 client");
        Self {
            client: Client::from_conf(config),
        }
    }
}

fn classify<E, R>(target: &str, err: SdkError<E, R>) -> ConnectorError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let auth_failure = err
        .code()
        .map(|code| AUTH_ERROR_CODES.contains(&code))
        .unwrap_or(false);
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            ConnectorError::connection(format!("{}: {}", target, DisplayErrorContext(&err)))
        }
        _ if auth_failure => {
            ConnectorError::connection(format!("{}: {}", target, DisplayErrorContext(&err)))
        }
        _ => ConnectorError::enumeration(target, DisplayErrorContext(&err).to_string()),
    }
}

fn to_chrono(value: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    value
        .and_then(|dt| dt.to_millis().ok())
        .and_then(DateTime::from_timestamp_millis)
}

#[async_trait]
impl ObjectStorageBackend for S3Backend {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify("buckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(str::to_string))
            .collect())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ListedObject>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify(bucket, e))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ListedObject {
                    key: key.to_string(),
                    size_bytes: object.size().unwrap_or(0),
                    last_modified: to_chrono(object.last_modified()),
                    etag: object.e_tag().map(str::to_string),
                });
            }
        }

        debug!(bucket, prefix, objects = objects.len(), "Listed S3 objects");
        Ok(objects)
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ListedObject>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => Ok(Some(ListedObject {
                key: key.to_string(),
                size_bytes: output.content_length().unwrap_or(0),
                last_modified: to_chrono(output.last_modified()),
                etag: output.e_tag().map(str::to_string),
            })),
            Err(err) if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) => {
                Ok(None)
            }
            Err(err) => Err(classify(&format!("{}/{}", bucket, key), err)),
        }
    }
}
