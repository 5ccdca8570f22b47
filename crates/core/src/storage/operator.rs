//! OpenDAL operator construction for each blob-backed provider.

use std::path::Path;

use opendal::{Operator, services};
use psp_shared::{ManagedConfig, S3Config, StorageError, StorageResult};
use reqwest::Url;

fn configuration(backend: &str, err: &opendal::Error) -> StorageError {
    StorageError::validation(format!("{backend} storage configuration error: {err}"))
}

/// Local filesystem operator rooted at `root`.
///
/// # Errors
///
/// Returns an error if the path is not valid UTF-8 or the operator cannot be built.
pub fn filesystem(root: &Path) -> StorageResult<Operator> {
    let root = root
        .to_str()
        .ok_or_else(|| StorageError::validation("local path is not valid UTF-8"))?;
    let builder = services::Fs::default().root(root);

    Ok(Operator::new(builder)
        .map_err(|e| configuration("local", &e))?
        .finish())
}

/// S3-compatible operator for `config.bucket`.
///
/// Path-style addressing is the OpenDAL default; virtual-host style is
/// enabled unless `force_path_style` is set.
///
/// # Errors
///
/// Returns an error if the operator cannot be built.
pub fn s3(config: &S3Config) -> StorageResult<Operator> {
    let mut builder = services::S3::default()
        .bucket(&config.bucket)
        .region(&config.region);

    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if !config.force_path_style {
        builder = builder.enable_virtual_host_style();
    }
    if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
        builder = builder.access_key_id(key_id).secret_access_key(secret);
    }

    Ok(Operator::new(builder)
        .map_err(|e| configuration("s3", &e))?
        .finish())
}

/// Managed-platform storage operator for `config.bucket`.
///
/// The platform exposes its buckets over an S3-compatible API at
/// `{project_url}/storage/v1/s3`, addressed path-style. Without explicit
/// S3 keys the project ref is the access key id and `api_key` serves as
/// both secret and session token.
///
/// # Errors
///
/// Returns an error if the project URL is malformed or the operator cannot
/// be built.
pub fn managed(config: &ManagedConfig) -> StorageResult<Operator> {
    let endpoint = managed_endpoint(&config.project_url)?;
    let builder = services::S3::default()
        .endpoint(endpoint.as_str())
        .bucket(&config.bucket)
        .region(&config.region);

    let builder = match (&config.access_key_id, &config.secret_access_key) {
        (Some(key_id), Some(secret)) => builder.access_key_id(key_id).secret_access_key(secret),
        _ => builder
            .access_key_id(project_ref(&endpoint)?)
            .secret_access_key(&config.api_key)
            .session_token(&config.api_key),
    };

    Ok(Operator::new(builder)
        .map_err(|e| configuration("managed", &e))?
        .finish())
}

/// S3 endpoint of the managed platform's storage API.
fn managed_endpoint(project_url: &str) -> StorageResult<Url> {
    let mut url = Url::parse(project_url).map_err(|e| {
        StorageError::validation(format!("invalid managed.project_url '{project_url}': {e}"))
    })?;
    url.path_segments_mut()
        .map_err(|()| {
            StorageError::validation(format!(
                "managed.project_url '{project_url}' cannot be a base"
            ))
        })?
        .pop_if_empty()
        .extend(["storage", "v1", "s3"]);
    Ok(url)
}

/// Project ref: the first label of the project host.
fn project_ref(endpoint: &Url) -> StorageResult<&str> {
    endpoint
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .ok_or_else(|| StorageError::validation("managed.project_url has no host"))
}

/// In-process operator. Contents vanish with the operator.
///
/// # Errors
///
/// Returns an error if the operator cannot be built.
pub fn memory() -> StorageResult<Operator> {
    Ok(Operator::new(services::Memory::default())
        .map_err(|e| configuration("memory", &e))?
        .finish())
}
