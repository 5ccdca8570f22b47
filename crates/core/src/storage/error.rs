//! Mapping of OpenDAL failures onto the storage error taxonomy.

use opendal::ErrorKind;
use psp_shared::StorageError;

/// Converts an OpenDAL error for the object behind session `id`.
///
/// A missing object becomes [`StorageError::NotFound`]; everything else is a
/// backend fault.
pub(crate) fn from_opendal(backend: &str, id: &str, err: &opendal::Error) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::not_found(id),
        _ => StorageError::unavailable(backend, err.to_string()),
    }
}

/// Converts an OpenDAL error that has no session id attached (listing, setup).
pub(crate) fn unavailable(backend: &str, err: &opendal::Error) -> StorageError {
    StorageError::unavailable(backend, err.to_string())
}
