//! JSON document codec shared by every backend.
//!
//! Origin-keyed storage maps live in memory as nested `HashMap`s and on the
//! wire as nested plain JSON objects. Every provider goes through this module
//! so the conversion stays symmetric regardless of transport.

use psp_shared::{SessionMetadata, StorageError, StorageResult, StoredSession};
use serde::Deserialize;
use serde_json::Value;

/// Converts a session into its JSON document form.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the state cannot be represented.
pub fn to_document(session: &StoredSession) -> StorageResult<Value> {
    Ok(serde_json::to_value(session)?)
}

/// Rebuilds a session from its JSON document form.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the document is malformed or
/// belongs to a different id.
pub fn from_document(doc: Value, expected_id: &str) -> StorageResult<StoredSession> {
    let session: StoredSession = serde_json::from_value(doc)?;
    ensure_id(&session.metadata, expected_id)?;
    Ok(session)
}

/// Encodes a session as JSON bytes.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the state cannot be encoded.
pub fn encode(session: &StoredSession) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(session)?)
}

/// Decodes a session from JSON bytes.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] for corrupt payloads or an id
/// mismatch.
pub fn decode(bytes: &[u8], expected_id: &str) -> StorageResult<StoredSession> {
    let session: StoredSession = serde_json::from_slice(bytes)?;
    ensure_id(&session.metadata, expected_id)?;
    Ok(session)
}

#[derive(Deserialize)]
struct MetadataOnly {
    metadata: SessionMetadata,
}

/// Decodes only the metadata half of a stored document.
///
/// The state is skipped without being materialized.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] for corrupt payloads or an id
/// mismatch.
pub fn decode_metadata(bytes: &[u8], expected_id: &str) -> StorageResult<SessionMetadata> {
    let doc: MetadataOnly = serde_json::from_slice(bytes)?;
    ensure_id(&doc.metadata, expected_id)?;
    Ok(doc.metadata)
}

fn ensure_id(metadata: &SessionMetadata, expected_id: &str) -> StorageResult<()> {
    if metadata.id != expected_id {
        return Err(StorageError::serialization(format!(
            "stored session id '{}' does not match requested id '{expected_id}'",
            metadata.id
        )));
    }
    Ok(())
}
