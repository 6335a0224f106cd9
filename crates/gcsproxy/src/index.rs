//! Index document lookup for directory requests

use crate::error::{GatewayError, Result};
use crate::resolve::join_key;
use gcsproxy_store::{GetOptions, ObjectReader, ObjectStore, StoreError};
use tracing::{debug, warn};

/// Try `index_names` under `directory` in order and open the first that exists.
///
/// Missing candidates are skipped silently and other store failures are
/// logged and skipped, so a broken candidate degrades to a listing instead
/// of failing the request. Conditional outcomes (304, 412, 416) belong to
/// the document that was found and are returned as errors.
pub async fn resolve_index(
    store: &dyn ObjectStore,
    directory: &str,
    index_names: &[String],
    options: &GetOptions,
) -> Result<Option<ObjectReader>> {
    for name in index_names {
        let candidate = join_key(directory, name);
        match store.get_object(&candidate, options).await {
            Ok(reader) => {
                debug!(key = %candidate, "Resolved index document");
                return Ok(Some(reader));
            }
            Err(StoreError::NotFound(_)) => continue,
            Err(
                err @ (StoreError::NotModified(_)
                | StoreError::PreconditionFailed(_)
                | StoreError::RangeNotSatisfiable(_)),
            ) => return Err(GatewayError::from(err)),
            Err(err) => {
                warn!(key = %candidate, error = %err, "Error when looking for index");
            }
        }
    }
    Ok(None)
}
