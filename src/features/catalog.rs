use crate::domain::errors::ModulesError;
use crate::domain::types::Catalog;
use crate::features::evm::clamp_response_bytes;
use std::io::Read;

/// Fetch the registry document. Failures are fatal to preparation and are not retried.
pub fn fetch_catalog(url: &str, max_response_bytes: u64) -> Result<Catalog, ModulesError> {
    let unavailable = |reason: String| ModulesError::RegistryUnavailable { reason };
    let url = url.trim();
    if url.is_empty() {
        return Err(unavailable("registry url is not configured".to_string()));
    }

    let response = ureq::get(url)
        .set("accept", "application/json")
        .call()
        .map_err(|error| match error {
            ureq::Error::Status(status, _) => {
                unavailable(format!("registry returned status {status}"))
            }
            ureq::Error::Transport(transport) => {
                unavailable(format!("registry transport failed: {transport}"))
            }
        })?;

    let max_response_bytes = clamp_response_bytes(max_response_bytes);
    let mut raw = Vec::new();
    response
        .into_reader()
        .take(max_response_bytes.saturating_add(1))
        .read_to_end(&mut raw)
        .map_err(|error| unavailable(format!("failed to read registry body: {error}")))?;
    if u64::try_from(raw.len()).unwrap_or(u64::MAX) > max_response_bytes {
        return Err(unavailable(format!(
            "registry document exceeded max_response_bytes={max_response_bytes}"
        )));
    }
    parse_catalog(&raw)
}

pub fn parse_catalog(raw: &[u8]) -> Result<Catalog, ModulesError> {
    serde_json::from_slice(raw).map_err(|error| ModulesError::RegistryUnavailable {
        reason: format!("registry document is malformed: {error}"),
    })
}
