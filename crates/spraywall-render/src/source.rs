use std::io::Read;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use spraywall_types::ImageSource;

/// An image source could not be fetched, decoded, or confined to the asset
/// root. Per-item and non-fatal: the render skips the item and counts it.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("asset path {0:?} escapes the asset root")]
    Traversal(String),
    #[error("asset read: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("data payload: {0}")]
    Payload(String),
    #[error("decode: {0}")]
    Decode(String),
}

/// Resolves an image source to its raw bytes, in order of applicability:
/// embedded data payload, asset-root-confined path, remote HTTP(S) fetch.
pub(crate) fn resolve_bytes(
    source: &ImageSource,
    asset_root: &Path,
    agent: &ureq::Agent,
    max_bytes: u64,
) -> Result<Vec<u8>, ResolutionError> {
    match source {
        ImageSource::Data(payload) => decode_data_payload(payload),
        ImageSource::Asset(relative) => read_confined_asset(asset_root, relative),
        ImageSource::Url(url) => fetch_remote(agent, url, max_bytes),
    }
}

/// Accepts both `data:<mime>;base64,<payload>` URLs and raw base64.
fn decode_data_payload(payload: &str) -> Result<Vec<u8>, ResolutionError> {
    let encoded = if let Some(rest) = payload.strip_prefix("data:") {
        let (header, body) = rest
            .split_once(',')
            .ok_or_else(|| ResolutionError::Payload("data URL has no comma".to_string()))?;
        if !header.ends_with(";base64") {
            return Err(ResolutionError::Payload(
                "data URL is not base64-encoded".to_string(),
            ));
        }
        body
    } else {
        payload
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|error| ResolutionError::Payload(format!("base64: {error}")))
}

/// Reads a managed asset, rejecting any path that resolves outside the
/// asset root (traversal guard).
fn read_confined_asset(asset_root: &Path, relative: &str) -> Result<Vec<u8>, ResolutionError> {
    if Path::new(relative).is_absolute() {
        return Err(ResolutionError::Traversal(relative.to_string()));
    }
    let root = asset_root.canonicalize()?;
    let resolved = asset_root.join(relative).canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(ResolutionError::Traversal(relative.to_string()));
    }
    Ok(std::fs::read(resolved)?)
}

/// Fetches a remote image with the agent's bounded timeout and a size cap.
fn fetch_remote(agent: &ureq::Agent, url: &str, max_bytes: u64) -> Result<Vec<u8>, ResolutionError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ResolutionError::Fetch {
            url: url.to_string(),
            message: "only http(s) sources are fetched".to_string(),
        });
    }
    let response = agent.get(url).call().map_err(|error| ResolutionError::Fetch {
        url: url.to_string(),
        message: error.to_string(),
    })?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(max_bytes + 1)
        .read_to_end(&mut bytes)
        .map_err(|error| ResolutionError::Fetch {
            url: url.to_string(),
            message: error.to_string(),
        })?;
    if bytes.len() as u64 > max_bytes {
        return Err(ResolutionError::Fetch {
            url: url.to_string(),
            message: format!("response exceeds {max_bytes} byte cap"),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(std::time::Duration::from_millis(200))
            .build()
    }

    #[test]
    fn data_url_and_raw_base64_both_decode() {
        let bytes = b"graffiti";
        let raw = BASE64.encode(bytes);
        assert_eq!(decode_data_payload(&raw).expect("raw base64"), bytes);

        let url = format!("data:image/png;base64,{raw}");
        assert_eq!(decode_data_payload(&url).expect("data url"), bytes);
    }

    #[test]
    fn non_base64_data_url_is_rejected() {
        let err = decode_data_payload("data:image/svg+xml,<svg/>").unwrap_err();
        assert!(matches!(err, ResolutionError::Payload(_)));
    }

    #[test]
    fn escaping_asset_path_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("assets");
        std::fs::create_dir_all(&root).expect("create asset root");
        std::fs::write(dir.path().join("outside.png"), b"nope").expect("write outside file");

        let err = read_confined_asset(&root, "../outside.png").unwrap_err();
        assert!(matches!(err, ResolutionError::Traversal(_)));

        let err = read_confined_asset(&root, "/etc/hosts").unwrap_err();
        assert!(matches!(err, ResolutionError::Traversal(_)));
    }

    #[test]
    fn confined_asset_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("assets");
        std::fs::create_dir_all(root.join("stickers")).expect("create asset dirs");
        std::fs::write(root.join("stickers/cat.png"), b"pixels").expect("write asset");

        let bytes = read_confined_asset(&root, "stickers/cat.png").expect("confined read");
        assert_eq!(bytes, b"pixels");
    }

    #[test]
    fn missing_asset_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_confined_asset(dir.path(), "nope.png").unwrap_err();
        assert!(matches!(err, ResolutionError::Io(_)));
    }

    #[test]
    fn non_http_scheme_is_not_fetched() {
        let err = fetch_remote(&agent(), "ftp://example.com/a.png", 1024).unwrap_err();
        assert!(matches!(err, ResolutionError::Fetch { .. }));
    }
}
