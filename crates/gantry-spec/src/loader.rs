//! Discovery of APIs and endpoints on disk.
//!
//! ```text
//! apis/<identifier>/spec.json
//! endpoints/<segment>/.../<METHOD>/spec.json
//! ```
//!
//! A missing root directory is not an error: nothing has been defined yet.

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::api::Api;
use crate::endpoint::{Endpoint, EndpointKey};
use crate::error::SpecError;
use crate::merger::{load_merged, read_fragment};
use crate::method::HttpMethod;

/// Load every API found under `root`, sorted by directory name.
pub async fn load_apis(root: &Path) -> Result<Vec<Api>, SpecError> {
    let mut apis = Vec::new();
    let mut seen = HashSet::new();

    for name in sub_directories(root).await? {
        if read_fragment(&root.join(&name)).await?.is_none() {
            tracing::debug!(directory = %name, "skipping API directory without specification");
            continue;
        }
        let spec = load_merged(root, &name).await?;
        let api = Api::new(spec, &name);
        if !seen.insert(api.identifier().to_string()) {
            return Err(SpecError::DuplicateApi(api.identifier().to_string()));
        }
        apis.push(api);
    }
    Ok(apis)
}

/// Load every endpoint found under `root`.
///
/// A directory named after an HTTP method is an endpoint leaf; every other
/// directory is a path segment. Endpoints are returned in (path, method)
/// order. Two leaves resolving to the same pair are rejected.
pub async fn load_endpoints(root: &Path) -> Result<Vec<Endpoint>, SpecError> {
    let mut leaves: Vec<(Vec<String>, String)> = Vec::new();
    let mut pending: Vec<Vec<String>> = vec![Vec::new()];

    while let Some(segments) = pending.pop() {
        let dir = segments.iter().fold(root.to_path_buf(), |dir, s| dir.join(s));
        for name in sub_directories(&dir).await? {
            if name.parse::<HttpMethod>().is_ok() {
                leaves.push((segments.clone(), name));
            } else {
                let mut next = segments.clone();
                next.push(name);
                pending.push(next);
            }
        }
    }

    let mut origins: HashMap<EndpointKey, PathBuf> = HashMap::new();
    let mut endpoints = Vec::with_capacity(leaves.len());
    for (segments, method_dir) in leaves {
        let resource_path = format!("/{}", segments.join("/"));
        let sub_path = segments
            .iter()
            .chain(std::iter::once(&method_dir))
            .cloned()
            .collect::<Vec<_>>()
            .join("/");
        let leaf_dir = root.join(&sub_path);

        let spec = load_merged(root, &sub_path).await?;
        let endpoint = Endpoint::new(spec, &resource_path, &method_dir)?;

        if let Some(first) = origins.insert(endpoint.key(), leaf_dir.clone()) {
            return Err(SpecError::DuplicateEndpoint {
                method: endpoint.method().to_string(),
                path: endpoint.path().to_string(),
                first,
                second: leaf_dir,
            });
        }
        endpoints.push(endpoint);
    }

    endpoints.sort_by_key(Endpoint::key);
    Ok(endpoints)
}

/// Names of the direct sub-directories of `dir`, sorted. Missing `dir` is empty.
async fn sub_directories(dir: &Path) -> Result<Vec<String>, SpecError> {
    let io_err = |source| SpecError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if !entry.file_type().await.map_err(io_err)?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
