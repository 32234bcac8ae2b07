//! Search-URL generation: roles × locations → seed artifact.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::storage::CheckpointStore;
use crate::types::Stage;

#[derive(Debug, Deserialize)]
struct RoleEntry {
    role: String,
}

#[derive(Debug, Deserialize)]
struct LocationEntry {
    name: Option<String>,
}

/// The locations file either wraps its entries in `{"countries": [...]}`
/// or is a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LocationsFile {
    Wrapped { countries: Vec<LocationEntry> },
    Bare(Vec<LocationEntry>),
}

pub fn load_roles(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read roles file {}", path.display()))?;
    let entries: Vec<RoleEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid roles file {}", path.display()))?;
    Ok(entries.into_iter().map(|e| e.role).collect())
}

pub fn load_locations(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read locations file {}", path.display()))?;
    let parsed: LocationsFile = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid locations file {}", path.display()))?;
    let entries = match parsed {
        LocationsFile::Wrapped { countries } => countries,
        LocationsFile::Bare(entries) => entries,
    };
    Ok(entries.into_iter().filter_map(|e| e.name).collect())
}

/// Every role × location combination as a search URL.
pub fn build_search_urls(base: &str, roles: &[String], locations: &[String]) -> Vec<String> {
    let base = base.trim_end_matches('/');
    let mut urls = Vec::with_capacity(roles.len() * locations.len());
    for role in roles {
        for location in locations {
            urls.push(format!("{base}/{role}/{location}"));
        }
    }
    urls
}

/// Generate search URLs from the configured role/location files and
/// register them into the seed artifact. Idempotent: URLs already present
/// keep their completion state. Returns how many URLs are newly registered.
pub async fn run(
    roles_file: &Path,
    locations_file: &Path,
    base_url: &str,
    seeds: &Arc<dyn CheckpointStore>,
) -> Result<u64> {
    let roles = load_roles(roles_file)?;
    let locations = load_locations(locations_file)?;
    let urls = build_search_urls(base_url, &roles, &locations);

    tracing::info!(
        roles = roles.len(),
        locations = locations.len(),
        urls = urls.len(),
        "generated search URLs"
    );

    let registered = seeds.register(Stage::GenerateUrls, &urls).await?;
    tracing::info!(registered, "registered search URLs into seed artifact");
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SeedFile;

    #[test]
    fn urls_are_the_cross_product() {
        let roles = vec!["rust-developer".to_string(), "data-engineer".to_string()];
        let locations = vec!["california".to_string(), "new-york".to_string()];
        let urls = build_search_urls("https://wellfound.com/role/l/", &roles, &locations);

        assert_eq!(urls.len(), 4);
        assert_eq!(urls[0], "https://wellfound.com/role/l/rust-developer/california");
        assert_eq!(urls[3], "https://wellfound.com/role/l/data-engineer/new-york");
    }

    #[test]
    fn locations_file_accepts_both_shapes() {
        let dir = tempfile::tempdir().unwrap();

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(&wrapped, r#"{"countries": [{"name": "california"}, {}]}"#).unwrap();
        assert_eq!(load_locations(&wrapped).unwrap(), vec!["california"]);

        let bare = dir.path().join("bare.json");
        std::fs::write(&bare, r#"[{"name": "texas"}]"#).unwrap();
        assert_eq!(load_locations(&bare).unwrap(), vec!["texas"]);
    }

    #[tokio::test]
    async fn generation_is_idempotent_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let roles_file = dir.path().join("roles.json");
        let locations_file = dir.path().join("locations.json");
        std::fs::write(&roles_file, r#"[{"role": "rust-developer"}]"#).unwrap();
        std::fs::write(&locations_file, r#"{"countries": [{"name": "california"}]}"#).unwrap();

        let seeds: Arc<dyn CheckpointStore> =
            Arc::new(SeedFile::load(dir.path().join("urls.json")).unwrap());

        let first = run(&roles_file, &locations_file, "https://x/role/l", &seeds)
            .await
            .unwrap();
        assert_eq!(first, 1);

        let second = run(&roles_file, &locations_file, "https://x/role/l", &seeds)
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn missing_roles_file_is_an_error() {
        assert!(load_roles(Path::new("/definitely/not/here.json")).is_err());
    }
}
