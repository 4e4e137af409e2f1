use anyhow::Result;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::VALID_EXTENSIONS;
use crate::models::{TaxonomyPath, WorkItem};

/// Walks the base path and enumerates every ingestible file as a WorkItem.
///
/// The directory layout under the base is the taxonomy:
/// `{branch}/{period}/{subject}[/{resource_type}]/file`. Files that sit
/// less than three directories deep, or whose extension is not in the
/// whitelist, are skipped. The `Books` subtree is excluded unless the run
/// is a books ingestion.
pub fn collect_work_items(base_path: &Path, exclude_books: bool) -> Result<Vec<WorkItem>> {
    let mut items = Vec::new();

    for entry in WalkDir::new(base_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let extension = file_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !VALID_EXTENSIONS.contains(&extension.as_str()) {
            debug!("skipping unsupported extension: {}", path.display());
            continue;
        }

        let Some(taxonomy) = parse_taxonomy(base_path, path) else {
            debug!("skipping file outside the taxonomy: {}", path.display());
            continue;
        };

        if exclude_books && taxonomy.resource_type.as_deref() == Some("Books") {
            continue;
        }

        items.push(WorkItem {
            source_path: path.to_path_buf(),
            file_name: file_name.to_string(),
            taxonomy,
        });
    }

    info!(
        "found {} files to process under {}",
        items.len(),
        base_path.display()
    );
    Ok(items)
}

/// Parses branch/period/subject[/resource_type] from the directory
/// components between the base path and the file.
fn parse_taxonomy(base_path: &Path, file_path: &Path) -> Option<TaxonomyPath> {
    let relative = file_path.parent()?.strip_prefix(base_path).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();

    if parts.len() < 3 {
        return None;
    }

    Some(TaxonomyPath {
        branch: parts[0].clone(),
        period: parts[1].clone(),
        subject: parts[2].clone(),
        resource_type: parts.get(3).cloned(),
    })
}
