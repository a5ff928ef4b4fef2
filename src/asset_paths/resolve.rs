/// Resolve a reference found in `from_document` to a path relative to the site root.
///
/// Query strings and fragments are dropped, `.` and `..` segments are collapsed and a
/// leading `/` anchors the reference at the site root. Returns `None` when the
/// reference climbs above the root or names nothing.
pub fn resolve_reference(from_document: &str, reference: &str) -> Option<String> {
    let reference = reference
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .replace('\\', "/");

    let mut resolved: Vec<String> = Vec::new();
    if !reference.starts_with('/') {
        let from = from_document.replace('\\', "/");
        if let Some((dir, _)) = from.rsplit_once('/') {
            resolved.extend(
                dir.split('/')
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string),
            );
        }
    }

    for segment in reference.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                resolved.pop()?;
            }
            other => resolved.push(other.to_string()),
        }
    }

    if resolved.is_empty() {
        None
    } else {
        Some(resolved.join("/"))
    }
}

/// Express `target` (root-relative) as a reference usable from inside `from_document`.
pub fn relative_reference(from_document: &str, target: &str) -> String {
    let from_dir: Vec<&str> = match from_document.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    let target_segments: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    let common = from_dir
        .iter()
        .zip(target_segments.iter())
        .take_while(|(a, b)| a == b)
        .count()
        .min(target_segments.len().saturating_sub(1));

    let mut parts: Vec<&str> = vec![".."; from_dir.len() - common];
    parts.extend(&target_segments[common..]);
    parts.join("/")
}

/// Precache URL for a file stored at `relative` inside a build root.
///
/// URLs always use forward slashes so the manifest is identical on every platform.
pub fn url_for_path(relative: &str) -> String {
    relative.replace('\\', "/").trim_start_matches('/').to_string()
}
