/// Resolve a server-relative media path against the static asset root.
///
/// Absolute URLs (`http`, `https`, `data:`) pass through untouched. Blank paths resolve to None.
pub fn resolve_asset_url(asset_root: &str, path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let lower = path.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:") {
        return Some(path.to_string());
    }

    let root = asset_root.trim().trim_end_matches('/');
    let relative = path.trim_start_matches("./").trim_start_matches('/');
    Some(format!("{}/{}", root, relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_join_root() {
        assert_eq!(
            resolve_asset_url("http://localhost:8000/", "static/images/0.png").as_deref(),
            Some("http://localhost:8000/static/images/0.png")
        );
        assert_eq!(
            resolve_asset_url("http://localhost:8000", "/static/a.mp3").as_deref(),
            Some("http://localhost:8000/static/a.mp3")
        );
        assert_eq!(
            resolve_asset_url("http://cdn.test", "./x.png").as_deref(),
            Some("http://cdn.test/x.png")
        );
    }

    #[test]
    fn test_absolute_and_blank_paths() {
        assert_eq!(
            resolve_asset_url("http://localhost:8000", "https://img.test/a.png").as_deref(),
            Some("https://img.test/a.png")
        );
        assert_eq!(resolve_asset_url("http://localhost:8000", "   "), None);
    }
}
