/// Shortest part of `version` that tells it apart from `other`.
///
/// Both labels are split on their first `-`. When the leading parts differ,
/// that part is returned; otherwise the suffix is, or `""` when there is none.
pub fn clip_version(version: &str, other: &str) -> String {
    let (prefix, suffix) = split_label(version);
    let (other_prefix, _) = split_label(other);
    if prefix != other_prefix {
        prefix.to_string()
    } else {
        suffix.unwrap_or_default().to_string()
    }
}

/// `"current → available"`, each side clipped against the other.
pub fn version_diff(current: &str, available: &str) -> String {
    format!(
        "{} → {}",
        clip_version(current, available),
        clip_version(available, current)
    )
}

fn split_label(label: &str) -> (&str, Option<&str>) {
    match label.split_once('-') {
        Some((prefix, suffix)) => (prefix, Some(suffix)),
        None => (label, None),
    }
}
