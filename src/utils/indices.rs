//! Index-list parsing and directory-name index extraction.

use super::config::OUTPUT_DIR_PREFIX;
use super::error::ConfigError;
use std::collections::BTreeSet;
use std::path::Path;

/// Parse an index list like `"0,2-4,9"` into `[0, 2, 3, 4, 9]`
///
/// Ranges are inclusive; duplicates are removed and the result is sorted.
/// An empty or whitespace-only string yields `None`, meaning "all".
pub fn parse_index_list(spec: &str) -> Result<Option<Vec<u32>>, ConfigError> {
    if spec.trim().is_empty() {
        return Ok(None);
    }

    let invalid = || ConfigError::InvalidIndexList(spec.to_string());
    let mut out = BTreeSet::new();

    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((a, b)) => {
                let start: u32 = a.trim().parse().map_err(|_| invalid())?;
                let end: u32 = b.trim().parse().map_err(|_| invalid())?;
                if start > end {
                    return Err(invalid());
                }
                out.extend(start..=end);
            }
            None => {
                out.insert(part.parse().map_err(|_| invalid())?);
            }
        }
    }

    Ok(Some(out.into_iter().collect()))
}

/// `output003` -> 3
pub fn output_name_to_index(name: &str) -> Option<u32> {
    name.strip_prefix(OUTPUT_DIR_PREFIX)?.parse().ok()
}

/// Index of an `output<N>` directory, if its name qualifies
pub fn output_dir_to_index(path: &Path) -> Option<u32> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(output_name_to_index)
}

/// `esmf_stream_0012` -> 12
pub fn stream_suffix_index(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .rsplit('_')
        .next()?
        .parse()
        .ok()
}

/// Resolve a half-open `[start, end)` slice over `len` items
///
/// Bounds follow Python slice rules: negative values count from the end
/// and out-of-range values clamp. Returns `None` when the slice is empty.
pub fn resolve_slice(len: usize, start: Option<i64>, end: Option<i64>) -> Option<(usize, usize)> {
    let clamp = |bound: i64| -> usize {
        let len = len as i64;
        let resolved = if bound < 0 { len + bound } else { bound };
        resolved.clamp(0, len) as usize
    };

    let lo = start.map(clamp).unwrap_or(0);
    let hi = end.map(clamp).unwrap_or(len);

    if lo < hi {
        Some((lo, hi))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_list_ranges() {
        let parsed = parse_index_list("0,2-4, 9,3").unwrap();
        assert_eq!(parsed, Some(vec![0, 2, 3, 4, 9]));
    }

    #[test]
    fn test_parse_index_list_empty_means_all() {
        assert_eq!(parse_index_list("  ").unwrap(), None);
    }

    #[test]
    fn test_parse_index_list_rejects_garbage() {
        assert!(parse_index_list("1,x").is_err());
        assert!(parse_index_list("5-2").is_err());
    }

    #[test]
    fn test_output_name_to_index() {
        assert_eq!(output_name_to_index("output003"), Some(3));
        assert_eq!(output_name_to_index("output"), None);
        assert_eq!(output_name_to_index("restart001"), None);
    }

    #[test]
    fn test_stream_suffix_index() {
        assert_eq!(stream_suffix_index(Path::new("/t/esmf_stream_0012")), Some(12));
        assert_eq!(stream_suffix_index(Path::new("/t/esmf_stream_meta")), None);
    }

    #[test]
    fn test_resolve_slice() {
        assert_eq!(resolve_slice(5, None, None), Some((0, 5)));
        assert_eq!(resolve_slice(5, Some(1), Some(3)), Some((1, 3)));
        assert_eq!(resolve_slice(5, Some(-2), None), Some((3, 5)));
        assert_eq!(resolve_slice(5, None, Some(-1)), Some((0, 4)));
        assert_eq!(resolve_slice(5, Some(10), None), None);
        assert_eq!(resolve_slice(0, Some(0), Some(2)), None);
    }
}
