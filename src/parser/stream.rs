//! On-disk trace directory access.
//!
//! Layout:
//! ```text
//! traceout/
//!   metadata
//!   esmf_stream_0000
//!   esmf_stream_0001
//!   ...
//! ```
//! Each stream file holds the messages of one execution unit, one JSON
//! object per line.

use super::events::RawMessage;
use crate::utils::config::METADATA_FILE_NAME;
use crate::utils::error::ParseError;
use crate::utils::indices::stream_suffix_index;
use log::debug;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// A validated trace directory
#[derive(Debug, Clone)]
pub struct TraceDirectory {
    root: PathBuf,
    prefix: String,
}

impl TraceDirectory {
    /// Open a trace directory, requiring its metadata resource
    pub fn open(root: impl AsRef<Path>, prefix: impl Into<String>) -> Result<Self, ParseError> {
        let root = root.as_ref().to_path_buf();
        let metadata = root.join(METADATA_FILE_NAME);
        if !metadata.is_file() {
            return Err(ParseError::MissingMetadata(metadata));
        }
        Ok(Self {
            root,
            prefix: prefix.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Unit indices of every `<prefix>_<N>` stream present, sorted
    pub fn discover_units(&self) -> Result<Vec<u32>, ParseError> {
        let stem = format!("{}_", self.prefix);
        let mut units = BTreeSet::new();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let matches_prefix = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&stem));
            if matches_prefix && path.is_file() {
                if let Some(unit) = stream_suffix_index(&path) {
                    units.insert(unit);
                }
            }
        }

        if units.is_empty() {
            return Err(ParseError::NoStreams {
                dir: self.root.clone(),
                prefix: self.prefix.clone(),
            });
        }

        debug!("Discovered {} stream(s) in {}", units.len(), self.root.display());
        Ok(units.into_iter().collect())
    }

    /// `<root>/<prefix>_<NNNN>`, or the unpadded name when only that exists
    pub fn stream_path(&self, unit: u32) -> PathBuf {
        let padded = self.root.join(format!("{}_{:04}", self.prefix, unit));
        if padded.is_file() {
            return padded;
        }
        let plain = self.root.join(format!("{}_{}", self.prefix, unit));
        if plain.is_file() {
            plain
        } else {
            padded
        }
    }

    /// Open the message stream of one unit
    pub fn messages(&self, unit: u32) -> Result<StreamMessages, ParseError> {
        let path = self.stream_path(unit);
        if !path.is_file() {
            return Err(ParseError::MissingStream(path));
        }
        let file = File::open(&path)?;
        Ok(StreamMessages {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

/// Iterator over the messages of one stream file
///
/// Blank lines are skipped. A line that fails to deserialize yields
/// `ParseError::MalformedMessage`; iteration can continue past it.
pub struct StreamMessages {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl Iterator for StreamMessages {
    type Item = Result<RawMessage, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(ParseError::IoError(e))),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(serde_json::from_str(&line).map_err(|source| {
                ParseError::MalformedMessage {
                    path: self.path.clone(),
                    line: self.line_no,
                    source,
                }
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::events::TraceMessage;
    use std::fs;

    fn trace_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("metadata"), "").unwrap();
        dir
    }

    #[test]
    fn test_open_requires_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let err = TraceDirectory::open(dir.path(), "esmf_stream").unwrap_err();
        assert!(matches!(err, ParseError::MissingMetadata(_)));
    }

    #[test]
    fn test_discover_units() {
        let dir = trace_dir();
        for name in ["esmf_stream_0002", "esmf_stream_0000", "esmf_stream_x", "other_0001"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let trace = TraceDirectory::open(dir.path(), "esmf_stream").unwrap();
        assert_eq!(trace.discover_units().unwrap(), vec![0, 2]);
    }

    #[test]
    fn test_discover_units_empty() {
        let dir = trace_dir();
        let trace = TraceDirectory::open(dir.path(), "esmf_stream").unwrap();
        assert!(matches!(
            trace.discover_units().unwrap_err(),
            ParseError::NoStreams { .. }
        ));
    }

    #[test]
    fn test_stream_path_is_zero_padded() {
        let dir = trace_dir();
        let trace = TraceDirectory::open(dir.path(), "esmf_stream").unwrap();
        assert!(trace.stream_path(7).ends_with("esmf_stream_0007"));
    }

    #[test]
    fn test_messages_skip_blank_and_report_malformed() {
        let dir = trace_dir();
        fs::write(
            dir.path().join("esmf_stream_0000"),
            "{\"name\":\"a_enter\",\"timestamp_ns\":1}\n\nnot json\n{\"name\":\"a_exit\",\"timestamp_ns\":2}\n",
        )
        .unwrap();
        let trace = TraceDirectory::open(dir.path(), "esmf_stream").unwrap();
        let results: Vec<_> = trace.messages(0).unwrap().collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().name(), "a_enter");
        assert!(matches!(
            results[1],
            Err(ParseError::MalformedMessage { line: 3, .. })
        ));
        assert_eq!(results[2].as_ref().unwrap().name(), "a_exit");
    }

    #[test]
    fn test_messages_missing_stream() {
        let dir = trace_dir();
        let trace = TraceDirectory::open(dir.path(), "esmf_stream").unwrap();
        assert!(matches!(
            trace.messages(3),
            Err(ParseError::MissingStream(_))
        ));
    }
}
