//! Loading node files from disk and summarizing them for humans.
//!
//! Used by the `prolly-inspect` binary; kept in the library so the
//! summaries can be tested without spawning a process.

use std::path::{Path, PathBuf};

use crate::address::Address;
use crate::message::{DecodeError, Message};
use crate::walk::collect_addresses;

/// Read a node file and validate it.
///
/// # Errors
/// Returns [`InspectError::Io`] if the file cannot be read, or
/// [`InspectError::Decode`] if its contents are not a valid node.
pub fn read_message_file(path: &Path) -> Result<Message, InspectError> {
    let bytes = std::fs::read(path).map_err(|source| InspectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Message::from_bytes(bytes).map_err(|source| InspectError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Owned snapshot of everything worth printing about a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub level: u8,
    pub item_count: u16,
    pub tree_count: u64,
    pub size: usize,
    pub address_width: usize,
    pub keys: Vec<Vec<u8>>,
    pub addresses: Vec<Vec<u8>>,
}

impl NodeSummary {
    /// Snapshot `msg`.
    #[must_use]
    pub fn new(msg: &Message) -> Self {
        Self {
            level: msg.level(),
            item_count: msg.item_count(),
            tree_count: msg.tree_count(),
            size: msg.size(),
            address_width: msg.address_width(),
            keys: msg.keys().to_vec(),
            addresses: collect_addresses(msg),
        }
    }
}

impl std::fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.level == 0 { "leaf" } else { "internal" };
        writeln!(
            f,
            "{kind} node: level={} items={} tree_count={} size={} address_width={}",
            self.level, self.item_count, self.tree_count, self.size, self.address_width
        )?;
        for (i, key) in self.keys.iter().enumerate() {
            writeln!(f, "  key[{i}] = \"{}\"", key.escape_ascii())?;
        }
        for address in &self.addresses {
            writeln!(f, "  ref {}", Address::new(address))?;
        }
        Ok(())
    }
}

/// Error returned when inspecting a node file fails.
#[derive(Debug)]
pub enum InspectError {
    /// The file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not a valid node.
    Decode { path: PathBuf, source: DecodeError },
}

impl std::fmt::Display for InspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Decode { path, source } => {
                write!(f, "{}: invalid node: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for InspectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Decode { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::encode::NodeEncoder;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_valid_file() {
        let encoder = NodeEncoder::new(BufferPool::new(1));
        let msg = encoder.encode(&[b"a", b"b"], &[b"1", b"2"], 0, &[]).unwrap();
        let file = write_temp(msg.as_bytes());

        let loaded = read_message_file(file.path()).unwrap();
        assert_eq!(loaded, msg);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_message_file(&dir.path().join("missing.node")).unwrap_err();
        assert!(matches!(err, InspectError::Io { .. }));
    }

    #[test]
    fn test_read_corrupt_file() {
        let encoder = NodeEncoder::new(BufferPool::new(1));
        let msg = encoder.encode(&[b"a"], &[b"1"], 0, &[]).unwrap();
        let mut bytes = msg.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let file = write_temp(&bytes);

        let err = read_message_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            InspectError::Decode {
                source: DecodeError::ChecksumMismatch { .. },
                ..
            }
        ));
        assert!(err.to_string().contains("invalid node: checksum mismatch"));
    }

    #[test]
    fn test_summary_of_internal_node() {
        let encoder = NodeEncoder::new(BufferPool::new(1)).with_address_width(2);
        let addresses: [&[u8]; 2] = [&[0xab, 0x01], &[0xcd, 0x02]];
        let msg = encoder
            .encode(&[b"k1", b"k2"], &addresses, 1, &[3, 4])
            .unwrap();

        let summary = NodeSummary::new(&msg);
        assert_eq!(summary.item_count, 2);
        assert_eq!(summary.tree_count, 7);

        let text = summary.to_string();
        assert!(text.starts_with("internal node: level=1 items=2 tree_count=7"));
        assert!(text.contains("  key[1] = \"k2\"\n"));
        assert!(text.contains("  ref ab01\n"));
        assert!(text.contains("  ref cd02\n"));
    }

    #[test]
    fn test_summary_of_empty_leaf() {
        let encoder = NodeEncoder::new(BufferPool::new(1));
        let keys: [&[u8]; 0] = [];
        let msg = encoder.encode(&keys, &keys, 0, &[]).unwrap();

        let summary = NodeSummary::new(&msg);
        assert!(summary.keys.is_empty());
        assert!(summary.addresses.is_empty());
        assert!(summary.to_string().starts_with("leaf node: level=0 items=0"));
    }
}
