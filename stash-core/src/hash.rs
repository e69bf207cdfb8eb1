//! Content identifiers.
//!
//! An identifier looks like `sha1-70a0f0aeec2b80ca7dcb85e06781e8606ac8fee0`:
//! the algorithm name, a dash, then the lowercase hex digest.

use std::io::{self, Read, Seek, SeekFrom};

use sha1::{Digest, Sha1};

pub const HASH_ALGORITHM: &str = "sha1";

/// Length of `"sha1-"`, the part of an identifier before the hex digest.
pub const HASH_PREFIX_LEN: usize = HASH_ALGORITHM.len() + 1;

/// Hex digest length for sha1.
pub const HASH_HEX_LEN: usize = 40;

/// Stream `reader` from its start through sha1 and return the identifier.
///
/// The reader is rewound first so the same handle can be hashed after an
/// inspecter has already consumed part of it.
pub fn content_hash<R: Read + Seek + ?Sized>(reader: &mut R) -> io::Result<String> {
    reader.seek(SeekFrom::Start(0))?;
    let mut hasher = Sha1::new();
    io::copy(reader, &mut hasher)?;
    Ok(format!("{HASH_ALGORITHM}-{}", hex::encode(hasher.finalize())))
}

/// Cheap shape check used before a hash is turned into a filesystem path.
pub fn is_valid_hash(hash: &str) -> bool {
    let Some(digest) = hash.strip_prefix(HASH_ALGORITHM).and_then(|rest| rest.strip_prefix('-')) else {
        return false;
    };
    digest.len() == HASH_HEX_LEN
        && digest
            .as_bytes()
            .iter()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn hashes_known_input() {
        let mut data = Cursor::new(b"hello world".to_vec());
        assert_eq!(
            content_hash(&mut data).unwrap(),
            "sha1-2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn rewinds_before_hashing() {
        let mut data = Cursor::new(b"hello world".to_vec());
        let first = content_hash(&mut data).unwrap();
        data.seek(SeekFrom::Start(5)).unwrap();
        let second = content_hash(&mut data).unwrap();
        assert_eq!(first, second);
        assert!(is_valid_hash(&first));
    }

    #[test]
    fn rejects_malformed_hashes() {
        assert!(!is_valid_hash("sha1-xyz"));
        assert!(!is_valid_hash("md5-2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"));
        assert!(!is_valid_hash("sha1-../../etc/passwd0000000000000000000000"));
    }
}
