//! SHA-256 content checksums (lowercase hex)

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Stream a file through SHA-256.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Exact match, tolerant of surrounding whitespace and hex case.
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    !expected.is_empty() && expected.eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_matches_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob");
        let data = vec![7u8; 20_000];
        fs::write(&path, &data).unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(&data));
    }

    #[test]
    fn test_checksums_match() {
        let digest = sha256_bytes(b"abc");
        assert!(checksums_match(&digest.to_uppercase(), &digest));
        assert!(!checksums_match("", ""));
        assert!(!checksums_match(&digest, &sha256_bytes(b"abd")));
    }
}
