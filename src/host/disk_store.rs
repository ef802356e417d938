// File-per-key persisted store with an mtime-based rolling sweep.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use super::traits::KeyValueStore;

/// [`KeyValueStore`] backed by one file per key under `dir`.
///
/// Sweeping and clearing are best-effort: a file that cannot be removed
/// is logged and skipped, never an error for the caller.
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }
}

/// Encode a key into a safe file name. Alphanumerics and `.`/`_`/`-` pass
/// through; everything else becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

impl KeyValueStore for DiskStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn sweep(&self, max_age: Duration) -> Result<usize> {
        let mut removed = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("store sweep: unreadable entry: {}", e);
                    continue;
                }
            };
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .map(|age| age > max_age)
                .unwrap_or(false);
            if expired {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("store sweep: remove {:?} failed: {}", entry.path(), e),
                }
            }
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("store clear: unreadable entry: {}", e);
                    continue;
                }
            };
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!("store clear: remove {:?} failed: {}", entry.path(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_key_passthrough_and_escape() {
        assert_eq!(encode_key("user.profile-1_a"), "user.profile-1_a");
        assert_eq!(encode_key("user:1/see"), "user%3A1%2Fsee");
    }
}
