//! Startup resume-directory scan: find every `<40-hex>.resume` file,
//! sanity-check it parses as bencode, and hand back the raw bytes for
//! `Engine::add_torrent`. A non-existent resume directory yields
//! nothing rather than an error — it is created lazily on first write.

use std::path::Path;

use crate::engine::ResumeBlob;

fn looks_like_info_hash(stem: &str) -> bool {
    stem.len() == 40 && stem.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Scan `resume_dir` for resume files, skipping (and logging) any that
/// fail to read or fail to parse as bencode. Order is unspecified.
pub fn scan_resume_dir(resume_dir: &Path) -> Vec<ResumeBlob> {
    if !resume_dir.is_dir() {
        return Vec::new();
    }

    let entries = match std::fs::read_dir(resume_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %resume_dir.display(), error = %e, "could not read resume directory");
            return Vec::new();
        }
    };

    let mut blobs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("resume") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => continue,
        };
        if !looks_like_info_hash(stem) {
            continue;
        }

        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "reading resume file");
                continue;
            }
        };

        if let Err(e) = serde_bencode::from_bytes::<serde_bencode::value::Value>(&data) {
            tracing::warn!(path = %path.display(), error = %e, "parsing resume file");
            continue;
        }

        blobs.push(data);
    }
    blobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(scan_resume_dir(&missing).is_empty());
    }

    #[test]
    fn scans_valid_resume_files_and_skips_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let good_hash = "a".repeat(40);
        std::fs::write(dir.path().join(format!("{good_hash}.resume")), b"i0e").unwrap();
        std::fs::write(dir.path().join("not-a-hash.resume"), b"i0e").unwrap();
        std::fs::write(dir.path().join(format!("{}.tmp", "b".repeat(40))), b"i0e").unwrap();

        let blobs = scan_resume_dir(dir.path());
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0], b"i0e");
    }

    #[test]
    fn skips_files_that_fail_to_parse_as_bencode() {
        let dir = tempfile::tempdir().unwrap();
        let info_hash = "c".repeat(40);
        std::fs::write(dir.path().join(format!("{info_hash}.resume")), b"not bencode {{{").unwrap();

        assert!(scan_resume_dir(dir.path()).is_empty());
    }

    #[test]
    fn rejects_uppercase_hex_stem() {
        assert!(!looks_like_info_hash(&"A".repeat(40)));
        assert!(looks_like_info_hash(&"a".repeat(40)));
        assert!(!looks_like_info_hash(&"a".repeat(39)));
    }
}
