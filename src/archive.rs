//! Tar streaming of host directories

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Stream `source` as a tar archive into `out`.
///
/// Entries are relative to `source`, which is passed explicitly instead of
/// changing the process working directory. A `compression` level above 0
/// gzips the stream. Symlinks are archived as links, not followed.
pub fn stream_directory<W: Write>(source: &Path, out: W, compression: u32) -> io::Result<()> {
    if compression == 0 {
        let mut builder = tar::Builder::new(out);
        append_tree(&mut builder, source)?;
        builder.into_inner()?.flush()
    } else {
        let encoder = GzEncoder::new(out, Compression::new(compression.min(9)));
        let mut builder = tar::Builder::new(encoder);
        append_tree(&mut builder, source)?;
        builder.into_inner()?.finish()?.flush()
    }
}

fn append_tree<W: Write>(builder: &mut tar::Builder<W>, source: &Path) -> io::Result<()> {
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source)
}

/// Unpack a plain tar stream into `dest`, entry by entry as bytes arrive.
///
/// Entries that would land outside `dest` are skipped by `tar` itself.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    archive.unpack(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn entries(archive: &[u8]) -> BTreeMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(archive);
        let mut out = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.header().entry_type().is_file() {
                let path = entry.path().unwrap().display().to_string();
                let mut content = Vec::new();
                entry.read_to_end(&mut content).unwrap();
                out.insert(path, content);
            }
        }
        out
    }

    fn sample_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("x.txt"), "x").unwrap();
        fs::create_dir_all(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("sub/y.txt"), "y").unwrap();
        temp_dir
    }

    #[test]
    fn test_entries_are_relative_to_source() {
        let source = sample_tree();
        let mut out = Vec::new();
        stream_directory(source.path(), &mut out, 0).unwrap();

        let files = entries(&out);
        assert_eq!(files.get("x.txt").map(Vec::as_slice), Some(&b"x"[..]));
        assert_eq!(files.get("sub/y.txt").map(Vec::as_slice), Some(&b"y"[..]));
        assert!(files.keys().all(|k| !k.starts_with('/')));
    }

    #[test]
    fn test_compressed_stream_is_gzip() {
        let source = sample_tree();
        let mut out = Vec::new();
        stream_directory(source.path(), &mut out, 6).unwrap();

        assert_eq!(&out[..2], &[0x1f, 0x8b]);
        let mut plain = Vec::new();
        GzDecoder::new(out.as_slice()).read_to_end(&mut plain).unwrap();
        assert_eq!(entries(&plain).len(), 2);
    }

    #[test]
    fn test_unpack_creates_dest() {
        let source = sample_tree();
        let mut out = Vec::new();
        stream_directory(source.path(), &mut out, 0).unwrap();

        let dest = TempDir::new().unwrap();
        let target = dest.path().join("nested/target");
        unpack(out.as_slice(), &target).unwrap();

        assert_eq!(fs::read_to_string(target.join("x.txt")).unwrap(), "x");
        assert_eq!(fs::read_to_string(target.join("sub/y.txt")).unwrap(), "y");
    }

    #[test]
    fn test_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = stream_directory(&temp_dir.path().join("missing"), Vec::new(), 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_archive_fails_to_unpack() {
        let source = sample_tree();
        let mut out = Vec::new();
        stream_directory(source.path(), &mut out, 0).unwrap();
        out.truncate(700);

        let dest = TempDir::new().unwrap();
        assert!(unpack(out.as_slice(), dest.path()).is_err());
    }
}
