//! Gzip-compressed tarballs of a checked-out tree.

use std::fs::File;
use std::io;
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Pack `src_dir` into a `.tar.gz` at `dest`, rooted under `prefix/`.
///
/// Symlinks are stored as links, never followed.
pub fn compress_dir(src_dir: &Path, dest: &Path, prefix: &str) -> io::Result<()> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(prefix, src_dir)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Unpack a `.tar.gz` held in memory into `dest`.
pub fn extract_bytes(bytes: &[u8], dest: &Path) -> io::Result<()> {
    let decoder = GzDecoder::new(bytes);
    tar::Archive::new(decoder).unpack(dest)
}
