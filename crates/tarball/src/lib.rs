//! Tar stream assembly and decoding for container file transfer
//!
//! Container engines exchange files as single-root-relative tar streams:
//! uploads carry one or more named payloads rooted at a target directory,
//! downloads return an archive whose first entry is the requested file.
//! This crate builds those streams from in-memory bytes or local
//! filesystem trees and decodes them back to bytes or local writes.

use chrono::Utc;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tar::{Archive, Builder, Header};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive stream contained no file entries")]
    Empty,
    #[error("archive I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// A named byte payload carried by a tar stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub size: u64,
    pub mtime: u64,
}

/// Build a single-entry tar stream from in-memory content.
///
/// The entry is a regular file named `name`, stamped with the current time.
pub fn from_bytes(name: &str, data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = Builder::new(Vec::new());
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(Utc::now().timestamp() as u64);
    builder.append_data(&mut header, name, data)?;
    Ok(builder.into_inner()?)
}

/// Build a single-entry tar stream from a local file, stored as `arcname`.
pub fn from_file(local_path: &Path, arcname: &str) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = Builder::new(Vec::new());
    builder.append_path_with_name(local_path, arcname)?;
    Ok(builder.into_inner()?)
}

/// Build a multi-entry tar stream from a local directory tree.
///
/// The tree's relative structure is preserved under `root_name`, so
/// unpacking at a destination directory recreates `dest/root_name/...`.
pub fn from_tree(local_dir: &Path, root_name: &str) -> Result<Vec<u8>, ArchiveError> {
    let mut builder = Builder::new(Vec::new());
    builder.append_dir_all(root_name, local_dir)?;
    Ok(builder.into_inner()?)
}

/// Decode every regular-file entry in a tar stream.
pub fn entries(stream: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut archive = Archive::new(Cursor::new(stream));
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let mtime = entry.header().mtime().unwrap_or(0);
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        out.push(ArchiveEntry {
            name,
            size: data.len() as u64,
            mtime,
            data,
        });
    }
    Ok(out)
}

/// The first regular-file entry in a stream.
///
/// Download consumers expect at least one entry and use exactly this one.
pub fn first_entry(stream: &[u8]) -> Result<ArchiveEntry, ArchiveError> {
    entries(stream)?.into_iter().next().ok_or(ArchiveError::Empty)
}

/// Write the first entry's bytes to `dest`, creating parent directories.
///
/// Returns the byte size written.
pub fn unpack_first(stream: &[u8], dest: &Path) -> Result<u64, ArchiveError> {
    let entry = first_entry(stream)?;
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(dest)?;
    file.write_all(&entry.data)?;
    Ok(entry.size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_sets_size_and_recent_mtime() {
        let stream = from_bytes("a.txt", b"hello").unwrap();
        let entry = first_entry(&stream).unwrap();
        assert_eq!(entry.name, "a.txt");
        assert_eq!(entry.size, 5);
        assert_eq!(entry.data, b"hello");
        assert!(entry.mtime > 0);
    }

    #[test]
    fn empty_stream_yields_empty_error() {
        let stream = Builder::new(Vec::new()).into_inner().unwrap();
        assert!(matches!(first_entry(&stream), Err(ArchiveError::Empty)));
    }
}
