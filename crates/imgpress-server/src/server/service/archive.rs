//! Packs batch results into a zip archive.
//!
//! Entries are stored uncompressed since the payloads are already encoded
//! images. Each entry is named after the uploaded file with the output
//! format's extension; repeated names get a `_1`, `_2`, ... suffix.

use super::error::FileError;
use crate::server::dispatch::{BatchError, BatchSuccess};
use imgpress_core::CompressionResult;
use std::{
    collections::HashSet,
    io::{Cursor, Write},
};
use zip::{CompressionMethod, ZipWriter, result::ZipResult, write::SimpleFileOptions};

/// Name of the manifest entry listing failed files.
pub const ERRORS_ENTRY: &str = "errors.json";

/// Hands out unique entry names.
#[derive(Debug, Default)]
pub struct EntryNames {
    taken: HashSet<String>,
}

impl EntryNames {
    /// Returns `stem.extension` for `filename`, or `stem_N.extension` for
    /// the first free `N` once that name is taken.
    pub fn claim(&mut self, filename: &str, extension: &str) -> String {
        let stem = file_stem(filename);
        let mut name = format!("{stem}.{extension}");
        let mut counter = 1;
        while !self.taken.insert(name.clone()) {
            name = format!("{stem}_{counter}.{extension}");
            counter += 1;
        }
        name
    }
}

/// Download name for a single compressed file: the upload's stem with the
/// output extension, reduced to characters safe inside a quoted
/// `Content-Disposition` filename.
pub fn download_name(filename: &str, extension: &str) -> String {
    let name = EntryNames::default().claim(filename, extension);
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

/// Strips any client-side directories and the original extension.
fn file_stem(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    };
    if stem.is_empty() { "image" } else { stem }
}

/// Builds the archive for a batch with at least one success. When any file
/// failed an [`ERRORS_ENTRY`] manifest is appended.
pub fn build(
    results: &[BatchSuccess<CompressionResult>],
    errors: &[BatchError],
) -> ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut names = EntryNames::default();

    for success in results {
        let result = &success.output;
        let name = names.claim(&success.filename, result.format.extension());
        zip.start_file(name, options)?;
        zip.write_all(&result.data)?;
    }

    if !errors.is_empty() {
        let manifest: Vec<FileError> = errors.iter().map(FileError::from).collect();
        let json = serde_json::to_vec_pretty(&manifest).map_err(std::io::Error::other)?;
        let name = names.claim(ERRORS_ENTRY, "json");
        zip.start_file(name, options)?;
        zip.write_all(&json)?;
    }

    Ok(zip.finish()?.into_inner())
}
