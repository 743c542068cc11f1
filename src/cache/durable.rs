//! Durable tier: one file per key under a root directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::frame::{ColumnType, DataFrame};

use super::{CacheError, CacheResult};

const SUFFIX: &str = ".cache";
const TABLE_MARKER: &str = "dataframe";
const BINARY_TABLE_MARKER: &str = "intensity_data";

/// How a key's artifact is laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableFormat {
    /// Delimited text with a header row.
    Csv,
    /// bincode-encoded [`Payload`](super::Payload).
    Binary,
}

impl DurableFormat {
    /// Keys carrying the table marker are CSV, except intensity matrices.
    pub fn for_key(key: &str) -> Self {
        let lower = key.to_lowercase();
        if lower.contains(TABLE_MARKER) && !lower.contains(BINARY_TABLE_MARKER) {
            DurableFormat::Csv
        } else {
            DurableFormat::Binary
        }
    }

    /// Whether `key` may hold a table at all.
    pub fn accepts_table(key: &str) -> bool {
        key.to_lowercase().contains(TABLE_MARKER)
    }
}

#[derive(Debug, Clone)]
pub struct DurableStore {
    root: PathBuf,
}

impl DurableStore {
    pub fn open(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `a::b_c` -> `a__b_5Fc.cache`
    ///
    /// A literal underscore is escaped first so `__` only ever stands for `::`.
    pub fn filename(key: &str) -> String {
        format!("{}{}", key.replace('_', "_5F").replace("::", "__"), SUFFIX)
    }

    pub fn key_from_filename(filename: &str) -> String {
        let stem = filename.strip_suffix(SUFFIX).unwrap_or(filename);
        let mut key = String::with_capacity(stem.len());
        let mut rest = stem;
        while let Some(idx) = rest.find('_') {
            key.push_str(&rest[..idx]);
            let tail = &rest[idx + 1..];
            if let Some(after) = tail.strip_prefix('_') {
                key.push_str("::");
                rest = after;
            } else if let Some(after) = tail.strip_prefix("5F") {
                key.push('_');
                rest = after;
            } else {
                key.push('_');
                rest = tail;
            }
        }
        key.push_str(rest);
        key
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(Self::filename(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path(key).is_file()
    }

    pub fn write_bytes(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        self.write_atomic(key, |file| file.write_all(bytes).map_err(CacheError::from))
    }

    pub fn read_bytes(&self, key: &str) -> CacheResult<Vec<u8>> {
        Ok(fs::read(self.path(key))?)
    }

    pub fn write_table(&self, key: &str, table: &DataFrame) -> CacheResult<()> {
        self.write_atomic(key, |file| {
            let types: Vec<ColumnType> = (0..table.columns.len())
                .map(|idx| ColumnType::of(table.rows.iter().map(|row| &row[idx])))
                .collect();

            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&table.columns)?;
            writer.write_record(types.iter().map(ColumnType::as_str))?;
            for row in &table.rows {
                writer.write_record(row.iter().zip(&types).map(|(cell, ty)| ty.encode(cell)))?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    /// Read a CSV artifact. The row after the header names each column's
    /// type; a missing or unreadable type row is corruption.
    pub fn read_table(&self, key: &str) -> CacheResult<DataFrame> {
        let file = fs::File::open(self.path(key))?;
        let corrupt = |source: Box<dyn std::error::Error + Send + Sync>| CacheError::Corrupt {
            key: key.to_string(),
            source,
        };

        let mut reader = csv::Reader::from_reader(file);
        let columns = reader.headers().map_err(|e| corrupt(e.into()))?.clone();
        let mut records = reader.records();

        let type_row = match records.next() {
            Some(row) => row.map_err(|e| corrupt(e.into()))?,
            None => return Err(corrupt("missing column type row".into())),
        };
        let types = type_row
            .iter()
            .map(str::parse::<ColumnType>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| corrupt(e.into()))?;

        let mut table = DataFrame::new(columns.iter());
        for record in records {
            let record = record.map_err(|e| corrupt(e.into()))?;
            let row = record
                .iter()
                .zip(&types)
                .map(|(raw, ty)| ty.decode(raw))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| corrupt(e.into()))?;
            table.push_row(row).map_err(|e| corrupt(e.into()))?;
        }
        Ok(table)
    }

    /// Remove the artifact for `key`; false if there was none.
    pub fn remove(&self, key: &str) -> CacheResult<bool> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Artifact file names currently on disk, sorted.
    pub fn list_filenames(&self) -> CacheResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(SUFFIX) && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Write through a hidden temp file and rename into place.
    fn write_atomic<F>(&self, key: &str, write: F) -> CacheResult<()>
    where
        F: FnOnce(&mut fs::File) -> CacheResult<()>,
    {
        let final_path = self.path(key);
        let tmp_path = self.root.join(format!(".{}.tmp", Self::filename(key)));

        let result = (|| -> CacheResult<()> {
            let mut file = fs::File::create(&tmp_path)?;
            write(&mut file)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &final_path)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}
