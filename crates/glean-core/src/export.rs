//! CSV export with schema-drift handling and atomic commit.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::ExportFailure;
use crate::models::{ExportBatch, ExportOutcome, Record};
use crate::traits::Exporter;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writes records as UTF-8, comma-delimited CSV.
///
/// The header is the union of all field names in first-seen order (after any
/// seed columns). Missing and null values become empty cells. The file is
/// written to a temporary sibling and renamed over the destination, so a
/// failed export never leaves a partial file behind.
#[derive(Debug, Clone, Default)]
pub struct CsvExporter {
    bom: bool,
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix the file with a UTF-8 byte-order mark for spreadsheet tools.
    pub fn with_bom(mut self, bom: bool) -> Self {
        self.bom = bom;
        self
    }

    fn write_to<W: Write>(
        &self,
        out: W,
        columns: &[String],
        records: &[Record],
    ) -> Result<(), ExportFailure> {
        let mut writer = csv::Writer::from_writer(out);
        // No columns at all means an empty file rather than a blank header line.
        if !columns.is_empty() {
            writer.write_record(columns)?;
        }
        for record in records {
            writer.write_record(columns.iter().map(|c| record.get(c).unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Seed columns first, then every record's field names in first-seen order.
pub fn union_columns(seed: &[String], records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(seed.len());
    let fields = seed
        .iter()
        .map(String::as_str)
        .chain(records.iter().flat_map(|r| r.keys()));
    for name in fields {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    }
    columns
}

impl Exporter for CsvExporter {
    fn export(
        &self,
        batch: ExportBatch<'_>,
        destination: &Path,
    ) -> Result<ExportOutcome, ExportFailure> {
        let columns = union_columns(batch.columns, batch.records);

        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        if self.bom {
            tmp.write_all(UTF8_BOM)?;
        }
        self.write_to(tmp.as_file_mut(), &columns, batch.records)?;
        tmp.as_file().sync_all()?;
        // Dropping an unpersisted NamedTempFile removes it.
        tmp.persist(destination).map_err(|e| ExportFailure::Io(e.error.to_string()))?;

        tracing::info!(
            path = %destination.display(),
            rows = batch.records.len(),
            columns = columns.len(),
            "Exported CSV"
        );

        Ok(ExportOutcome {
            rows_written: batch.records.len(),
            columns,
            path: destination.to_path_buf(),
        })
    }
}
