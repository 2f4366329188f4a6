//! Workbook export: the durability baseline for a run.
//!
//! Each flush rewrites the whole cumulative record set, so a crash between
//! flushes loses at most the batch in flight and never leaves a partial row.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};

use crate::records::EnrichedRecord;

const COLUMN_WIDTHS: [f64; 7] = [32.0, 32.0, 20.0, 44.0, 18.0, 32.0, 20.0];

/// Pick a path that does not exist yet, suffixing `(1)`, `(2)`, … on
/// collision. Chosen once at run start so historical runs never get
/// clobbered.
pub fn versioned_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for n in 1u32.. {
        let name = if ext.is_empty() {
            format!("{stem}({n})")
        } else {
            format!("{stem}({n}).{ext}")
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("ran out of version suffixes")
}

/// Write the header and every record to `path`, replacing any previous file.
/// Cell order is fixed: title, entity, location, address, phone, website, gst.
pub fn write_workbook(
    path: &Path,
    headers: &[&'static str; 7],
    records: &[EnrichedRecord],
) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
        sheet.set_column_width(col as u16, COLUMN_WIDTHS[col])?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        let cells = [
            record.listing.title.as_str(),
            record.listing.entity_name.as_str(),
            record.listing.location.as_str(),
            record.address.as_str(),
            record.phone.as_str(),
            record.website.as_str(),
            record.gst_number.as_str(),
        ];
        for (col, cell) in cells.iter().enumerate() {
            sheet.write_string(row, col as u16, *cell)?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("saving workbook {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ListingRecord, NOT_AVAILABLE};

    fn sample(n: usize) -> Vec<EnrichedRecord> {
        (0..n)
            .map(|i| {
                EnrichedRecord::new(
                    ListingRecord {
                        title: format!("Data Analyst {i}"),
                        entity_name: "Acme".into(),
                        location: "Pune, MH".into(),
                        source_label: "test".into(),
                    },
                    "14 MG Road".into(),
                    NOT_AVAILABLE.into(),
                    "acme.example".into(),
                    "27ABCDE1234F1Z5".into(),
                )
            })
            .collect()
    }

    const HEADERS: [&str; 7] = [
        "Job_Title",
        "Company_Name",
        "Location",
        "Address",
        "Phone",
        "Website",
        "GST_Number(s)",
    ];

    #[test]
    fn fresh_path_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Foo_Bar.xlsx");
        assert_eq!(versioned_path(&path), path);
    }

    #[test]
    fn existing_path_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Foo_Bar.xlsx");
        std::fs::write(&path, b"taken").unwrap();
        assert_eq!(versioned_path(&path), dir.path().join("Foo_Bar(1).xlsx"));

        std::fs::write(dir.path().join("Foo_Bar(1).xlsx"), b"taken").unwrap();
        assert_eq!(versioned_path(&path), dir.path().join("Foo_Bar(2).xlsx"));
    }

    #[test]
    fn writes_a_nonempty_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        write_workbook(&path, &HEADERS, &sample(3)).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
    }

    #[test]
    fn rewrite_with_cumulative_set_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        write_workbook(&path, &HEADERS, &sample(2)).unwrap();
        write_workbook(&path, &HEADERS, &sample(2)).unwrap();
        assert!(path.exists());
    }
}
