//! Catalogue loading
//!
//! Reads the screening table produced by the scraper. Row identifiers are the 0-based
//! position in load order and are the join key between search hits and catalogue rows.

use crate::error::{ReelseekError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Cell values treated as missing and coerced to an empty string
const MISSING_MARKERS: &[&str] = &[
    "", "NaN", "nan", "-NaN", "-nan", "NA", "N/A", "n/a", "<NA>", "NULL", "null", "None", "#N/A",
];

pub const TITLE_COLUMN: &str = "Title";
pub const DESCRIPTION_COLUMN: &str = "Description";
pub const URL_COLUMN: &str = "URL";

/// One screening/session record
#[derive(Debug, Clone, Serialize)]
pub struct CatalogueRow {
    /// Position in the loaded table
    pub id: u64,
    pub title: String,
    /// Content of the configured embedding field
    pub text_to_embed: String,
    /// Every column of the row, including the two above
    pub fields: BTreeMap<String, String>,
}

impl CatalogueRow {
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }
}

/// A loaded catalogue
#[derive(Debug, Clone)]
pub struct Catalogue {
    columns: Vec<String>,
    rows: Vec<CatalogueRow>,
    fingerprint: String,
}

impl Catalogue {
    /// Load a catalogue from a CSV file
    pub fn load(path: &Path, text_field: &str) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| ReelseekError::Io {
            source: e,
            context: format!("Failed to open catalogue: {:?}", path),
        })?;
        let catalogue = Self::from_reader(file, text_field)?;

        tracing::info!(
            "Loaded {} rows from {:?} (embedding field: {})",
            catalogue.len(),
            path,
            text_field
        );

        Ok(catalogue)
    }

    /// Load a catalogue from any CSV source
    pub fn from_reader<R: Read>(reader: R, text_field: &str) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if !columns.iter().any(|c| c == text_field) {
            return Err(ReelseekError::MissingField {
                field: text_field.to_string(),
                available: columns,
            });
        }

        if !columns.iter().any(|c| c == TITLE_COLUMN) {
            tracing::warn!("Catalogue has no '{}' column, titles will be empty", TITLE_COLUMN);
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(columns.join("\x1f").as_bytes());

        let mut rows = Vec::new();
        for (position, record) in csv_reader.records().enumerate() {
            let record = record?;

            let fields: BTreeMap<String, String> = columns
                .iter()
                .enumerate()
                .map(|(i, column)| (column.clone(), normalize(record.get(i))))
                .collect();

            for value in fields.values() {
                hasher.update(b"\x1e");
                hasher.update(value.as_bytes());
            }

            let title = fields.get(TITLE_COLUMN).cloned().unwrap_or_default();
            let text_to_embed = fields.get(text_field).cloned().unwrap_or_default();

            rows.push(CatalogueRow {
                id: position as u64,
                title,
                text_to_embed,
                fields,
            });
        }

        Ok(Self {
            columns,
            rows,
            fingerprint: hasher.finalize().to_hex().to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[CatalogueRow] {
        &self.rows
    }

    /// Look up a row by the id returned from a search
    pub fn row(&self, id: u64) -> Option<&CatalogueRow> {
        usize::try_from(id).ok().and_then(|i| self.rows.get(i))
    }

    /// Content hash identifying this version of the dataset
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Case-insensitive substring match on title or description
    pub fn filter_by_term(&self, term: &str) -> Vec<&CatalogueRow> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.rows.iter().collect();
        }

        self.rows
            .iter()
            .filter(|row| {
                row.title.to_lowercase().contains(&term)
                    || row.get(DESCRIPTION_COLUMN).to_lowercase().contains(&term)
            })
            .collect()
    }
}

fn normalize(value: Option<&str>) -> String {
    match value {
        Some(v) if !MISSING_MARKERS.contains(&v.trim()) => v.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Title,Description,Description_movie_full,URL
Ghost Story,Horror,a horror movie about ghosts,https://example.org/1
Love Actually,Romance,a romantic comedy,https://example.org/2
Untitled,NaN,,https://example.org/3
";

    #[test]
    fn test_ids_follow_load_order() {
        let catalogue = Catalogue::from_reader(CSV.as_bytes(), "Description_movie_full").unwrap();

        assert_eq!(catalogue.len(), 3);
        let ids: Vec<u64> = catalogue.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(catalogue.row(1).unwrap().title, "Love Actually");
        assert!(catalogue.row(3).is_none());
    }

    #[test]
    fn test_missing_values_become_empty() {
        let catalogue = Catalogue::from_reader(CSV.as_bytes(), "Description_movie_full").unwrap();

        let row = catalogue.row(2).unwrap();
        assert_eq!(row.text_to_embed, "");
        assert_eq!(row.get(DESCRIPTION_COLUMN), "");
    }

    #[test]
    fn test_missing_field_is_named() {
        let result = Catalogue::from_reader(CSV.as_bytes(), "Synopsis");

        match result {
            Err(ReelseekError::MissingField { field, available }) => {
                assert_eq!(field, "Synopsis");
                assert!(available.contains(&"Title".to_string()));
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_header_only_catalogue() {
        let catalogue =
            Catalogue::from_reader("Title,Description_movie_full\n".as_bytes(), "Description_movie_full")
                .unwrap();
        assert!(catalogue.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Catalogue::from_reader(CSV.as_bytes(), "Description_movie_full").unwrap();
        let b = Catalogue::from_reader(CSV.as_bytes(), "Description_movie_full").unwrap();
        let changed = CSV.replace("ghosts", "vampires");
        let c = Catalogue::from_reader(changed.as_bytes(), "Description_movie_full").unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_filter_by_term() {
        let catalogue = Catalogue::from_reader(CSV.as_bytes(), "Description_movie_full").unwrap();

        let hits = catalogue.filter_by_term("GHOST");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 0);

        let hits = catalogue.filter_by_term("romance");
        assert_eq!(hits[0].id, 1);

        assert_eq!(catalogue.filter_by_term("  ").len(), 3);
    }
}
