use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use anyhow::{anyhow, Context, Result};
use log::debug;

const CATEGORY_COLUMN: &str = "Category";
const FILE_COLUMN: &str = "File";

/// One row of the source catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub category: String,
    pub file: String,
}

/// Source files grouped by category, loaded from a `Category`,`File` CSV
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Load a catalog CSV from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))
    }

    /// Parse a catalog; extra columns are ignored, rows missing either field are dropped
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv.headers().context("Failed to read CSV header")?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let (category_idx, file_idx) = match (column(CATEGORY_COLUMN), column(FILE_COLUMN)) {
            (Some(c), Some(f)) => (c, f),
            _ => return Err(anyhow!("CSV must contain '{}' and '{}' columns", CATEGORY_COLUMN, FILE_COLUMN)),
        };

        let mut entries = Vec::new();
        for (line, record) in csv.records().enumerate() {
            let record = record.with_context(|| format!("Malformed CSV row {}", line + 2))?;
            let category = record.get(category_idx).unwrap_or_default();
            let file = record.get(file_idx).unwrap_or_default();
            if category.is_empty() || file.is_empty() {
                debug!("Skipping incomplete CSV row {}", line + 2);
                continue;
            }
            entries.push(CatalogEntry {
                category: category.to_string(),
                file: file.to_string(),
            });
        }

        Ok(Catalog { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Distinct categories in order of first appearance
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| e.category.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// File entries listed under `category`, in catalog order
    pub fn files_for(&self, category: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.category == category)
            .map(|e| e.file.clone())
            .collect()
    }
}
