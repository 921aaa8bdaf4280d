//! Catalog discovery from bucket contents

use std::collections::BTreeMap;

use crate::catalog::{Catalog, CatalogEntry};
use crate::remote_client::ObjectDirectory;
use crate::types::RawFormat;
use crate::Result;

/// Name of the connectivity check entry every discovered catalog carries
pub const TEST_CONNECTION_TABLE: &str = "test_connection";

/// Build a catalog with one raw table per bucket and file format found
///
/// A bucket whose listing fails is skipped; failing to list the buckets
/// themselves is an error.
pub fn discover_catalog(directory: &dyn ObjectDirectory) -> Result<Catalog> {
    let mut catalog = Catalog::new().with_entry(TEST_CONNECTION_TABLE, CatalogEntry::Dummy);

    for bucket in directory.list_buckets()? {
        let objects = match directory.list_objects(&bucket) {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(bucket = %bucket, error = %e, "skipping bucket during discovery");
                continue;
            }
        };

        let mut formats: BTreeMap<RawFormat, usize> = BTreeMap::new();
        for object in &objects {
            if let Some(format) = format_of(&object.name) {
                *formats.entry(format).or_default() += 1;
            }
        }
        tracing::debug!(
            bucket = %bucket,
            objects = objects.len(),
            formats = ?formats,
            "scanned bucket"
        );

        for format in formats.into_keys() {
            catalog.insert(
                table_name(&bucket, format),
                CatalogEntry::raw_table(bucket.clone(), "", format),
            );
        }
    }

    tracing::info!(tables = catalog.len(), "discovered catalog");
    Ok(catalog)
}

fn format_of(name: &str) -> Option<RawFormat> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.eq_ignore_ascii_case("metadata") {
        return None;
    }
    RawFormat::parse(ext).ok()
}

/// `<bucket>_<ext>`, lowercased, with characters invalid in bare identifiers replaced
pub fn table_name(bucket: &str, format: RawFormat) -> String {
    format!("{}_{}", bucket, format.extension())
        .to_lowercase()
        .replace(['-', '.'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_normalization() {
        assert_eq!("sales_data_csv", table_name("Sales-Data", RawFormat::Csv));
        assert_eq!("logs_v1_parquet", table_name("logs.v1", RawFormat::Parquet));
    }

    #[test]
    fn test_format_of() {
        assert_eq!(Some(RawFormat::Csv), format_of("dir/a.CSV"));
        assert_eq!(Some(RawFormat::Json), format_of("b.json"));
        assert_eq!(None, format_of("a.csv.metadata"));
        assert_eq!(None, format_of("README"));
        assert_eq!(None, format_of("notes.txt"));
    }
}
