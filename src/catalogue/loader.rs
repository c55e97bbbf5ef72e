/// CSV snapshot loader with schema validation at the load boundary.
///
/// The snapshot is produced by an external preprocessing pipeline. Any schema
/// violation aborts the load: a partially loaded catalogue is never served.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;

use super::{Catalogue, MedicineRecord};
use crate::errors::PharmaError;

pub const REQUIRED_COLUMNS: [&str; 7] = [
    "medicine_name",
    "salt_composition",
    "packagingType",
    "pack",
    "marketed_by",
    "manufactured_by",
    "gst",
];

/// One CSV row exactly as the snapshot schema defines it.
#[derive(Debug, Deserialize)]
struct CatalogueRow {
    medicine_name: String,
    salt_composition: String,
    #[serde(rename = "packagingType")]
    packaging_type: String,
    pack: String,
    marketed_by: String,
    manufactured_by: String,
    gst: String,
}

pub fn load_csv(path: &Path) -> Result<Catalogue, PharmaError> {
    let file = File::open(path).map_err(|e| {
        PharmaError::load(format!("cannot open catalogue '{}': {}", path.display(), e))
    })?;
    tracing::info!(path = %path.display(), "Loading catalogue snapshot");
    read_csv(BufReader::new(file))
}

pub fn read_csv<R: Read>(reader: R) -> Result<Catalogue, PharmaError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(PharmaError::load(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let mut records = Vec::new();
    for (idx, row) in csv_reader.deserialize::<CatalogueRow>().enumerate() {
        let row_number = idx + 1;
        let row = row.map_err(|e| PharmaError::Load {
            message: e.to_string(),
            row: Some(row_number),
        })?;
        if row.medicine_name.is_empty() {
            return Err(PharmaError::Load {
                message: "empty medicine_name".to_string(),
                row: Some(row_number),
            });
        }
        records.push(MedicineRecord::with_details(
            idx,
            &row.medicine_name,
            &row.salt_composition,
            &row.packaging_type,
            &row.pack,
            &row.marketed_by,
            &row.manufactured_by,
            &row.gst,
        ));
    }

    if records.is_empty() {
        return Err(PharmaError::load("catalogue contains no records"));
    }

    tracing::info!(records = records.len(), "Catalogue snapshot loaded");
    Catalogue::from_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "medicine_name,salt_composition,packagingType,pack,marketed_by,manufactured_by,gst\n";

    #[test]
    fn test_reads_valid_snapshot() {
        let csv = format!(
            "{}{}{}",
            HEADER,
            "Crocin 650mg Tablet,Paracetamol (650mg),strip,15 tablets,GSK,GSK,12\n",
            "\"Azee 500, Tablet\",Azithromycin (500mg),strip,3 tablets,Cipla,Cipla,12\n",
        );
        let catalogue = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(catalogue.len(), 2);
        let azee = catalogue.get(1).unwrap();
        assert_eq!(azee.name, "Azee 500, Tablet");
        assert_eq!(azee.manufacturer, "Cipla");
        assert_eq!(azee.dosage(), Some("500mg"));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let csv = "medicine_name,salt_composition,packagingType,pack,marketed_by,manufactured_by,gst,price\n\
                   Dolo,Paracetamol (650mg),strip,15,Micro,Micro,12,30.5\n";
        let catalogue = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(catalogue.len(), 1);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let csv = "medicine_name,salt_composition,packagingType,pack,marketed_by,gst\nA,B,C,D,E,F\n";
        let err = read_csv(csv.as_bytes()).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("manufactured_by"), "got: {}", err);
    }

    #[test]
    fn test_empty_name_reports_row() {
        let csv = format!("{}A,x,strip,1,M,M,12\n ,y,strip,1,M,M,12\n", HEADER);
        let err = read_csv(csv.as_bytes()).unwrap_err();
        match err {
            PharmaError::Load { row, .. } => assert_eq!(row, Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ragged_row_is_fatal() {
        let csv = format!("{}A,x,strip\n", HEADER);
        assert!(read_csv(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_header_only_is_fatal() {
        assert!(read_csv(HEADER.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = load_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(err.to_string().contains("cannot open catalogue"));
    }
}
