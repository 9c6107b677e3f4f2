//! Delimited text. Values load as nullable strings; typing is left to coercion.
//!
//! An empty field loads as null, quoted or not, so an empty string and a null
//! both encode as an empty field and both read back as null.

use super::{LoadOptions, SaveOptions, TabularFormat};
use crate::dataset::{Column, ColumnData, TabularDataset};
use crate::error::FormatError;

/// CSV adapter (`.csv`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFormat;

fn delimiter_byte(delimiter: char) -> Result<u8, FormatError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            FormatError::invalid_data(format!("CSV delimiter {delimiter:?} is not ASCII"))
        })
}

impl TabularFormat for CsvFormat {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }

    fn decode(&self, bytes: &[u8], options: &LoadOptions) -> Result<TabularDataset, FormatError> {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(delimiter_byte(options.csv_delimiter)?)
            .has_headers(options.has_header)
            .from_reader(bytes);

        // Without a header row, `headers()` still reports the first record,
        // which gives the column count.
        let first = reader.headers()?.clone();
        let names: Vec<String> = if options.has_header {
            first.iter().map(|h| h.trim().to_string()).collect()
        } else {
            (1..=first.len()).map(|i| format!("column_{i}")).collect()
        };

        let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
        for (row, record) in reader.records().enumerate() {
            if options.max_rows.is_some_and(|max| row >= max) {
                break;
            }
            let record = record?;
            for (i, cell) in record.iter().enumerate() {
                if let Some(column) = values.get_mut(i) {
                    column.push((!cell.is_empty()).then(|| cell.to_string()));
                }
            }
        }

        let columns = names
            .into_iter()
            .zip(values)
            .map(|(name, data)| Column::new(name, ColumnData::String(data)))
            .collect();
        Ok(TabularDataset::try_new(columns)?)
    }

    fn encode(
        &self,
        dataset: &TabularDataset,
        options: &SaveOptions,
    ) -> Result<Vec<u8>, FormatError> {
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(delimiter_byte(options.csv_delimiter)?)
            .from_writer(Vec::new());

        writer.write_record(dataset.column_names())?;
        for row in 0..dataset.row_count() {
            let record: Vec<String> = dataset
                .columns()
                .iter()
                .map(|c| c.data.display_value(row).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }

        writer
            .into_inner()
            .map_err(|e| FormatError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(values: &[Option<&str>]) -> ColumnData {
        ColumnData::String(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_decode_header_and_row() {
        let ds = CsvFormat
            .decode(b"a,b,c\n1,2,3\n", &LoadOptions::default())
            .unwrap();
        assert_eq!(ds.column_names(), vec!["a", "b", "c"]);
        assert_eq!(ds.row_count(), 1);
        assert_eq!(ds.column("a").unwrap().data, strings(&[Some("1")]));
        assert_eq!(ds.column("c").unwrap().data, strings(&[Some("3")]));
    }

    #[test]
    fn test_decode_empty_field_is_null() {
        let ds = CsvFormat
            .decode(b"a,b\n1,\n,x\n", &LoadOptions::default())
            .unwrap();
        assert_eq!(ds.column("a").unwrap().data, strings(&[Some("1"), None]));
        assert_eq!(ds.column("b").unwrap().data, strings(&[None, Some("x")]));
    }

    #[test]
    fn test_empty_string_reads_back_as_null() {
        let ds = TabularDataset::try_new(vec![Column::new(
            "note",
            strings(&[Some(""), None, Some("x")]),
        )])
        .unwrap();
        let bytes = CsvFormat.encode(&ds, &SaveOptions::default()).unwrap();
        let back = CsvFormat.decode(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(back.column("note").unwrap().data, strings(&[None, None, Some("x")]));

        let quoted = CsvFormat
            .decode(b"note\n\"\"\n", &LoadOptions::default())
            .unwrap();
        assert_eq!(quoted.column("note").unwrap().data, strings(&[None]));
    }

    #[test]
    fn test_decode_without_header() {
        let options = LoadOptions {
            has_header: false,
            csv_delimiter: ';',
            ..LoadOptions::default()
        };
        let ds = CsvFormat.decode(b"1;2\n3;4\n", &options).unwrap();
        assert_eq!(ds.column_names(), vec!["column_1", "column_2"]);
        assert_eq!(ds.row_count(), 2);
    }

    #[test]
    fn test_decode_max_rows() {
        let options = LoadOptions {
            max_rows: Some(1),
            ..LoadOptions::default()
        };
        let ds = CsvFormat.decode(b"a\n1\n2\n3\n", &options).unwrap();
        assert_eq!(ds.row_count(), 1);
    }

    #[test]
    fn test_decode_ragged_row_fails() {
        let result = CsvFormat.decode(b"a,b\n1,2\n3\n", &LoadOptions::default());
        assert!(matches!(result, Err(FormatError::Csv(_))));
    }

    #[test]
    fn test_decode_header_only_has_zero_rows() {
        let ds = CsvFormat.decode(b"a,b\n", &LoadOptions::default()).unwrap();
        assert_eq!(ds.row_count(), 0);
        assert_eq!(ds.column_count(), 2);
    }

    #[test]
    fn test_encode_renders_typed_values() {
        let ds = TabularDataset::try_new(vec![
            Column::new("n", ColumnData::Integer(vec![Some(7), None])),
            Column::new("ok", ColumnData::Boolean(vec![Some(true), Some(false)])),
            Column::new(
                "raw",
                ColumnData::Raw(vec![serde_json::json!({"k": 1}), serde_json::json!("s")]),
            ),
        ])
        .unwrap();
        let bytes = CsvFormat.encode(&ds, &SaveOptions::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "n,ok,raw\n7,true,\"{\"\"k\"\":1}\"\n,false,s\n");
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let options = LoadOptions {
            csv_delimiter: '§',
            ..LoadOptions::default()
        };
        assert!(matches!(
            CsvFormat.decode(b"a\n1\n", &options),
            Err(FormatError::InvalidData(_))
        ));
    }
}
