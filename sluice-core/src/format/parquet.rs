//! Apache Parquet via Arrow record batches.
//!
//! Logical types map to Arrow as integer → Int64, float → Float64,
//! string → Utf8, datetime → Timestamp(ns), bool → Boolean. Raw columns are
//! stored as Utf8 holding their JSON text.
//!
//! Encoding a datetime outside the nanosecond range (1677-09-21..2262-04-11)
//! is an error. Decoding accepts every timestamp unit and reads wider units
//! without passing through nanoseconds.

use super::{LoadOptions, ParquetCompression, SaveOptions, TabularFormat};
use crate::dataset::{
    Column, ColumnData, ColumnKind, TabularDataset, epoch_nanos,
};
use crate::error::FormatError;
use ::parquet::arrow::ArrowWriter;
use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::basic::{Compression, GzipLevel, ZstdLevel};
use ::parquet::file::properties::WriterProperties;
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Date64Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt8Type, UInt16Type, UInt32Type,
};
use arrow_array::{
    Array, ArrayRef, ArrowPrimitiveType, BooleanArray, Float64Array, Int64Array, PrimitiveArray,
    RecordBatch, StringArray, TimestampNanosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

/// Parquet adapter (`.parquet`, `.pq`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetFormat;

impl TabularFormat for ParquetFormat {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["parquet", "pq"]
    }

    fn decode(&self, bytes: &[u8], options: &LoadOptions) -> Result<TabularDataset, FormatError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))?;
        let schema = builder.schema().clone();
        let reader = builder.build()?;

        let mut columns = schema
            .fields()
            .iter()
            .map(|field| {
                kind_for(field.data_type())
                    .map(|kind| Column::new(field.name().as_str(), ColumnData::empty(kind)))
                    .ok_or_else(|| {
                        FormatError::invalid_data(format!(
                            "Parquet column '{}' has unsupported type {}",
                            field.name(),
                            field.data_type()
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut remaining = options.max_rows;
        for batch in reader {
            if remaining == Some(0) {
                break;
            }
            let mut batch = batch?;
            if let Some(left) = remaining {
                let take = left.min(batch.num_rows());
                batch = batch.slice(0, take);
                remaining = Some(left - take);
            }
            for (column, array) in columns.iter_mut().zip(batch.columns()) {
                let data = column_from_array(array.as_ref())?;
                column.data.append(&column.name, data)?;
            }
        }

        Ok(TabularDataset::try_new(columns)?)
    }

    fn encode(
        &self,
        dataset: &TabularDataset,
        options: &SaveOptions,
    ) -> Result<Vec<u8>, FormatError> {
        let fields: Vec<Field> = dataset
            .columns()
            .iter()
            .map(|c| Field::new(c.name.as_str(), arrow_type(c.kind()), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let props = WriterProperties::builder()
            .set_compression(compression(options.parquet_compression))
            .build();

        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, schema.clone(), Some(props))?;
        if dataset.column_count() > 0 {
            let arrays = dataset
                .columns()
                .iter()
                .map(array_for)
                .collect::<Result<Vec<ArrayRef>, _>>()?;
            let batch = RecordBatch::try_new(schema, arrays)?;
            writer.write(&batch)?;
        }
        writer.close()?;
        Ok(buf)
    }
}

fn compression(codec: ParquetCompression) -> Compression {
    match codec {
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::None => Compression::UNCOMPRESSED,
    }
}

fn arrow_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Integer => DataType::Int64,
        ColumnKind::Float => DataType::Float64,
        ColumnKind::String | ColumnKind::Raw => DataType::Utf8,
        ColumnKind::DateTime => DataType::Timestamp(TimeUnit::Nanosecond, None),
        ColumnKind::Boolean => DataType::Boolean,
    }
}

fn kind_for(data_type: &DataType) -> Option<ColumnKind> {
    let kind = match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => ColumnKind::Integer,
        DataType::Float32 | DataType::Float64 => ColumnKind::Float,
        DataType::Utf8 | DataType::LargeUtf8 => ColumnKind::String,
        DataType::Boolean => ColumnKind::Boolean,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => ColumnKind::DateTime,
        DataType::Null => ColumnKind::Raw,
        _ => return None,
    };
    Some(kind)
}

fn array_for(column: &Column) -> Result<ArrayRef, FormatError> {
    let array: ArrayRef = match &column.data {
        ColumnData::Integer(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::Float(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::String(v) => Arc::new(StringArray::from(v.clone())),
        ColumnData::Boolean(v) => Arc::new(BooleanArray::from(v.clone())),
        ColumnData::DateTime(v) => Arc::new(TimestampNanosecondArray::from(
            v.iter()
                .enumerate()
                .map(|(row, dt)| match dt {
                    None => Ok(None),
                    Some(dt) => epoch_nanos(dt).map(Some).ok_or_else(|| {
                        FormatError::invalid_data(format!(
                            "Column '{}' row {row}: {dt} is outside the Parquet nanosecond timestamp range",
                            column.name
                        ))
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnData::Raw(v) => Arc::new(StringArray::from(
            v.iter()
                .map(|value| match value {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>(),
        )),
    };
    Ok(array)
}

fn integers<T>(array: &PrimitiveArray<T>) -> ColumnData
where
    T: ArrowPrimitiveType,
    T::Native: Into<i64>,
{
    ColumnData::Integer(array.iter().map(|v| v.map(Into::into)).collect())
}

fn timestamps<T>(
    array: &PrimitiveArray<T>,
    to_datetime: impl Fn(i64) -> Option<chrono::DateTime<chrono::Utc>>,
) -> Result<ColumnData, FormatError>
where
    T: ArrowPrimitiveType,
    T::Native: Into<i64>,
{
    array
        .iter()
        .map(|v| match v {
            None => Ok(None),
            Some(raw) => {
                let raw = raw.into();
                to_datetime(raw).map(|dt| Some(dt.naive_utc())).ok_or_else(|| {
                    FormatError::invalid_data(format!("timestamp {raw} is out of range"))
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ColumnData::DateTime)
}

fn column_from_array(array: &dyn Array) -> Result<ColumnData, FormatError> {
    let data = match array.data_type() {
        DataType::Int8 => integers(array.as_primitive::<Int8Type>()),
        DataType::Int16 => integers(array.as_primitive::<Int16Type>()),
        DataType::Int32 => integers(array.as_primitive::<Int32Type>()),
        DataType::Int64 => integers(array.as_primitive::<Int64Type>()),
        DataType::UInt8 => integers(array.as_primitive::<UInt8Type>()),
        DataType::UInt16 => integers(array.as_primitive::<UInt16Type>()),
        DataType::UInt32 => integers(array.as_primitive::<UInt32Type>()),
        DataType::Float32 => ColumnData::Float(
            array
                .as_primitive::<Float32Type>()
                .iter()
                .map(|v| v.map(f64::from))
                .collect(),
        ),
        DataType::Float64 => ColumnData::Float(array.as_primitive::<Float64Type>().iter().collect()),
        DataType::Utf8 => ColumnData::String(
            array
                .as_string::<i32>()
                .iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        ),
        DataType::LargeUtf8 => ColumnData::String(
            array
                .as_string::<i64>()
                .iter()
                .map(|v| v.map(str::to_string))
                .collect(),
        ),
        DataType::Boolean => ColumnData::Boolean(array.as_boolean().iter().collect()),
        DataType::Timestamp(TimeUnit::Second, _) => timestamps(
            array.as_primitive::<TimestampSecondType>(),
            |secs| chrono::DateTime::from_timestamp(secs, 0),
        )?,
        DataType::Timestamp(TimeUnit::Millisecond, _) => timestamps(
            array.as_primitive::<TimestampMillisecondType>(),
            chrono::DateTime::from_timestamp_millis,
        )?,
        DataType::Timestamp(TimeUnit::Microsecond, _) => timestamps(
            array.as_primitive::<TimestampMicrosecondType>(),
            chrono::DateTime::from_timestamp_micros,
        )?,
        DataType::Timestamp(TimeUnit::Nanosecond, _) => timestamps(
            array.as_primitive::<TimestampNanosecondType>(),
            |nanos| Some(chrono::DateTime::from_timestamp_nanos(nanos)),
        )?,
        DataType::Date32 => timestamps(array.as_primitive::<Date32Type>(), |days| {
            chrono::DateTime::from_timestamp(days.checked_mul(86_400)?, 0)
        })?,
        DataType::Date64 => timestamps(
            array.as_primitive::<Date64Type>(),
            chrono::DateTime::from_timestamp_millis,
        )?,
        DataType::Null => ColumnData::Raw(vec![Value::Null; array.len()]),
        other => {
            return Err(FormatError::invalid_data(format!(
                "unsupported Arrow type {other}"
            )));
        }
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> TabularDataset {
        let dt = chrono::NaiveDate::from_ymd_opt(2023, 11, 2)
            .unwrap()
            .and_hms_milli_opt(8, 15, 0, 250)
            .unwrap();
        TabularDataset::try_new(vec![
            Column::new("id", ColumnData::Integer(vec![Some(1), Some(2), None])),
            Column::new("score", ColumnData::Float(vec![Some(0.5), None, Some(2.0)])),
            Column::new(
                "name",
                ColumnData::String(vec![Some("a".into()), None, Some("c".into())]),
            ),
            Column::new("at", ColumnData::DateTime(vec![Some(dt), None, Some(dt)])),
            Column::new("ok", ColumnData::Boolean(vec![Some(true), Some(false), None])),
        ])
        .unwrap()
    }

    #[test]
    fn test_encode_decode_preserves_types_and_nulls() {
        let ds = sample();
        let bytes = ParquetFormat.encode(&ds, &SaveOptions::default()).unwrap();
        let back = ParquetFormat.decode(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_every_compression_codec_decodes() {
        let ds = sample();
        for codec in [
            ParquetCompression::Snappy,
            ParquetCompression::Zstd,
            ParquetCompression::Gzip,
            ParquetCompression::None,
        ] {
            let options = SaveOptions {
                parquet_compression: codec,
                ..SaveOptions::default()
            };
            let bytes = ParquetFormat.encode(&ds, &options).unwrap();
            let back = ParquetFormat.decode(&bytes, &LoadOptions::default()).unwrap();
            assert_eq!(back.row_count(), 3, "codec {codec:?}");
        }
    }

    #[test]
    fn test_raw_column_written_as_json_text() {
        let ds = TabularDataset::try_new(vec![Column::new(
            "pad",
            ColumnData::Raw(vec![serde_json::json!({"lat": 1}), Value::Null]),
        )])
        .unwrap();
        let bytes = ParquetFormat.encode(&ds, &SaveOptions::default()).unwrap();
        let back = ParquetFormat.decode(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(
            back.column("pad").unwrap().data,
            ColumnData::String(vec![Some(r#"{"lat":1}"#.into()), None])
        );
    }

    #[test]
    fn test_decode_max_rows() {
        let bytes = ParquetFormat.encode(&sample(), &SaveOptions::default()).unwrap();
        let options = LoadOptions {
            max_rows: Some(2),
            ..LoadOptions::default()
        };
        let back = ParquetFormat.decode(&bytes, &options).unwrap();
        assert_eq!(back.row_count(), 2);
    }

    #[test]
    fn test_datetime_outside_nanosecond_range_is_rejected() {
        let at = |year| {
            chrono::NaiveDate::from_ymd_opt(year, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let ds = TabularDataset::try_new(vec![Column::new(
            "founded",
            ColumnData::DateTime(vec![Some(at(2000)), None, Some(at(1500))]),
        )])
        .unwrap();

        let err = ParquetFormat
            .encode(&ds, &SaveOptions::default())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'founded'"), "{message}");
        assert!(message.contains("row 2"), "{message}");

        let edge = TabularDataset::try_new(vec![Column::new(
            "founded",
            ColumnData::DateTime(vec![Some(at(1678)), Some(at(2262))]),
        )])
        .unwrap();
        let bytes = ParquetFormat.encode(&edge, &SaveOptions::default()).unwrap();
        assert_eq!(ParquetFormat.decode(&bytes, &LoadOptions::default()).unwrap(), edge);
    }

    #[test]
    fn test_decode_microsecond_timestamps_beyond_nanosecond_range() {
        use arrow_array::TimestampMicrosecondArray;
        let old = chrono::NaiveDate::from_ymd_opt(1500, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new(
            "at",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        )]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(TimestampMicrosecondArray::from(vec![
                Some(old.and_utc().timestamp_micros()),
                None,
            ]))],
        )
        .unwrap();
        let mut bytes = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut bytes, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let back = ParquetFormat.decode(&bytes, &LoadOptions::default()).unwrap();
        assert_eq!(
            back.column("at").unwrap().data,
            ColumnData::DateTime(vec![Some(old), None])
        );
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            ParquetFormat.decode(b"not parquet", &LoadOptions::default()),
            Err(FormatError::Parquet(_))
        ));
    }

    #[test]
    fn test_decode_narrow_arrow_types() {
        use arrow_array::{Float32Array, Int32Array};
        let schema = Arc::new(Schema::new(vec![
            Field::new("small", DataType::Int32, true),
            Field::new("ratio", DataType::Float32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![Some(4), None])),
                Arc::new(Float32Array::from(vec![Some(0.5), Some(1.5)])),
            ],
        )
        .unwrap();
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = ParquetFormat.decode(&buf, &LoadOptions::default()).unwrap();
        assert_eq!(
            ds.column("small").unwrap().data,
            ColumnData::Integer(vec![Some(4), None])
        );
        assert_eq!(
            ds.column("ratio").unwrap().data,
            ColumnData::Float(vec![Some(0.5), Some(1.5)])
        );
    }
}
