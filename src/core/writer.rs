use crate::core::normalize::normalize;
use crate::domain::array::NdArray;
use crate::domain::model::{Dataset, Normalized, Object};
use crate::domain::ports::ContainerWriter;
use crate::utils::error::{error_chain, ConvertError, Result};
use std::collections::HashSet;
use std::path::Path;

/// Dataset name used when the record is not a mapping.
pub const DEFAULT_DATASET_KEY: &str = "data";

/// Lays a record out as named datasets.
///
/// A mapping yields one dataset per key. A bare array is stored as-is under
/// [`DEFAULT_DATASET_KEY`]; anything else is normalized and stored there too.
pub fn build_datasets(record: &Object) -> Result<Vec<Dataset>> {
    match record {
        Object::Mapping(entries) => {
            // Distinct keys such as 1 and "1" share the same text.
            let mut seen = HashSet::with_capacity(entries.len());
            let mut datasets = Vec::with_capacity(entries.len());
            for (name, value) in entries {
                if !seen.insert(name.as_str()) {
                    return Err(ConvertError::DuplicateDatasetError { name: name.clone() });
                }
                let array = match normalize(value) {
                    Normalized::Array(array) => array,
                    other => NdArray::from_normalized(&other).map_err(|source| {
                        ConvertError::DatasetError {
                            name: name.clone(),
                            source,
                        }
                    })?,
                };
                datasets.push(Dataset::new(name.clone(), array));
            }
            Ok(datasets)
        }
        Object::Array(array) => Ok(vec![Dataset::new(DEFAULT_DATASET_KEY, array.clone())]),
        other => {
            let array = NdArray::from_normalized(&normalize(other))?;
            Ok(vec![Dataset::new(DEFAULT_DATASET_KEY, array)])
        }
    }
}

/// Normalizes `record` and writes it to `destination`, returning the number
/// of datasets stored.
pub fn try_write_record<W: ContainerWriter>(
    writer: &W,
    record: &Object,
    destination: &Path,
) -> Result<usize> {
    let datasets = build_datasets(record)?;
    for dataset in &datasets {
        tracing::debug!(
            dataset = %dataset.name,
            dtype = dataset.array.data().type_name(),
            shape = ?dataset.array.shape(),
            "prepared dataset"
        );
    }
    writer.write(&datasets, destination)?;
    Ok(datasets.len())
}

/// Like [`try_write_record`], but reports the outcome on stdout and returns
/// whether it succeeded. An existing file at `destination` is overwritten.
pub fn write_record<W: ContainerWriter>(writer: &W, record: &Object, destination: &Path) -> bool {
    match try_write_record(writer, record, destination) {
        Ok(count) => {
            tracing::debug!(datasets = count, path = %destination.display(), "container written");
            println!("Successfully saved container file: {}", destination.display());
            true
        }
        Err(e) => {
            println!(
                "Error saving container file {}: {}",
                destination.display(),
                error_chain(&e)
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::array::ArrayData;
    use crate::domain::model::{Opaque, Scalar};
    use std::cell::RefCell;
    use std::path::PathBuf;

    #[derive(Default)]
    struct MockWriter {
        written: RefCell<Vec<(PathBuf, Vec<Dataset>)>>,
        fail: bool,
    }

    impl ContainerWriter for MockWriter {
        fn extension(&self) -> &str {
            "mock"
        }

        fn write(&self, datasets: &[Dataset], destination: &Path) -> Result<()> {
            if self.fail {
                return Err(ConvertError::IoError(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )));
            }
            self.written
                .borrow_mut()
                .push((destination.to_path_buf(), datasets.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn test_mapping_yields_one_dataset_per_key() {
        let record = Object::Mapping(vec![
            (
                "a".to_string(),
                Object::Sequence(vec![1i64.into(), 2i64.into(), 3i64.into()]),
            ),
            ("b".to_string(), "hello".into()),
        ]);

        let datasets = build_datasets(&record).unwrap();

        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].name, "a");
        assert_eq!(datasets[0].array.shape(), &[3]);
        assert_eq!(datasets[0].array.data(), &ArrayData::Int(vec![1, 2, 3]));
        assert_eq!(datasets[1].name, "b");
        assert_eq!(datasets[1].array.shape(), &[1]);
        assert_eq!(
            datasets[1].array.data(),
            &ArrayData::Str(vec!["hello".to_string()])
        );
    }

    #[test]
    fn test_array_value_is_stored_verbatim() {
        let grid = NdArray::new(vec![2, 2], ArrayData::Float(vec![0.0, 1.0, 2.0, 3.0])).unwrap();
        let record = Object::Mapping(vec![("grid".to_string(), Object::Array(grid.clone()))]);

        let datasets = build_datasets(&record).unwrap();
        assert_eq!(datasets, vec![Dataset::new("grid", grid)]);
    }

    #[test]
    fn test_bare_array_uses_default_key() {
        let array = NdArray::vector(ArrayData::Bool(vec![true, false]));
        let datasets = build_datasets(&Object::Array(array.clone())).unwrap();
        assert_eq!(datasets, vec![Dataset::new(DEFAULT_DATASET_KEY, array)]);
    }

    #[test]
    fn test_other_record_is_wrapped_under_default_key() {
        let record = Object::Other(Opaque::new("NoneType", "None"));
        let datasets = build_datasets(&record).unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].name, DEFAULT_DATASET_KEY);
        assert_eq!(
            datasets[0].array.data(),
            &ArrayData::Str(vec!["None".to_string()])
        );
    }

    #[test]
    fn test_custom_object_value_is_stored_as_text() {
        let record = Object::Mapping(vec![(
            "model".to_string(),
            Object::Other(Opaque::new("Model", "<Model object>")),
        )]);
        let datasets = build_datasets(&record).unwrap();
        assert_eq!(
            datasets[0].array.data(),
            &ArrayData::Str(vec!["<Model object>".to_string()])
        );
    }

    #[test]
    fn test_nested_mapping_value_fails_with_key() {
        let record = Object::Mapping(vec![(
            "meta".to_string(),
            Object::Mapping(vec![("x".to_string(), 1i64.into())]),
        )]);
        let err = build_datasets(&record).unwrap_err();
        assert!(matches!(err, ConvertError::DatasetError { ref name, .. } if name == "meta"));
    }

    #[test]
    fn test_keys_with_the_same_text_are_rejected() {
        // {1: [1], "1": [2]} after key conversion
        let record = Object::Mapping(vec![
            ("1".to_string(), Object::Sequence(vec![1i64.into()])),
            ("ok".to_string(), 3i64.into()),
            ("1".to_string(), Object::Sequence(vec![2i64.into()])),
        ]);

        let err = build_datasets(&record).unwrap_err();
        assert!(matches!(err, ConvertError::DuplicateDatasetError { ref name } if name == "1"));
        assert!(err.to_string().contains("'1'"));

        let writer = MockWriter::default();
        assert!(!write_record(&writer, &record, Path::new("dup.mock")));
        assert!(writer.written.borrow().is_empty());
    }

    #[test]
    fn test_write_record_reports_success() {
        let writer = MockWriter::default();
        let record = Object::Scalar(Scalar::Int(9));

        assert!(write_record(&writer, &record, Path::new("out/one.mock")));
        let written = writer.written.borrow();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, PathBuf::from("out/one.mock"));
        assert_eq!(written[0].1[0].array.data(), &ArrayData::Int(vec![9]));
    }

    #[test]
    fn test_write_record_reports_failure() {
        let writer = MockWriter {
            fail: true,
            ..Default::default()
        };
        assert!(!write_record(&writer, &Object::from(1i64), Path::new("x.mock")));

        let ragged = Object::Sequence(vec![
            Object::Sequence(vec![1i64.into()]),
            Object::Sequence(vec![]),
        ]);
        let ok_writer = MockWriter::default();
        assert!(!write_record(&ok_writer, &ragged, Path::new("y.mock")));
        assert!(ok_writer.written.borrow().is_empty());
    }
}
