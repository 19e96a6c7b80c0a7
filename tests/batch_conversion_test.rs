use pkl_convert::domain::array::ArrayData;
use pkl_convert::{
    BatchConverter, BatchSummary, ConversionEngine, NpzReader, NpzWriter, PickleDecoder,
    TomlConfig,
};
use serde_pickle::{HashableValue, SerOptions, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn dict(entries: Vec<(&str, Value)>) -> Value {
    Value::Dict(
        entries
            .into_iter()
            .map(|(k, v)| (HashableValue::String(k.to_string()), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn write_pickle(dir: &Path, name: &str, value: &Value) {
    let bytes = serde_pickle::value_to_vec(value, SerOptions::new()).unwrap();
    fs::write(dir.join(name), bytes).unwrap();
}

fn sample_record() -> Value {
    dict(vec![
        (
            "a",
            Value::List(vec![Value::I64(1), Value::I64(2), Value::I64(3)]),
        ),
        ("b", Value::String("hello".to_string())),
    ])
}

// Hand-assembled protocol 3 opcodes, for objects serde-pickle cannot write.
fn unicode(out: &mut Vec<u8>, s: &str) {
    out.push(b'X');
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn raw_pickle(record: Vec<u8>) -> Vec<u8> {
    let mut out = b"\x80\x03".to_vec();
    out.extend(record);
    out.push(b'.');
    out
}

// {key: value, ...} where each value is an opcode fragment.
fn raw_dict(entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let mut out = b"}(".to_vec();
    for (key, value) in entries {
        unicode(&mut out, key);
        out.extend(value);
    }
    out.extend_from_slice(b"u");
    out
}

fn raw_int_list(values: &[u8]) -> Vec<u8> {
    let mut out = b"](".to_vec();
    for &v in values {
        out.extend_from_slice(&[b'K', v]);
    }
    out.push(b'e');
    out
}

// numpy.core.multiarray._reconstruct(ndarray, (0,), b'b') with its BUILD state.
fn raw_ndarray(shape: &[u8], code: &str, raw: &[u8]) -> Vec<u8> {
    let mut out = b"cnumpy.core.multiarray\n_reconstruct\ncnumpy\nndarray\n".to_vec();
    out.extend_from_slice(b"K\x00\x85C\x01b\x87R(K\x01(");
    for &dim in shape {
        out.extend_from_slice(&[b'K', dim]);
    }
    out.extend_from_slice(b"tcnumpy\ndtype\n");
    unicode(&mut out, code);
    out.extend_from_slice(b"\x89\x88\x87R(K\x03");
    unicode(&mut out, "<");
    out.extend_from_slice(b"NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00tb\x89B");
    out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
    out.extend_from_slice(raw);
    out.extend_from_slice(b"tb");
    out
}

fn converter() -> BatchConverter<PickleDecoder, NpzWriter> {
    BatchConverter::new(PickleDecoder::new(), NpzWriter::new())
}

#[test]
fn test_mapping_round_trips_by_shape() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_pickle(input.path(), "sample.pkl", &sample_record());

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.succeeded, 1);

    let mut reader = NpzReader::open(output.path().join("sample.npz")).unwrap();
    assert_eq!(reader.dataset_names(), &["a", "b"]);

    let a = reader.read("a").unwrap();
    assert_eq!(a.shape(), &[3]);
    assert_eq!(a.data(), &ArrayData::Int(vec![1, 2, 3]));

    let b = reader.read("b").unwrap();
    assert_eq!(b.shape(), &[1]);
    assert_eq!(b.data(), &ArrayData::Str(vec!["hello".to_string()]));
}

#[test]
fn test_corrupt_file_is_isolated() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_pickle(input.path(), "first.pkl", &sample_record());
    write_pickle(
        input.path(),
        "second.pkl",
        &Value::List(vec![Value::F64(0.5), Value::F64(1.5)]),
    );
    fs::write(input.path().join("broken.pkl"), b"\x80\x04truncated").unwrap();

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert!(output.path().join("first.npz").exists());
    assert!(output.path().join("second.npz").exists());
    assert!(!output.path().join("broken.npz").exists());
}

#[test]
fn test_empty_input_directory() {
    let input = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let output = root.path().join("nested").join("npz");
    fs::write(input.path().join("readme.txt"), "not a pickle").unwrap();

    let summary = converter().convert_all(input.path(), &output).unwrap();

    assert_eq!(summary, BatchSummary::default());
    assert!(output.is_dir());
    assert_eq!(fs::read_dir(&output).unwrap().count(), 0);
}

#[test]
fn test_second_run_skips_everything() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    for name in ["x.pkl", "y.pkl"] {
        write_pickle(input.path(), name, &sample_record());
    }

    let first = converter()
        .convert_all(input.path(), output.path())
        .unwrap();
    assert_eq!(first.succeeded, 2);
    let before = fs::read(output.path().join("x.npz")).unwrap();
    let modified = fs::metadata(output.path().join("x.npz"))
        .unwrap()
        .modified()
        .unwrap();

    let second = converter()
        .convert_all(input.path(), output.path())
        .unwrap();

    assert_eq!(
        second,
        BatchSummary {
            total: 2,
            succeeded: 0,
            failed: 0,
            skipped: 2
        }
    );
    assert_eq!(fs::read(output.path().join("x.npz")).unwrap(), before);
    assert_eq!(
        fs::metadata(output.path().join("x.npz"))
            .unwrap()
            .modified()
            .unwrap(),
        modified
    );
    assert_eq!(fs::read_dir(output.path()).unwrap().count(), 2);
}

#[test]
fn test_non_primitive_values_are_stored_as_text() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let record = dict(vec![
        (
            "labels",
            Value::Set(BTreeSet::from([HashableValue::I64(1), HashableValue::I64(2)])),
        ),
        ("missing", Value::None),
        (
            "pairs",
            Value::List(vec![
                Value::Tuple(vec![Value::I64(0), Value::I64(1)]),
                Value::Tuple(vec![Value::I64(2), Value::I64(3)]),
            ]),
        ),
    ]);
    write_pickle(input.path(), "objects.pkl", &record);

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.succeeded, 1);

    let mut reader = NpzReader::open(output.path().join("objects.npz")).unwrap();
    assert_eq!(
        reader.read("labels").unwrap().data(),
        &ArrayData::Str(vec!["{1, 2}".to_string()])
    );
    assert_eq!(
        reader.read("missing").unwrap().data(),
        &ArrayData::Str(vec!["None".to_string()])
    );
    let pairs = reader.read("pairs").unwrap();
    assert_eq!(pairs.shape(), &[2]);
    assert_eq!(
        pairs.data(),
        &ArrayData::Str(vec!["(0, 1)".to_string(), "(2, 3)".to_string()])
    );
}

#[test]
fn test_non_mapping_record_uses_data_key() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let matrix = Value::List(vec![
        Value::List(vec![Value::I64(1), Value::I64(2)]),
        Value::List(vec![Value::I64(3), Value::I64(4)]),
    ]);
    write_pickle(input.path(), "matrix.pkl", &matrix);

    converter()
        .convert_all(input.path(), output.path())
        .unwrap();

    let mut reader = NpzReader::open(output.path().join("matrix.npz")).unwrap();
    assert_eq!(reader.dataset_names(), &["data"]);
    let data = reader.read("data").unwrap();
    assert_eq!(data.shape(), &[2, 2]);
    assert_eq!(data.data(), &ArrayData::Int(vec![1, 2, 3, 4]));
}

#[test]
fn test_unstorable_record_counts_as_failure() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let nested = dict(vec![("meta", dict(vec![("run", Value::I64(1))]))]);
    write_pickle(input.path(), "nested.pkl", &nested);
    write_pickle(input.path(), "fine.pkl", &sample_record());

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
}

#[test]
fn test_engine_runs_from_toml_config() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("raw");
    let output = root.path().join("npz");
    fs::create_dir(&input).unwrap();
    write_pickle(&input, "run.pickle", &sample_record());
    write_pickle(&input, "ignored.pkl", &sample_record());

    let toml_content = format!(
        r#"
[paths]
input_dir = "{}"
output_dir = "{}"

[source]
extension = "pickle"
"#,
        input.display().to_string().replace('\\', "/"),
        output.display().to_string().replace('\\', "/")
    );
    let config = TomlConfig::from_toml_str(&toml_content).unwrap();
    let engine = ConversionEngine::new(config);

    let planned = engine.dry_run().unwrap();
    assert_eq!(planned.len(), 1);
    assert!(!output.exists());

    let summary = engine.run().unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(output.join("run.npz").exists());
    assert!(!output.join("ignored.npz").exists());
}

#[test]
fn test_custom_object_value_is_stored_as_text() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    // {"a": [1, 2, 3], "model": Model() with state {"name": "cnn"}}
    let mut model = b"c__main__\nModel\n)\x81}".to_vec();
    unicode(&mut model, "name");
    unicode(&mut model, "cnn");
    model.extend_from_slice(b"sb");
    let record = raw_dict(vec![("a", raw_int_list(&[1, 2, 3])), ("model", model)]);
    fs::write(input.path().join("model.pkl"), raw_pickle(record)).unwrap();

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);

    let mut reader = NpzReader::open(output.path().join("model.npz")).unwrap();
    assert_eq!(
        reader.read("a").unwrap().data(),
        &ArrayData::Int(vec![1, 2, 3])
    );
    let model = reader.read("model").unwrap();
    assert_eq!(model.shape(), &[1]);
    assert_eq!(
        model.data(),
        &ArrayData::Str(vec!["<__main__.Model object>".to_string()])
    );
}

#[test]
fn test_pickled_ndarray_is_stored_verbatim() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let grid: Vec<u8> = (0..6).flat_map(|i| (i as f64 * 1.5).to_le_bytes()).collect();
    let labels: Vec<u8> = [7i64, -1].iter().flat_map(|v| v.to_le_bytes()).collect();
    let record = raw_dict(vec![
        ("grid", raw_ndarray(&[2, 3], "f8", &grid)),
        ("labels", raw_ndarray(&[2], "i8", &labels)),
    ]);
    fs::write(input.path().join("arrays.pkl"), raw_pickle(record)).unwrap();
    // A bare array as the whole record.
    fs::write(
        input.path().join("bare.pkl"),
        raw_pickle(raw_ndarray(&[3], "b1", &[1, 0, 1])),
    )
    .unwrap();

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.succeeded, 2);

    let mut reader = NpzReader::open(output.path().join("arrays.npz")).unwrap();
    let grid = reader.read("grid").unwrap();
    assert_eq!(grid.shape(), &[2, 3]);
    assert_eq!(
        grid.data(),
        &ArrayData::Float(vec![0.0, 1.5, 3.0, 4.5, 6.0, 7.5])
    );
    let labels = reader.read("labels").unwrap();
    assert_eq!(labels.shape(), &[2]);
    assert_eq!(labels.data(), &ArrayData::Int(vec![7, -1]));

    let mut reader = NpzReader::open(output.path().join("bare.npz")).unwrap();
    assert_eq!(reader.dataset_names(), &["data"]);
    assert_eq!(
        reader.read("data").unwrap().data(),
        &ArrayData::Bool(vec![true, false, true])
    );
}

#[test]
fn test_stdlib_objects_convert_alongside_plain_records() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_pickle(input.path(), "plain.pkl", &sample_record());

    // {"a": [1, 2, 3], "when": datetime.date(2024, 1, 2)}
    let date = b"cdatetime\ndate\nC\x04\x07\xe8\x01\x02\x85R".to_vec();
    let record = raw_dict(vec![("a", raw_int_list(&[1, 2, 3])), ("when", date)]);
    fs::write(input.path().join("dt.pkl"), raw_pickle(record)).unwrap();

    // OrderedDict(a=[1, 2, 3], x=1)
    let mut ordered = b"ccollections\nOrderedDict\n)R(".to_vec();
    unicode(&mut ordered, "a");
    ordered.extend(raw_int_list(&[1, 2, 3]));
    unicode(&mut ordered, "x");
    ordered.extend_from_slice(b"K\x01u");
    fs::write(input.path().join("od.pkl"), raw_pickle(ordered)).unwrap();

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();
    assert_eq!(
        summary,
        BatchSummary {
            total: 3,
            succeeded: 3,
            failed: 0,
            skipped: 0
        }
    );

    let mut reader = NpzReader::open(output.path().join("dt.npz")).unwrap();
    assert_eq!(
        reader.read("when").unwrap().data(),
        &ArrayData::Str(vec!["2024-01-02".to_string()])
    );

    let mut reader = NpzReader::open(output.path().join("od.npz")).unwrap();
    assert_eq!(reader.dataset_names(), &["a", "x"]);
    assert_eq!(reader.read("x").unwrap().data(), &ArrayData::Int(vec![1]));
}

#[test]
fn test_colliding_key_text_fails_the_file() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    // {1: [1], "1": [2]}
    let mut record = b"}(K\x01".to_vec();
    record.extend(raw_int_list(&[1]));
    unicode(&mut record, "1");
    record.extend(raw_int_list(&[2]));
    record.push(b'u');
    fs::write(input.path().join("dup.pkl"), raw_pickle(record)).unwrap();
    write_pickle(input.path(), "fine.pkl", &sample_record());

    let summary = converter()
        .convert_all(input.path(), output.path())
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!output.path().join("dup.npz").exists());
}
