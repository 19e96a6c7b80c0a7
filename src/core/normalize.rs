use crate::domain::model::{Normalized, Object, Scalar};

/// Recursively maps an object graph onto storable values.
///
/// Scalars and arrays pass through untouched (arrays are not inspected).
/// Sequences and mappings are rebuilt element by element, keeping order,
/// length and keys. Anything else is replaced by its string form; that
/// step cannot be undone.
pub fn normalize(value: &Object) -> Normalized {
    match value {
        Object::Scalar(scalar) => Normalized::Scalar(scalar.clone()),
        Object::Array(array) => Normalized::Array(array.clone()),
        Object::Sequence(items) => Normalized::Sequence(items.iter().map(normalize).collect()),
        Object::Mapping(entries) => Normalized::Mapping(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), normalize(value)))
                .collect(),
        ),
        Object::Other(opaque) => {
            tracing::trace!(type_name = %opaque.type_name, "coercing value to its string form");
            Normalized::Scalar(Scalar::Str(opaque.to_string()))
        }
    }
}
