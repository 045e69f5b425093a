//! Additive schema merging.
//!
//! Existing columns are never removed or retyped. Columns only present in
//! the incoming schema are appended as nullable, recursively inside structs
//! (including structs nested in lists).

use arrow_schema::{DataType, Field, FieldRef, Fields, Schema};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of merging an incoming schema into an existing one.
#[derive(Debug, Clone)]
pub struct SchemaMerge {
    pub schema: Schema,
    /// Dotted paths of appended fields.
    pub added: Vec<String>,
    /// Dotted paths whose incoming type differs from the kept existing type.
    pub conflicts: Vec<String>,
}

impl SchemaMerge {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty()
    }
}

/// Merge `incoming` into `existing` without dropping or retyping anything.
pub fn merge_schemas(existing: &Schema, incoming: &Schema) -> SchemaMerge {
    let mut added = Vec::new();
    let mut conflicts = Vec::new();
    let fields = merge_fields(
        existing.fields(),
        incoming.fields(),
        "",
        &mut added,
        &mut conflicts,
    );

    SchemaMerge {
        schema: Schema::new_with_metadata(fields, existing.metadata().clone()),
        added,
        conflicts,
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn merge_fields(
    existing: &Fields,
    incoming: &Fields,
    prefix: &str,
    added: &mut Vec<String>,
    conflicts: &mut Vec<String>,
) -> Fields {
    let incoming_by_name: HashMap<&str, &FieldRef> =
        incoming.iter().map(|f| (f.name().as_str(), f)).collect();

    let mut merged: Vec<FieldRef> = existing
        .iter()
        .map(|field| match incoming_by_name.get(field.name().as_str()) {
            Some(other) => Arc::new(merge_field(field, other, prefix, added, conflicts)),
            None => Arc::clone(field),
        })
        .collect();

    for field in incoming.iter() {
        if existing.find(field.name()).is_none() {
            added.push(join(prefix, field.name()));
            merged.push(Arc::new(field.as_ref().clone().with_nullable(true)));
        }
    }

    Fields::from(merged)
}

fn merge_field(
    existing: &Field,
    incoming: &Field,
    prefix: &str,
    added: &mut Vec<String>,
    conflicts: &mut Vec<String>,
) -> Field {
    let path = join(prefix, existing.name());
    let data_type = match (existing.data_type(), incoming.data_type()) {
        (DataType::Struct(a), DataType::Struct(b)) => {
            DataType::Struct(merge_fields(a, b, &path, added, conflicts))
        }
        (DataType::List(a), DataType::List(b)) => {
            DataType::List(Arc::new(merge_field(a, b, &path, added, conflicts)))
        }
        (DataType::LargeList(a), DataType::LargeList(b)) => {
            DataType::LargeList(Arc::new(merge_field(a, b, &path, added, conflicts)))
        }
        (a, b) => {
            if a != b {
                conflicts.push(path);
            }
            a.clone()
        }
    };
    existing.clone().with_data_type(data_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, data_type: DataType) -> Field {
        Field::new(name, data_type, true)
    }

    fn strukt(fields: Vec<Field>) -> DataType {
        DataType::Struct(Fields::from(fields))
    }

    fn assert_preserves(existing: &Schema, merged: &Schema) {
        for (i, field) in existing.fields().iter().enumerate() {
            let kept = merged.field(i);
            assert_eq!(kept.name(), field.name());
            if !matches!(field.data_type(), DataType::Struct(_) | DataType::List(_)) {
                assert_eq!(kept.data_type(), field.data_type());
            }
        }
    }

    #[test]
    fn test_identical_schemas_are_unchanged() {
        let schema = Schema::new(vec![field("a", DataType::Utf8)]);
        let merge = merge_schemas(&schema, &schema);
        assert!(merge.is_unchanged());
        assert_eq!(merge.schema, schema);
    }

    #[test]
    fn test_new_fields_are_appended() {
        let existing = Schema::new(vec![field("b", DataType::Utf8), field("d", DataType::Int64)]);
        let incoming = Schema::new(vec![
            field("a", DataType::Boolean),
            field("b", DataType::Utf8),
            Field::new("c", DataType::Float64, false),
        ]);

        let merge = merge_schemas(&existing, &incoming);
        let names: Vec<_> = merge.schema.fields().iter().map(|f| f.name().as_str()).collect();

        assert_eq!(names, vec!["b", "d", "a", "c"]);
        assert_eq!(merge.added, vec!["a", "c"]);
        assert!(merge.schema.field(3).is_nullable());
        assert_preserves(&existing, &merge.schema);
    }

    #[test]
    fn test_existing_fields_are_never_dropped_or_retyped() {
        let existing = Schema::new(vec![
            field("n", DataType::Int64),
            field("gone", DataType::Utf8),
        ]);
        let incoming = Schema::new(vec![field("n", DataType::Utf8)]);

        let merge = merge_schemas(&existing, &incoming);

        assert!(merge.is_unchanged());
        assert_eq!(merge.conflicts, vec!["n"]);
        assert_eq!(merge.schema, existing);
    }

    #[test]
    fn test_struct_fields_merge_recursively() {
        let existing = Schema::new(vec![field(
            "data",
            strukt(vec![
                field("a", DataType::Utf8),
                field("inner", strukt(vec![field("x", DataType::Int64)])),
            ]),
        )]);
        let incoming = Schema::new(vec![field(
            "data",
            strukt(vec![
                field("b", DataType::Boolean),
                field(
                    "inner",
                    strukt(vec![field("x", DataType::Float64), field("y", DataType::Utf8)]),
                ),
            ]),
        )]);

        let merge = merge_schemas(&existing, &incoming);

        assert_eq!(merge.added, vec!["data.inner.y", "data.b"]);
        assert_eq!(merge.conflicts, vec!["data.inner.x"]);
        let expected = Schema::new(vec![field(
            "data",
            strukt(vec![
                field("a", DataType::Utf8),
                field(
                    "inner",
                    strukt(vec![field("x", DataType::Int64), field("y", DataType::Utf8)]),
                ),
                field("b", DataType::Boolean),
            ]),
        )]);
        assert_eq!(merge.schema, expected);
    }

    #[test]
    fn test_list_of_structs_merges_items() {
        let item = |fields| Arc::new(Field::new("item", strukt(fields), true));
        let existing = Schema::new(vec![field(
            "l",
            DataType::List(item(vec![field("a", DataType::Utf8)])),
        )]);
        let incoming = Schema::new(vec![field(
            "l",
            DataType::List(item(vec![field("b", DataType::Utf8)])),
        )]);

        let merge = merge_schemas(&existing, &incoming);
        assert_eq!(merge.added, vec!["l.item.b"]);
    }
}
