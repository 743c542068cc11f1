//! Metadata row projection.
//!
//! Each entity exposes a fixed list of fields for metadata rows. Rows are
//! keyed `Entity.field` so projections of several entities can be merged
//! into one record without collisions.

use crate::frame::{Cell, Record};

use super::{EntityGraph, SchemaResult};

/// Project `record` (a raw row of `entity`) onto the entity's metadata fields.
///
/// Entities without an explicit projection fall back to their declared
/// attributes. Missing and null fields are left out of the row.
pub fn project_metadata_row(
    graph: &EntityGraph,
    entity: &str,
    record: &Record,
) -> SchemaResult<Record> {
    let fields = metadata_fields(graph, entity)?;

    let mut row = Record::new();
    for field in fields {
        match record.get(&field) {
            Some(Cell::Null) | None => {}
            Some(value) => {
                row.insert(format!("{}.{}", entity, field), value.clone());
            }
        }
    }
    Ok(row)
}

/// Merge the projections of several `(entity, record)` pairs into one row.
pub fn project_metadata_rows<'a>(
    graph: &EntityGraph,
    parts: impl IntoIterator<Item = (&'a str, &'a Record)>,
) -> SchemaResult<Record> {
    let mut row = Record::new();
    for (entity, record) in parts {
        row.extend(project_metadata_row(graph, entity, record)?);
    }
    Ok(row)
}

/// The field names `entity` exposes in metadata rows.
pub fn metadata_fields(graph: &EntityGraph, entity: &str) -> SchemaResult<Vec<String>> {
    let ent = graph.entity(entity)?;
    Ok(match graph.projection(entity) {
        Some(fields) => fields.to_vec(),
        None => ent.attributes.iter().map(|a| a.name.clone()).collect(),
    })
}
