//! Entity graph - the static description of the relational schema queries run against.
//!
//! An [`EntityGraph`] holds:
//! - entities and their typed attributes
//! - foreign-key relations, keyed by unordered model pair
//! - the join-route table, indexed by (output model, target model)
//! - the parent-model map for virtual output models
//! - the field projection table used to build metadata rows
//!
//! The built-in metabolomics schema lives in [`phenomedb`].
//!
//! Submodules:
//! - `routes`: join resolution and route derivation/validation
//! - `projection`: metadata row projection

mod error;
pub mod phenomedb;
pub mod projection;
mod routes;

use std::collections::{BTreeMap, HashMap, HashSet};

use inflector::Inflector;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

pub use error::{SchemaError, SchemaResult};
pub use routes::RouteIssue;

/// Type of a declared attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Number,
    DateTime,
    Enum,
    Bool,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::String => "string",
            AttributeKind::Number => "number",
            AttributeKind::DateTime => "datetime",
            AttributeKind::Enum => "enum",
            AttributeKind::Bool => "bool",
        }
    }

    /// Whether values of this kind can be compared with `<`, `>` and BETWEEN.
    pub fn is_orderable(&self) -> bool {
        matches!(
            self,
            AttributeKind::Number | AttributeKind::DateTime | AttributeKind::String
        )
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed attribute usable in matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

/// A named relational model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub name: String,
    /// Physical table name. Defaults to the snake_case form of the name.
    pub table: String,
    pub attributes: Vec<Attribute>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let table = name.to_snake_case();
        Self {
            name,
            table,
            attributes: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Declare an attribute.
    pub fn attr(mut self, name: &str, kind: AttributeKind) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// One side of a relation: `Entity.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub entity: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(entity: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.entity, self.column)
    }
}

/// A foreign-key edge, rendered as `lhs == rhs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Relation {
    pub lhs: ColumnRef,
    pub rhs: ColumnRef,
}

impl Relation {
    pub fn new(lhs: ColumnRef, rhs: ColumnRef) -> Self {
        Self { lhs, rhs }
    }

    pub fn involves(&self, entity: &str) -> bool {
        self.lhs.entity == entity || self.rhs.entity == entity
    }

    /// The entity on the other side of `entity`, if `entity` takes part.
    pub fn other(&self, entity: &str) -> Option<&str> {
        if self.lhs.entity == entity {
            Some(&self.rhs.entity)
        } else if self.rhs.entity == entity {
            Some(&self.lhs.entity)
        } else {
            None
        }
    }

    fn key(&self) -> (String, String) {
        pair_key(&self.lhs.entity, &self.rhs.entity)
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=={}", self.lhs, self.rhs)
    }
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// The static entity/relationship graph.
#[derive(Debug, Clone)]
pub struct EntityGraph {
    entities: BTreeMap<String, Entity>,
    relations: HashMap<(String, String), Relation>,
    routes: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    parents: HashMap<String, String>,
    projections: BTreeMap<String, Vec<String>>,
    graph: UnGraph<String, Relation>,
    node_indices: HashMap<String, NodeIndex>,
}

impl EntityGraph {
    pub fn builder() -> EntityGraphBuilder {
        EntityGraphBuilder::default()
    }

    pub fn entity(&self, name: &str) -> SchemaResult<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| SchemaError::UnknownEntity(name.into()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Look up the relation between two models, in either direction.
    pub fn relation(&self, a: &str, b: &str) -> Option<&Relation> {
        self.relations.get(&pair_key(a, b))
    }

    /// All relations, in a stable order.
    pub fn relations(&self) -> Vec<&Relation> {
        let mut all: Vec<&Relation> = self.relations.values().collect();
        all.sort_by_key(|r| r.key());
        all
    }

    /// Relations touching `entity`, in a stable order.
    pub fn relations_involving(&self, entity: &str) -> Vec<&Relation> {
        self.relations()
            .into_iter()
            .filter(|r| r.involves(entity))
            .collect()
    }

    /// Models that have a route table of their own.
    pub fn output_models(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Whether `model` can be requested as a query output.
    pub fn is_output_model(&self, model: &str) -> bool {
        self.routes.contains_key(model) || self.parents.contains_key(model)
    }

    /// The model a query for `model` is compiled against.
    ///
    /// Virtual output models map to their base model; everything else maps to itself.
    pub fn parent_model<'a>(&'a self, model: &'a str) -> &'a str {
        self.parents.get(model).map(String::as_str).unwrap_or(model)
    }

    /// The canonical join route from `output` to `target`.
    pub fn route(&self, output: &str, target: &str) -> SchemaResult<&[String]> {
        let table = self
            .routes
            .get(output)
            .ok_or_else(|| SchemaError::UnknownOutputModel(output.into()))?;
        if output == target {
            return Ok(&[]);
        }
        table
            .get(target)
            .map(Vec::as_slice)
            .ok_or_else(|| SchemaError::MissingRoute {
                output: output.into(),
                target: target.into(),
            })
    }

    /// The route table of one output model.
    pub fn routes_from(&self, output: &str) -> SchemaResult<&BTreeMap<String, Vec<String>>> {
        self.routes
            .get(output)
            .ok_or_else(|| SchemaError::UnknownOutputModel(output.into()))
    }

    /// Check that `property` may be used in a match on `entity`.
    ///
    /// Returns the attribute kind when known. Entities without declared
    /// attributes accept any property. `id` and foreign-key columns are
    /// always accepted as numbers.
    pub fn attribute_kind(
        &self,
        entity: &str,
        property: &str,
    ) -> SchemaResult<Option<AttributeKind>> {
        let ent = self.entity(entity)?;
        if let Some(attr) = ent.attribute(property) {
            return Ok(Some(attr.kind));
        }
        if property == "id" || self.is_key_column(entity, property) {
            return Ok(Some(AttributeKind::Number));
        }
        if ent.attributes.is_empty() {
            return Ok(None);
        }
        Err(SchemaError::UnknownAttribute {
            entity: entity.into(),
            attribute: property.into(),
        })
    }

    fn is_key_column(&self, entity: &str, column: &str) -> bool {
        self.relations.values().any(|r| {
            (r.lhs.entity == entity && r.lhs.column == column)
                || (r.rhs.entity == entity && r.rhs.column == column)
        })
    }

    /// Fields exposed for metadata rows of `entity`.
    pub fn projection(&self, entity: &str) -> Option<&[String]> {
        self.projections.get(entity).map(Vec::as_slice)
    }
}

/// Builder for [`EntityGraph`].
#[derive(Debug, Default)]
pub struct EntityGraphBuilder {
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    routes: Vec<(String, String, Vec<String>)>,
    derived: Vec<String>,
    parents: Vec<(String, String)>,
    projections: Vec<(String, Vec<String>)>,
}

impl EntityGraphBuilder {
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Declare a relation `lhs_entity.lhs_column == rhs_entity.rhs_column`.
    pub fn relation(
        mut self,
        lhs_entity: &str,
        lhs_column: &str,
        rhs_entity: &str,
        rhs_column: &str,
    ) -> Self {
        self.relations.push(Relation::new(
            ColumnRef::new(lhs_entity, lhs_column),
            ColumnRef::new(rhs_entity, rhs_column),
        ));
        self
    }

    /// Declare the join route from `output` to `target`.
    pub fn route(mut self, output: &str, target: &str, path: &[&str]) -> Self {
        self.routes.push((
            output.into(),
            target.into(),
            path.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Fill in routes from `output` to every reachable entity not declared explicitly,
    /// using the shortest relation path.
    pub fn derive_routes(mut self, output: &str) -> Self {
        self.derived.push(output.into());
        self
    }

    pub fn parent(mut self, model: &str, parent: &str) -> Self {
        self.parents.push((model.into(), parent.into()));
        self
    }

    pub fn projection(mut self, entity: &str, fields: &[&str]) -> Self {
        self.projections.push((
            entity.into(),
            fields.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn build(self) -> SchemaResult<EntityGraph> {
        let mut entities = BTreeMap::new();
        let mut graph = UnGraph::new_undirected();
        let mut node_indices = HashMap::new();

        for entity in self.entities {
            if entities.contains_key(&entity.name) {
                return Err(SchemaError::DuplicateEntity(entity.name));
            }
            let idx = graph.add_node(entity.name.clone());
            node_indices.insert(entity.name.clone(), idx);
            entities.insert(entity.name.clone(), entity);
        }

        let known = |name: &str| -> SchemaResult<()> {
            if entities.contains_key(name) {
                Ok(())
            } else {
                Err(SchemaError::UnknownEntity(name.into()))
            }
        };

        let mut relations = HashMap::new();
        for relation in self.relations {
            known(&relation.lhs.entity)?;
            known(&relation.rhs.entity)?;
            let a = node_indices[&relation.lhs.entity];
            let b = node_indices[&relation.rhs.entity];
            graph.add_edge(a, b, relation.clone());
            relations.insert(relation.key(), relation);
        }

        let mut routes: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        for (output, target, path) in self.routes {
            known(&output)?;
            known(&target)?;
            for hop in &path {
                known(hop)?;
            }
            routes.entry(output).or_default().insert(target, path);
        }

        let mut parents = HashMap::new();
        for (model, parent) in self.parents {
            known(&model)?;
            known(&parent)?;
            parents.insert(model, parent);
        }

        let mut projections = BTreeMap::new();
        for (entity, fields) in self.projections {
            known(&entity)?;
            projections.insert(entity, fields);
        }

        let mut built = EntityGraph {
            entities,
            relations,
            routes,
            parents,
            projections,
            graph,
            node_indices,
        };

        let derived: HashSet<String> = self.derived.into_iter().collect();
        let mut derived: Vec<String> = derived.into_iter().collect();
        derived.sort();
        for output in derived {
            known_in(&built, &output)?;
            let found = built.shortest_routes(&output);
            let table = built.routes.entry(output).or_default();
            for (target, path) in found {
                table.entry(target).or_insert(path);
            }
        }

        Ok(built)
    }
}

fn known_in(graph: &EntityGraph, name: &str) -> SchemaResult<()> {
    graph.entity(name).map(|_| ())
}
