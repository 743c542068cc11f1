//! Join resolution over the route table, plus BFS route derivation.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use super::{EntityGraph, SchemaError, SchemaResult};

/// A problem found in a declared route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteIssue {
    /// Two consecutive hops have no relation between them.
    MissingHop {
        output: String,
        target: String,
        from: String,
        to: String,
    },
    /// The route does not end at its target.
    WrongTerminus {
        output: String,
        target: String,
        last: String,
    },
}

impl std::fmt::Display for RouteIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteIssue::MissingHop {
                output,
                target,
                from,
                to,
            } => write!(
                f,
                "{} -> {}: no relation between {} and {}",
                output, target, from, to
            ),
            RouteIssue::WrongTerminus {
                output,
                target,
                last,
            } => write!(f, "{} -> {}: route ends at {}", output, target, last),
        }
    }
}

impl EntityGraph {
    /// Compute the ordered join list for `output` given the models referenced by matches.
    ///
    /// Routes are unioned in match order, keeping the first occurrence of each model.
    /// The output model contributes nothing.
    pub fn resolve_joins<S: AsRef<str>>(
        &self,
        output: &str,
        match_models: &[S],
    ) -> SchemaResult<Vec<String>> {
        self.routes_from(output)?;

        let mut joins: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for model in match_models {
            let model = model.as_ref();
            self.entity(model)?;
            if model == output {
                continue;
            }
            for hop in self.route(output, model)? {
                if hop != output && seen.insert(hop.as_str()) {
                    joins.push(hop.clone());
                }
            }
        }

        Ok(joins)
    }

    /// Shortest relation path from `from` to `to`, excluding `from`.
    pub fn find_path(&self, from: &str, to: &str) -> SchemaResult<Vec<String>> {
        if from == to {
            return Ok(Vec::new());
        }

        let from_idx = *self
            .node_indices
            .get(from)
            .ok_or_else(|| SchemaError::UnknownEntity(from.into()))?;
        let to_idx = *self
            .node_indices
            .get(to)
            .ok_or_else(|| SchemaError::UnknownEntity(to.into()))?;

        let parents = self.bfs_parents(from_idx);
        if !parents.contains_key(&to_idx) {
            return Err(SchemaError::NoPath {
                from: from.into(),
                to: to.into(),
            });
        }
        Ok(self.reconstruct(from_idx, to_idx, &parents))
    }

    /// Shortest routes from `output` to every reachable entity.
    pub(super) fn shortest_routes(&self, output: &str) -> BTreeMap<String, Vec<String>> {
        let mut found = BTreeMap::new();
        let Some(&from_idx) = self.node_indices.get(output) else {
            return found;
        };

        let parents = self.bfs_parents(from_idx);
        for &node in parents.keys() {
            let path = self.reconstruct(from_idx, node, &parents);
            found.insert(self.graph[node].clone(), path);
        }
        found
    }

    /// BFS with parent pointers. Neighbours are visited in name order so
    /// ties between equal-length paths break the same way every time.
    fn bfs_parents(&self, start: NodeIndex) -> HashMap<NodeIndex, NodeIndex> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();

        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let mut neighbours: Vec<NodeIndex> = self
                .graph
                .edges(current)
                .map(|e| if e.source() == current { e.target() } else { e.source() })
                .collect();
            neighbours.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

            for neighbour in neighbours {
                if visited.insert(neighbour) {
                    parents.insert(neighbour, current);
                    queue.push_back(neighbour);
                }
            }
        }

        parents
    }

    fn reconstruct(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        parents: &HashMap<NodeIndex, NodeIndex>,
    ) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = to;
        while current != from {
            path.push(self.graph[current].clone());
            current = parents[&current];
        }
        path.reverse();
        path
    }

    /// Report declared routes that cannot be joined hop by hop.
    pub fn validate_routes(&self) -> Vec<RouteIssue> {
        let mut issues = Vec::new();

        for (output, table) in &self.routes {
            for (target, path) in table {
                let mut previous = output.as_str();
                for hop in path {
                    // A hop may join against the output model or its predecessor.
                    if self.relation(output, hop).is_none()
                        && self.relation(previous, hop).is_none()
                    {
                        issues.push(RouteIssue::MissingHop {
                            output: output.clone(),
                            target: target.clone(),
                            from: previous.to_string(),
                            to: hop.clone(),
                        });
                    }
                    previous = hop;
                }
                if previous != target && output != target {
                    issues.push(RouteIssue::WrongTerminus {
                        output: output.clone(),
                        target: target.clone(),
                        last: previous.to_string(),
                    });
                }
            }
        }

        issues
    }
}
