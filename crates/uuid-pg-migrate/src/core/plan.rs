//! Dependency-ordered load plan.
//!
//! Tables are nodes; there is an edge from the identity table producing a
//! scope to every table holding a foreign key into that scope. The load
//! order is a topological order of that graph. Among tables that are ready
//! at the same time, declaration order wins, so a plan that is already
//! ordered comes out unchanged.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{MigrateError, Result};

use super::schema::TableSpec;

/// Tables in the order they must be loaded.
#[derive(Debug, Clone)]
pub struct LoadPlan {
    tables: Vec<TableSpec>,
}

impl LoadPlan {
    /// Order the given specs by their foreign-key dependencies.
    ///
    /// Fails when a table name is declared twice, a scope has two producing
    /// tables, a foreign key refers to a scope nothing produces, or the
    /// dependencies form a cycle.
    pub fn build(specs: &[TableSpec]) -> Result<Self> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..specs.len()).map(|i| graph.add_node(i)).collect();

        let mut names = HashSet::new();
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            if !names.insert(spec.name.as_str()) {
                return Err(MigrateError::Config(format!(
                    "table '{}' is declared more than once",
                    spec.name
                )));
            }
            if let Some(identity) = &spec.identity {
                if let Some(prev) = producers.insert(identity.scope.as_str(), i) {
                    return Err(MigrateError::Config(format!(
                        "scope '{}' is produced by both '{}' and '{}'",
                        identity.scope, specs[prev].name, spec.name
                    )));
                }
            }
        }

        for (i, spec) in specs.iter().enumerate() {
            for scope in spec.referenced_scopes() {
                let producer = producers.get(scope).ok_or_else(|| {
                    MigrateError::Config(format!(
                        "table '{}' references scope '{}' but no table declares identity scope '{}'",
                        spec.name, scope, scope
                    ))
                })?;
                graph.update_edge(nodes[*producer], nodes[i], ());
            }
        }

        let mut in_degree: Vec<usize> = nodes
            .iter()
            .map(|n| graph.neighbors_directed(*n, Direction::Incoming).count())
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(specs.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
                let j = graph[next];
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.insert(j);
                }
            }
        }

        if order.len() < specs.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| specs[i].name.as_str())
                .collect();
            return Err(MigrateError::Config(format!(
                "foreign-key dependency cycle between tables: {}",
                stuck.join(", ")
            )));
        }

        Ok(Self {
            tables: order.into_iter().map(|i| specs[i].clone()).collect(),
        })
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names in load order.
    pub fn names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Load position of a table.
    pub fn position(&self, table: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == table)
    }
}
