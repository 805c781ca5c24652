//! Pass 8: identifier canonicalization.
//!
//! The complete old-to-new mapping is built first, then applied in a single
//! rewrite so no reference is ever resolved against a half-renamed spec.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::context::Context;
use crate::model::{ArtifactSlot, CsarSpec};
use crate::names::{camelize, NameGenerator, SuffixStyle};

type Renames = IndexMap<String, String>;

/// Old name to new name, per entity kind.
///
/// Node and relationship names are unique across all topologies, since the
/// definitions document places their templates in one id space.
#[derive(Debug, Default)]
pub struct RenameTable {
    node_types: Renames,
    artifacts: Renames,
    topologies: Renames,
    /// Keyed by the topology's old name.
    nodes: IndexMap<String, Renames>,
    /// Keyed by the topology's old name.
    relationships: IndexMap<String, Renames>,
}

impl RenameTable {
    pub fn build(spec: &CsarSpec, ctx: &mut Context) -> Self {
        let names = &mut ctx.names;
        let mut table = RenameTable {
            node_types: assign(spec.node_types.keys(), names, &mut HashSet::new()),
            artifacts: assign(spec.artifacts.keys(), names, &mut HashSet::new()),
            topologies: assign(spec.topologies.keys(), names, &mut HashSet::new()),
            ..Default::default()
        };

        let mut node_names = HashSet::new();
        let mut rel_names = HashSet::new();
        for (topo_name, topology) in &spec.topologies {
            let nodes = assign(topology.nodes.keys(), names, &mut node_names);
            let rels = assign(topology.relationships.keys(), names, &mut rel_names);
            table.nodes.insert(topo_name.clone(), nodes);
            table.relationships.insert(topo_name.clone(), rels);
        }
        table
    }

    /// New name of a node type.
    pub fn node_type<'a>(&'a self, old: &'a str) -> &'a str {
        lookup(&self.node_types, old)
    }

    /// New name of an artifact.
    pub fn artifact<'a>(&'a self, old: &'a str) -> &'a str {
        lookup(&self.artifacts, old)
    }

    /// New name of a topology.
    pub fn topology<'a>(&'a self, old: &'a str) -> &'a str {
        lookup(&self.topologies, old)
    }

    /// Rewrite every entity name and every reference to one.
    pub fn apply(&self, spec: &mut CsarSpec) {
        spec.node_types = std::mem::take(&mut spec.node_types)
            .into_iter()
            .map(|(name, mut node_type)| {
                for slots in node_type.operations.values_mut() {
                    self.rewrite_slots(slots);
                }
                if let Some(slots) = node_type.deployment_artifacts.as_mut() {
                    self.rewrite_slots(slots);
                }
                (self.node_type(&name).to_string(), node_type)
            })
            .collect();

        spec.artifacts = std::mem::take(&mut spec.artifacts)
            .into_iter()
            .map(|(name, artifact)| (self.artifact(&name).to_string(), artifact))
            .collect();

        let empty = Renames::new();
        spec.topologies = std::mem::take(&mut spec.topologies)
            .into_iter()
            .map(|(topo_name, mut topology)| {
                let nodes = self.nodes.get(&topo_name).unwrap_or(&empty);
                let rels = self.relationships.get(&topo_name).unwrap_or(&empty);

                topology.nodes = std::mem::take(&mut topology.nodes)
                    .into_iter()
                    .map(|(name, mut node)| {
                        if let Some(t) = node.node_type.as_mut() {
                            *t = self.node_type(t).to_string();
                        }
                        if let Some(slots) = node.deployment_artifacts.as_mut() {
                            self.rewrite_slots(slots);
                        }
                        (lookup(nodes, &name).to_string(), node)
                    })
                    .collect();

                topology.relationships = std::mem::take(&mut topology.relationships)
                    .into_iter()
                    .map(|(name, mut rel)| {
                        for end in [&mut rel.source, &mut rel.target] {
                            if let Some(node) = end.as_mut() {
                                *node = lookup(nodes, node).to_string();
                            }
                        }
                        (lookup(rels, &name).to_string(), rel)
                    })
                    .collect();

                (self.topology(&topo_name).to_string(), topology)
            })
            .collect();
    }

    fn rewrite_slots(&self, slots: &mut [ArtifactSlot]) {
        for slot in slots {
            if let ArtifactSlot::Name(name) = slot {
                *name = self.artifact(name).to_string();
            }
        }
    }
}

fn lookup<'a>(renames: &'a Renames, old: &'a str) -> &'a str {
    renames.get(old).map(String::as_str).unwrap_or(old)
}

/// Assign canonical names in declaration order; later collisions get a suffix.
fn assign<'a>(
    old_names: impl Iterator<Item = &'a String>,
    names: &mut NameGenerator,
    taken: &mut HashSet<String>,
) -> Renames {
    let mut renames = Renames::new();
    for old in old_names {
        let candidate = camelize(old);
        let new = if candidate.is_empty() || taken.contains(&candidate) {
            names.suffixed(old, SuffixStyle::Camelized, |c| c.is_empty() || taken.contains(c))
        } else {
            candidate
        };
        taken.insert(new.clone());
        renames.insert(old.clone(), new);
    }
    renames
}
