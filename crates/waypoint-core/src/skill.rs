//! The skill tree: a fixed DAG of nodes gated by prerequisites.
//!
//! Node status is never stored. It is derived from the set of node ids a
//! user has completed:
//!
//! - `completed` if the id is in the set;
//! - `available` if every prerequisite is in the set (vacuously true for
//!   root nodes);
//! - `locked` otherwise.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub type NodeId = String;

/// A node as declared in reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillNode {
  pub id:            NodeId,
  #[serde(default)]
  pub title:         String,
  #[serde(default)]
  pub prerequisites: Vec<NodeId>,
}

impl SkillNode {
  pub fn new<I, P>(id: impl Into<NodeId>, prerequisites: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<NodeId>,
  {
    let id = id.into();
    Self {
      title: id.clone(),
      id,
      prerequisites: prerequisites.into_iter().map(Into::into).collect(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
  Locked,
  Available,
  Completed,
}

/// A node together with its derived status for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeState {
  pub id:            NodeId,
  pub title:         String,
  pub prerequisites: Vec<NodeId>,
  pub status:        NodeStatus,
}

// ─── Graph ───────────────────────────────────────────────────────────────────

/// A validated, acyclic prerequisite graph.
#[derive(Debug, Clone)]
pub struct SkillGraph {
  nodes:      Vec<SkillNode>,
  index:      HashMap<NodeId, usize>,
  /// `dependents[i]` lists nodes that have node `i` as a prerequisite, in
  /// declaration order.
  dependents: Vec<Vec<usize>>,
}

impl SkillGraph {
  /// Build and validate a graph. Duplicate ids, unknown prerequisite ids
  /// and cycles are [`Error::Configuration`].
  pub fn new(nodes: Vec<SkillNode>) -> Result<Self> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
      if index.insert(node.id.clone(), i).is_some() {
        return Err(Error::Configuration(format!(
          "duplicate skill node id {:?}",
          node.id
        )));
      }
    }

    let mut dependents = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
      for prereq in &node.prerequisites {
        let &p = index.get(prereq).ok_or_else(|| {
          Error::Configuration(format!(
            "skill node {:?} lists unknown prerequisite {prereq:?}",
            node.id
          ))
        })?;
        if dependents[p].last() != Some(&i) {
          dependents[p].push(i);
        }
      }
    }

    let graph = Self { nodes, index, dependents };
    graph.check_acyclic()?;
    Ok(graph)
  }

  /// Kahn's algorithm; any node left unvisited sits on a cycle.
  fn check_acyclic(&self) -> Result<()> {
    let mut pending: Vec<usize> = self
      .nodes
      .iter()
      .map(|n| n.prerequisites.iter().collect::<HashSet<_>>().len())
      .collect();

    let mut queue: VecDeque<usize> = pending
      .iter()
      .enumerate()
      .filter(|&(_, &d)| d == 0)
      .map(|(i, _)| i)
      .collect();

    let mut visited = 0;
    while let Some(i) = queue.pop_front() {
      visited += 1;
      for &d in &self.dependents[i] {
        pending[d] -= 1;
        if pending[d] == 0 {
          queue.push_back(d);
        }
      }
    }

    if visited == self.nodes.len() {
      return Ok(());
    }

    let cyclic: Vec<&str> = pending
      .iter()
      .enumerate()
      .filter(|&(_, &d)| d > 0)
      .map(|(i, _)| self.nodes[i].id.as_str())
      .collect();
    Err(Error::Configuration(format!(
      "skill tree prerequisites form a cycle through {cyclic:?}"
    )))
  }

  pub fn nodes(&self) -> &[SkillNode] { &self.nodes }

  pub fn len(&self) -> usize { self.nodes.len() }

  pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

  fn lookup(&self, id: &str) -> Result<usize> {
    self
      .index
      .get(id)
      .copied()
      .ok_or_else(|| Error::UnknownNode(id.to_owned()))
  }

  fn missing_at(&self, i: usize, completed: &HashSet<NodeId>) -> Vec<NodeId> {
    self.nodes[i]
      .prerequisites
      .iter()
      .filter(|p| !completed.contains(*p))
      .cloned()
      .collect()
  }

  fn status_at(&self, i: usize, completed: &HashSet<NodeId>) -> NodeStatus {
    let node = &self.nodes[i];
    if completed.contains(&node.id) {
      NodeStatus::Completed
    } else if node.prerequisites.iter().all(|p| completed.contains(p)) {
      NodeStatus::Available
    } else {
      NodeStatus::Locked
    }
  }

  pub fn status(&self, id: &str, completed: &HashSet<NodeId>) -> Result<NodeStatus> {
    Ok(self.status_at(self.lookup(id)?, completed))
  }

  /// Every node with its status, in declaration order.
  pub fn statuses(&self, completed: &HashSet<NodeId>) -> Vec<NodeState> {
    self
      .nodes
      .iter()
      .enumerate()
      .map(|(i, n)| NodeState {
        id:            n.id.clone(),
        title:         n.title.clone(),
        prerequisites: n.prerequisites.clone(),
        status:        self.status_at(i, completed),
      })
      .collect()
  }

  /// Mark `id` completed in `completed`.
  ///
  /// Returns the dependents that moved from locked to available. Completing
  /// an already completed node is a no-op returning an empty list. A locked
  /// node fails with [`Error::PrerequisiteNotMet`] and `completed` is left
  /// untouched.
  pub fn complete_node(
    &self,
    completed: &mut HashSet<NodeId>,
    id: &str,
  ) -> Result<Vec<NodeId>> {
    let i = self.lookup(id)?;
    if completed.contains(id) {
      return Ok(Vec::new());
    }

    let missing = self.missing_at(i, completed);
    if !missing.is_empty() {
      return Err(Error::PrerequisiteNotMet { node: id.to_owned(), missing });
    }

    let before: Vec<(usize, NodeStatus)> = self.dependents[i]
      .iter()
      .map(|&d| (d, self.status_at(d, completed)))
      .collect();

    completed.insert(id.to_owned());

    Ok(
      before
        .into_iter()
        .filter(|&(d, was)| {
          was == NodeStatus::Locked
            && self.status_at(d, completed) == NodeStatus::Available
        })
        .map(|(d, _)| self.nodes[d].id.clone())
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn chain() -> SkillGraph {
    SkillGraph::new(vec![
      SkillNode::new("a", Vec::<&str>::new()),
      SkillNode::new("b", ["a"]),
      SkillNode::new("c", ["b"]),
    ])
    .unwrap()
  }

  fn done(ids: &[&str]) -> HashSet<NodeId> {
    ids.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn initial_statuses() {
    let g = chain();
    let none = HashSet::new();
    assert_eq!(g.status("a", &none).unwrap(), NodeStatus::Available);
    assert_eq!(g.status("b", &none).unwrap(), NodeStatus::Locked);
    assert_eq!(g.status("c", &none).unwrap(), NodeStatus::Locked);
  }

  #[test]
  fn completing_root_unlocks_only_direct_dependent() {
    let g = chain();
    let mut completed = HashSet::new();

    let unlocked = g.complete_node(&mut completed, "a").unwrap();
    assert_eq!(unlocked, ["b"]);
    assert_eq!(g.status("a", &completed).unwrap(), NodeStatus::Completed);
    assert_eq!(g.status("b", &completed).unwrap(), NodeStatus::Available);
    assert_eq!(g.status("c", &completed).unwrap(), NodeStatus::Locked);
  }

  #[test]
  fn locked_node_cannot_be_completed() {
    let g = chain();
    let mut completed = done(&["a"]);

    let err = g.complete_node(&mut completed, "c").unwrap_err();
    match err {
      Error::PrerequisiteNotMet { node, missing } => {
        assert_eq!(node, "c");
        assert_eq!(missing, ["b"]);
      }
      other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(completed, done(&["a"]));
  }

  #[test]
  fn recompleting_is_a_noop() {
    let g = chain();
    let mut completed = done(&["a"]);
    assert!(g.complete_node(&mut completed, "a").unwrap().is_empty());
    assert_eq!(completed, done(&["a"]));
  }

  #[test]
  fn diamond_unlocks_after_both_parents() {
    let g = SkillGraph::new(vec![
      SkillNode::new("root", Vec::<&str>::new()),
      SkillNode::new("left", ["root"]),
      SkillNode::new("right", ["root"]),
      SkillNode::new("join", ["left", "right"]),
    ])
    .unwrap();

    let mut completed = HashSet::new();
    assert_eq!(g.complete_node(&mut completed, "root").unwrap(), ["left", "right"]);
    assert!(g.complete_node(&mut completed, "left").unwrap().is_empty());
    assert_eq!(g.complete_node(&mut completed, "right").unwrap(), ["join"]);
  }

  #[test]
  fn unknown_node_errors() {
    let g = chain();
    assert!(matches!(
      g.complete_node(&mut HashSet::new(), "zz"),
      Err(Error::UnknownNode(_))
    ));
  }

  #[test]
  fn cycle_is_configuration_error() {
    let err = SkillGraph::new(vec![
      SkillNode::new("root", Vec::<&str>::new()),
      SkillNode::new("x", ["root", "z"]),
      SkillNode::new("y", ["x"]),
      SkillNode::new("z", ["y"]),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(ref m) if m.contains("cycle")));
  }

  #[test]
  fn self_prerequisite_is_a_cycle() {
    let err = SkillGraph::new(vec![SkillNode::new("a", ["a"])]).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
  }

  #[test]
  fn unknown_prerequisite_is_configuration_error() {
    let err = SkillGraph::new(vec![SkillNode::new("a", ["ghost"])]).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
  }

  #[test]
  fn duplicate_id_is_configuration_error() {
    let err = SkillGraph::new(vec![
      SkillNode::new("a", Vec::<&str>::new()),
      SkillNode::new("a", Vec::<&str>::new()),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
  }

  #[test]
  fn duplicate_prerequisite_entries_are_tolerated() {
    let g = SkillGraph::new(vec![
      SkillNode::new("a", Vec::<&str>::new()),
      SkillNode::new("b", ["a", "a"]),
    ])
    .unwrap();
    let mut completed = HashSet::new();
    assert_eq!(g.complete_node(&mut completed, "a").unwrap(), ["b"]);
  }
}
