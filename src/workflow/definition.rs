// Copyright 2025 Assistance Micro Design
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Workflow graph validation and templates.
//!
//! A valid graph has exactly one entry node (a synthetic start is
//! injected when none is marked), at least one finish node, edges that
//! reference existing nodes, and no cycles. Compilation produces a
//! topological order the sequential engine walks.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::models::{ExecutionMode, NodeType, WorkflowEdge, WorkflowGraph, WorkflowNode};

/// Node id of the injected synthetic entry.
pub const SYNTHETIC_START: &str = "__start";

/// Graph validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Workflow graph has no nodes")]
    Empty,

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Agent node '{0}' does not name an agent")]
    MissingAgent(String),

    #[error("Edge references unknown node: {0}")]
    UnknownNode(String),

    #[error("Multiple entry nodes: {0:?}")]
    MultipleEntries(Vec<String>),

    #[error("Workflow graph has no finish node")]
    NoFinish,

    #[error("Workflow graph contains a cycle")]
    Cycle,
}

/// A validated graph plus its topological order.
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub nodes: HashMap<String, WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    /// All node ids in topological order, entry first
    pub order: Vec<String>,
    pub entry_id: String,
    pub finish_ids: Vec<String>,
}

impl CompiledGraph {
    /// Agent nodes in topological order.
    pub fn agent_nodes(&self) -> Vec<&WorkflowNode> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.node_type == NodeType::Agent)
            .collect()
    }
}

/// Validates a graph and computes its topological order.
///
/// When no node is marked as entry, a synthetic condition node is
/// injected with edges to every node that has no incoming edge.
pub fn validate_graph(graph: &WorkflowGraph) -> Result<CompiledGraph, DefinitionError> {
    if graph.nodes.is_empty() {
        return Err(DefinitionError::Empty);
    }

    let mut nodes: HashMap<String, WorkflowNode> = HashMap::new();
    for node in &graph.nodes {
        if nodes.insert(node.id.clone(), node.clone()).is_some() {
            return Err(DefinitionError::DuplicateNode(node.id.clone()));
        }
        if node.node_type == NodeType::Agent
            && node.agent.as_deref().map_or(true, |a| a.is_empty())
        {
            return Err(DefinitionError::MissingAgent(node.id.clone()));
        }
    }

    let mut edges = graph.edges.clone();
    for edge in &edges {
        if !nodes.contains_key(&edge.from) {
            return Err(DefinitionError::UnknownNode(edge.from.clone()));
        }
        if !nodes.contains_key(&edge.to) {
            return Err(DefinitionError::UnknownNode(edge.to.clone()));
        }
    }

    let finish_ids: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| n.is_finish)
        .map(|n| n.id.clone())
        .collect();
    if finish_ids.is_empty() {
        return Err(DefinitionError::NoFinish);
    }

    let mut entries: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| n.is_entry)
        .map(|n| n.id.clone())
        .collect();

    let entry_id = match entries.len() {
        1 => entries.remove(0),
        0 => {
            // Inject a synthetic start pointing at every root
            let mut has_incoming: HashSet<&str> = HashSet::new();
            for edge in &edges {
                has_incoming.insert(edge.to.as_str());
            }
            let roots: Vec<String> = graph
                .nodes
                .iter()
                .filter(|n| !has_incoming.contains(n.id.as_str()))
                .map(|n| n.id.clone())
                .collect();

            nodes.insert(
                SYNTHETIC_START.to_string(),
                WorkflowNode {
                    id: SYNTHETIC_START.to_string(),
                    node_type: NodeType::Condition,
                    agent: None,
                    is_entry: true,
                    is_finish: false,
                },
            );
            for root in roots {
                edges.push(WorkflowEdge {
                    from: SYNTHETIC_START.to_string(),
                    to: root,
                });
            }
            SYNTHETIC_START.to_string()
        }
        _ => return Err(DefinitionError::MultipleEntries(entries)),
    };

    let order = topological_order(&nodes, &edges)?;

    Ok(CompiledGraph {
        nodes,
        edges,
        order,
        entry_id,
        finish_ids,
    })
}

/// Kahn's algorithm; an unconsumed node means a cycle.
fn topological_order(
    nodes: &HashMap<String, WorkflowNode>,
    edges: &[WorkflowEdge],
) -> Result<Vec<String>, DefinitionError> {
    let mut in_degree: HashMap<&str, usize> = nodes.keys().map(|id| (id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_default() += 1;
    }

    // Deterministic order: seed roots sorted by id
    let mut roots: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    roots.sort_unstable();
    let mut queue: VecDeque<&str> = roots.into_iter().collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());

        if let Some(next) = adjacency.get(id) {
            let mut unlocked: Vec<&str> = Vec::new();
            for &target in next {
                let degree = in_degree.get_mut(target).expect("edge target validated");
                *degree -= 1;
                if *degree == 0 {
                    unlocked.push(target);
                }
            }
            unlocked.sort_unstable();
            queue.extend(unlocked);
        }
    }

    if order.len() != nodes.len() {
        return Err(DefinitionError::Cycle);
    }
    Ok(order)
}

/// A built-in workflow template.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub definition: WorkflowGraph,
    pub execution_mode: ExecutionMode,
    pub default_schedule: String,
}

fn agent_node(id: &str, agent: &str, is_entry: bool, is_finish: bool) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        node_type: NodeType::Agent,
        agent: Some(agent.to_string()),
        is_entry,
        is_finish,
    }
}

fn condition_node(id: &str, is_entry: bool, is_finish: bool) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        node_type: NodeType::Condition,
        agent: None,
        is_entry,
        is_finish,
    }
}

fn edge(from: &str, to: &str) -> WorkflowEdge {
    WorkflowEdge {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Looks up a built-in template by name.
pub fn template(name: &str) -> Option<WorkflowTemplate> {
    match name {
        "price_monitoring" => Some(WorkflowTemplate {
            name: "Price Monitoring".to_string(),
            description: "Monitor price alerts and trigger notifications".to_string(),
            definition: WorkflowGraph {
                nodes: vec![agent_node("start", "price_alert", true, true)],
                edges: vec![],
            },
            execution_mode: ExecutionMode::Parallel,
            default_schedule: "*/5 * * * *".to_string(),
        }),
        "research" => Some(WorkflowTemplate {
            name: "Portfolio Research".to_string(),
            description: "Gather news and analysis for portfolio stocks".to_string(),
            definition: WorkflowGraph {
                nodes: vec![agent_node("research", "research", true, true)],
                edges: vec![],
            },
            execution_mode: ExecutionMode::Sequential,
            default_schedule: "0 9 * * *".to_string(),
        }),
        "rebalancing" => Some(WorkflowTemplate {
            name: "Portfolio Rebalancing".to_string(),
            description: "Analyze portfolio composition and suggest rebalancing".to_string(),
            definition: WorkflowGraph {
                nodes: vec![agent_node("rebalancing", "rebalancing", true, true)],
                edges: vec![],
            },
            execution_mode: ExecutionMode::Sequential,
            default_schedule: "0 10 * * 1".to_string(),
        }),
        "comprehensive_analysis" => Some(WorkflowTemplate {
            name: "Comprehensive Analysis".to_string(),
            description: "Sequential research and rebalancing analysis".to_string(),
            definition: WorkflowGraph {
                nodes: vec![
                    agent_node("research", "research", true, false),
                    agent_node("rebalancing", "rebalancing", false, true),
                ],
                edges: vec![edge("research", "rebalancing")],
            },
            execution_mode: ExecutionMode::Sequential,
            default_schedule: "0 9 * * 1".to_string(),
        }),
        "parallel_monitoring" => Some(WorkflowTemplate {
            name: "Parallel Monitoring".to_string(),
            description: "Run all monitoring tasks in parallel".to_string(),
            definition: WorkflowGraph {
                nodes: vec![
                    condition_node("start", true, false),
                    agent_node("price_alerts", "price_alert", false, false),
                    agent_node("research", "research", false, false),
                    agent_node("rebalancing", "rebalancing", false, false),
                    condition_node("end", false, true),
                ],
                edges: vec![
                    edge("start", "price_alerts"),
                    edge("start", "research"),
                    edge("start", "rebalancing"),
                    edge("price_alerts", "end"),
                    edge("research", "end"),
                    edge("rebalancing", "end"),
                ],
            },
            execution_mode: ExecutionMode::Parallel,
            default_schedule: "0 */6 * * *".to_string(),
        }),
        _ => None,
    }
}

/// Lists the built-in template names.
pub fn list_templates() -> Vec<WorkflowTemplate> {
    [
        "price_monitoring",
        "research",
        "rebalancing",
        "comprehensive_analysis",
        "parallel_monitoring",
    ]
    .iter()
    .filter_map(|name| template(name))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_node_graph() {
        let graph = WorkflowGraph {
            nodes: vec![agent_node("start", "price_alert", true, true)],
            edges: vec![],
        };
        let compiled = validate_graph(&graph).unwrap();
        assert_eq!(compiled.order, vec!["start".to_string()]);
        assert_eq!(compiled.entry_id, "start");
        assert_eq!(compiled.finish_ids, vec!["start".to_string()]);
    }

    #[test]
    fn test_sequential_chain_topological_order() {
        let graph = WorkflowGraph {
            nodes: vec![
                agent_node("research", "research", true, false),
                agent_node("rebalancing", "rebalancing", false, true),
            ],
            edges: vec![edge("research", "rebalancing")],
        };
        let compiled = validate_graph(&graph).unwrap();
        assert_eq!(
            compiled.order,
            vec!["research".to_string(), "rebalancing".to_string()]
        );
        assert_eq!(compiled.agent_nodes().len(), 2);
    }

    #[test]
    fn test_empty_graph_rejected() {
        let graph = WorkflowGraph {
            nodes: vec![],
            edges: vec![],
        };
        assert_eq!(validate_graph(&graph).unwrap_err(), DefinitionError::Empty);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let graph = WorkflowGraph {
            nodes: vec![
                agent_node("a", "research", true, true),
                agent_node("a", "rebalancing", false, false),
            ],
            edges: vec![],
        };
        assert!(matches!(
            validate_graph(&graph).unwrap_err(),
            DefinitionError::DuplicateNode(_)
        ));
    }

    #[test]
    fn test_agent_node_without_agent_rejected() {
        let mut node = agent_node("a", "", true, true);
        node.agent = None;
        let graph = WorkflowGraph {
            nodes: vec![node],
            edges: vec![],
        };
        assert!(matches!(
            validate_graph(&graph).unwrap_err(),
            DefinitionError::MissingAgent(_)
        ));
    }

    #[test]
    fn test_unknown_edge_target_rejected() {
        let graph = WorkflowGraph {
            nodes: vec![agent_node("a", "research", true, true)],
            edges: vec![edge("a", "ghost")],
        };
        assert!(matches!(
            validate_graph(&graph).unwrap_err(),
            DefinitionError::UnknownNode(_)
        ));
    }

    #[test]
    fn test_multiple_entries_rejected() {
        let graph = WorkflowGraph {
            nodes: vec![
                agent_node("a", "research", true, false),
                agent_node("b", "rebalancing", true, true),
            ],
            edges: vec![edge("a", "b")],
        };
        assert!(matches!(
            validate_graph(&graph).unwrap_err(),
            DefinitionError::MultipleEntries(_)
        ));
    }

    #[test]
    fn test_no_finish_rejected() {
        let graph = WorkflowGraph {
            nodes: vec![agent_node("a", "research", true, false)],
            edges: vec![],
        };
        assert_eq!(
            validate_graph(&graph).unwrap_err(),
            DefinitionError::NoFinish
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let graph = WorkflowGraph {
            nodes: vec![
                agent_node("a", "research", true, false),
                agent_node("b", "rebalancing", false, true),
            ],
            edges: vec![edge("a", "b"), edge("b", "a")],
        };
        assert_eq!(validate_graph(&graph).unwrap_err(), DefinitionError::Cycle);
    }

    #[test]
    fn test_synthetic_start_injected() {
        // No node marked as entry: a synthetic start is added
        let graph = WorkflowGraph {
            nodes: vec![
                agent_node("a", "research", false, false),
                agent_node("b", "rebalancing", false, true),
            ],
            edges: vec![edge("a", "b")],
        };
        let compiled = validate_graph(&graph).unwrap();
        assert_eq!(compiled.entry_id, SYNTHETIC_START);
        assert_eq!(compiled.order.first().unwrap(), SYNTHETIC_START);
        // The synthetic node points at the single root
        assert!(compiled
            .edges
            .iter()
            .any(|e| e.from == SYNTHETIC_START && e.to == "a"));
    }

    #[test]
    fn test_diamond_graph_order() {
        let graph = WorkflowGraph {
            nodes: vec![
                condition_node("start", true, false),
                agent_node("left", "research", false, false),
                agent_node("right", "rebalancing", false, false),
                condition_node("end", false, true),
            ],
            edges: vec![
                edge("start", "left"),
                edge("start", "right"),
                edge("left", "end"),
                edge("right", "end"),
            ],
        };
        let compiled = validate_graph(&graph).unwrap();
        assert_eq!(compiled.order.first().unwrap(), "start");
        assert_eq!(compiled.order.last().unwrap(), "end");
        assert_eq!(compiled.agent_nodes().len(), 2);
    }

    #[test]
    fn test_all_templates_valid() {
        for template in list_templates() {
            let compiled = validate_graph(&template.definition);
            assert!(
                compiled.is_ok(),
                "template '{}' failed validation: {:?}",
                template.name,
                compiled.err()
            );
            assert!(!template.default_schedule.is_empty());
        }
    }

    #[test]
    fn test_template_lookup() {
        assert!(template("price_monitoring").is_some());
        assert!(template("parallel_monitoring").is_some());
        assert!(template("unknown").is_none());

        let parallel = template("parallel_monitoring").unwrap();
        assert_eq!(parallel.execution_mode, ExecutionMode::Parallel);
        assert_eq!(parallel.definition.nodes.len(), 5);
    }
}
