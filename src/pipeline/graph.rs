//! Connection graph between filter ports.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{EdgeId, FilterId};
use std::collections::VecDeque;

/// Producer sink port feeding a consumer source port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub id: EdgeId,
    pub producer: FilterId,
    pub producer_port: usize,
    pub consumer: FilterId,
    pub consumer_port: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Graph {
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        producer: FilterId,
        producer_port: usize,
        consumer: FilterId,
        consumer_port: usize,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            producer,
            producer_port,
            consumer,
            consumer_port,
        });
        id
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The edge already feeding `consumer`'s source `port`, if any.
    pub fn binding(&self, consumer: FilterId, port: usize) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.consumer == consumer && e.consumer_port == port)
    }

    /// Edges feeding `consumer`, in connection order.
    pub fn inputs_of(&self, consumer: FilterId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.consumer == consumer)
    }

    /// Number of readers that will attach to `producer`'s sink `port`.
    pub fn fan_out(&self, producer: FilterId, port: usize) -> usize {
        self.edges
            .iter()
            .filter(|e| e.producer == producer && e.producer_port == port)
            .count()
    }

    /// Check if adding an edge from `from` to `to` would create a cycle.
    pub fn would_create_cycle(&self, node_count: usize, from: FilterId, to: FilterId) -> bool {
        // If `to` can reach `from` through existing edges, from->to closes a loop.
        let mut visited = vec![false; node_count];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= node_count || visited[idx] {
                continue;
            }
            visited[idx] = true;

            for edge in &self.edges {
                if edge.producer == current {
                    stack.push(edge.consumer);
                }
            }
        }
        false
    }

    /// Producers before consumers (Kahn's algorithm). Ties keep insertion order.
    pub fn topological_order(&self, node_count: usize) -> PipelineResult<Vec<FilterId>> {
        let mut in_degree = vec![0u32; node_count];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); node_count];

        for edge in &self.edges {
            let from = edge.producer.index();
            let to = edge.consumer.index();
            if from < node_count && to < node_count {
                adj[from].push(to);
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(node_count);

        while let Some(node) = queue.pop_front() {
            order.push(FilterId(node as u32));
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != node_count {
            tracing::warn!(
                "Pipeline graph has a cycle! Only {} of {} filters ordered.",
                order.len(),
                node_count
            );
            return Err(PipelineError::CycleDetected);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(order: &[FilterId], id: FilterId) -> usize {
        order.iter().position(|&x| x == id).unwrap()
    }

    #[test]
    fn test_topological_sort_linear() {
        let mut graph = Graph::new();
        let (a, b, c) = (FilterId(2), FilterId(0), FilterId(1));
        graph.add(a, 0, b, 0);
        graph.add(b, 0, c, 0);

        let order = graph.topological_order(3).unwrap();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn test_topological_sort_diamond() {
        let mut graph = Graph::new();
        let (a, b, c, d) = (FilterId(0), FilterId(1), FilterId(2), FilterId(3));
        graph.add(a, 0, b, 0);
        graph.add(a, 0, c, 0);
        graph.add(b, 0, d, 0);
        graph.add(c, 0, d, 1);

        let order = graph.topological_order(4).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos(&order, a) < pos(&order, b));
        assert!(pos(&order, a) < pos(&order, c));
        assert!(pos(&order, b) < pos(&order, d));
        assert!(pos(&order, c) < pos(&order, d));
        assert_eq!(graph.fan_out(a, 0), 2);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = Graph::new();
        graph.add(FilterId(0), 0, FilterId(1), 0);
        graph.add(FilterId(1), 0, FilterId(2), 0);
        assert!(graph.would_create_cycle(3, FilterId(2), FilterId(0)));
        assert!(graph.would_create_cycle(3, FilterId(1), FilterId(1)));
        assert!(!graph.would_create_cycle(3, FilterId(0), FilterId(2)));

        graph.add(FilterId(2), 0, FilterId(0), 0);
        assert!(matches!(
            graph.topological_order(3),
            Err(PipelineError::CycleDetected)
        ));
    }

    #[test]
    fn test_binding_lookup() {
        let mut graph = Graph::new();
        let edge = graph.add(FilterId(0), 1, FilterId(1), 2);
        assert_eq!(graph.binding(FilterId(1), 2).unwrap().id, edge);
        assert!(graph.binding(FilterId(1), 0).is_none());
        assert_eq!(graph.inputs_of(FilterId(1)).count(), 1);
    }
}
