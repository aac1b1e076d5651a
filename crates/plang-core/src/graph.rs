//! The route graph used by circular-conflict analysis.
//!
//! Nodes are policies, indexed by declaration order. An edge `a -> b` exists
//! when policy `a` contains a `route to b` action and `b` names a policy in
//! the same module. Routes to anything else (agents, queues) are not edges.
//!
//! All traversals use explicit stacks over node indices, so deep route
//! chains cannot overflow the call stack.

use plang_contracts::ir::IrModule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGraph {
    nodes: Vec<String>,
    edges: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

impl RouteGraph {
    pub fn from_module(module: &IrModule) -> Self {
        let nodes: Vec<String> = module.ids().map(str::to_string).collect();
        let edges = module
            .iter()
            .map(|function| {
                let mut successors: Vec<usize> = Vec::new();
                for target in function.route_targets() {
                    if let Some(index) = module.position(target) {
                        if !successors.contains(&index) {
                            successors.push(index);
                        }
                    }
                }
                successors
            })
            .collect();
        Self { nodes, edges }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &str {
        &self.nodes[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n == id)
    }

    pub fn successors(&self, index: usize) -> &[usize] {
        &self.edges[index]
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    /// A copy of this graph with the edge `from -> to` removed.
    pub fn without_edge(&self, from: usize, to: usize) -> Self {
        let mut graph = self.clone();
        if let Some(successors) = graph.edges.get_mut(from) {
            successors.retain(|&s| s != to);
        }
        graph
    }

    /// Weakly connected components, each sorted by node index, ordered by
    /// their smallest node.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let n = self.nodes.len();
        let mut undirected: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (from, successors) in self.edges.iter().enumerate() {
            for &to in successors {
                undirected[from].push(to);
                undirected[to].push(from);
            }
        }

        let mut seen = vec![false; n];
        let mut components = Vec::new();
        for start in 0..n {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![start];
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                for &next in &undirected[node] {
                    if !seen[next] {
                        seen[next] = true;
                        component.push(next);
                        stack.push(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// First cycle found by depth-first search from the nodes of
    /// `component`, visited in index order.
    ///
    /// The cycle is returned in edge order starting at the node the search
    /// re-entered, without repeating it at the end.
    pub fn find_cycle(&self, component: &[usize]) -> Option<Vec<usize>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];

        for &start in component {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            // (node, index of the next successor to explore)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            let mut path: Vec<usize> = vec![start];
            marks[start] = Mark::OnPath;

            while let Some(frame) = stack.last_mut() {
                let (node, cursor) = *frame;
                match self.edges[node].get(cursor) {
                    Some(&next) => {
                        frame.1 += 1;
                        match marks[next] {
                            Mark::OnPath => {
                                let at = path.iter().position(|&p| p == next).unwrap_or(0);
                                return Some(path[at..].to_vec());
                            }
                            Mark::Unvisited => {
                                marks[next] = Mark::OnPath;
                                stack.push((next, 0));
                                path.push(next);
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                        path.pop();
                    }
                }
            }
        }
        None
    }

    /// Nodes of `component` with no incoming edge.
    pub fn entry_nodes(&self, component: &[usize]) -> Vec<usize> {
        let mut has_incoming = vec![false; self.nodes.len()];
        for successors in &self.edges {
            for &to in successors {
                has_incoming[to] = true;
            }
        }
        component.iter().copied().filter(|&n| !has_incoming[n]).collect()
    }

    /// Reachability marks for every node, starting from `roots`.
    pub fn reachable_from(&self, roots: &[usize]) -> Vec<bool> {
        let mut reached = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = Vec::new();
        for &root in roots {
            if !reached[root] {
                reached[root] = true;
                stack.push(root);
            }
        }
        while let Some(node) = stack.pop() {
            for &next in &self.edges[node] {
                if !reached[next] {
                    reached[next] = true;
                    stack.push(next);
                }
            }
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(source: &str) -> RouteGraph {
        RouteGraph::from_module(&plang_lang::build(&plang_lang::parse(source).unwrap()))
    }

    fn names(graph: &RouteGraph, nodes: &[usize]) -> Vec<String> {
        nodes.iter().map(|&n| graph.node(n).to_string()).collect()
    }

    #[test]
    fn only_routes_to_policies_become_edges() {
        let g = graph(
            r#"
            policy a: ROUTING { when x then route to b else route to "expert_agent" }
            policy b: ROUTING { allow }
            "#,
        );
        assert_eq!(g.len(), 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.successors(0), &[1]);
    }

    #[test]
    fn two_node_cycle_is_found_once() {
        let g = graph("policy a: ROUTING { route to b }\npolicy b: ROUTING { route to a }");
        let components = g.components();
        assert_eq!(components, vec![vec![0, 1]]);
        let cycle = g.find_cycle(&components[0]).unwrap();
        assert_eq!(names(&g, &cycle), vec!["a", "b"]);
    }

    #[test]
    fn cycle_excludes_the_tail_that_leads_into_it() {
        let g = graph(
            r#"
            policy entry: ROUTING { route to x }
            policy x: ROUTING { route to y }
            policy y: ROUTING { route to z }
            policy z: ROUTING { route to x }
            "#,
        );
        let cycle = g.find_cycle(&g.components()[0]).unwrap();
        assert_eq!(names(&g, &cycle), vec!["x", "y", "z"]);
        assert_eq!(g.entry_nodes(&g.components()[0]), vec![0]);
    }

    #[test]
    fn self_route_is_a_cycle() {
        let g = graph("policy loop: ROUTING { route to loop }");
        assert_eq!(g.find_cycle(&[0]), Some(vec![0]));
    }

    #[test]
    fn acyclic_chain_has_no_cycle() {
        let g = graph("policy a: ROUTING { route to b }\npolicy b: ROUTING { route to c }\npolicy c: CUSTOM { allow }");
        assert_eq!(g.find_cycle(&[0, 1, 2]), None);
    }

    #[test]
    fn separate_components_are_split() {
        let g = graph(
            r#"
            policy a: ROUTING { route to b }
            policy c: ROUTING { allow }
            policy b: ROUTING { allow }
            "#,
        );
        assert_eq!(g.components(), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn removing_an_edge_changes_reachability() {
        let g = graph("policy a: ROUTING { route to b }\npolicy b: ROUTING { route to a }");
        let broken = g.without_edge(0, 1);
        assert_eq!(broken.find_cycle(&[0, 1]), None);
        assert_eq!(broken.entry_nodes(&[0, 1]), vec![1]);
        assert_eq!(broken.reachable_from(&[1]), vec![true, true]);
        assert_eq!(broken.reachable_from(&[0]), vec![true, false]);
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let mut source = String::new();
        for i in 0..2000 {
            source.push_str(&format!("policy p{}: ROUTING {{ route to p{} }}\n", i, i + 1));
        }
        source.push_str("policy p2000: ROUTING { route to p0 }\n");
        let g = graph(&source);
        let cycle = g.find_cycle(&g.components()[0]).unwrap();
        assert_eq!(cycle.len(), 2001);
    }
}
