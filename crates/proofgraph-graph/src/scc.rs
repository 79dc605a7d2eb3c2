//! Iterative Tarjan strongly-connected-components over string-keyed graphs.
//!
//! Explicit stack frames instead of recursion: proof corpora contain long
//! lemma chains that would otherwise blow the call stack. Successors are
//! visited in lexicographic order so the output is stable across runs
//! regardless of input ordering.

use std::collections::BTreeMap;

struct Frame<'a> {
    node: &'a str,
    next_successor: usize,
}

/// Computes SCCs of the graph given as `node -> sorted successors`.
///
/// Components are returned in Tarjan completion order with members sorted;
/// roots are taken in lexicographic order, which together makes the result
/// a pure function of the graph's edge set.
pub fn strongly_connected_components(
    adjacency: &BTreeMap<String, Vec<String>>,
) -> Vec<Vec<String>> {
    let mut index_counter = 0usize;
    let mut indices: BTreeMap<&str, usize> = BTreeMap::new();
    let mut lowlinks: BTreeMap<&str, usize> = BTreeMap::new();
    let mut on_stack: BTreeMap<&str, bool> = BTreeMap::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut components: Vec<Vec<String>> = Vec::new();

    for root in adjacency.keys() {
        if indices.contains_key(root.as_str()) {
            continue;
        }

        let mut frames = vec![Frame {
            node: root,
            next_successor: 0,
        }];
        indices.insert(root, index_counter);
        lowlinks.insert(root, index_counter);
        index_counter += 1;
        stack.push(root);
        on_stack.insert(root, true);

        while let Some(frame) = frames.last_mut() {
            let node = frame.node;
            let successors = adjacency
                .get(node)
                .map(|s| s.as_slice())
                .unwrap_or_default();

            if frame.next_successor < successors.len() {
                let succ = successors[frame.next_successor].as_str();
                frame.next_successor += 1;

                if !indices.contains_key(succ) {
                    indices.insert(succ, index_counter);
                    lowlinks.insert(succ, index_counter);
                    index_counter += 1;
                    stack.push(succ);
                    on_stack.insert(succ, true);
                    frames.push(Frame {
                        node: succ,
                        next_successor: 0,
                    });
                } else if on_stack.get(succ).copied().unwrap_or(false) {
                    let succ_index = indices[succ];
                    let low = lowlinks[node].min(succ_index);
                    lowlinks.insert(node, low);
                }
                continue;
            }

            // Node finished: propagate lowlink to parent, pop component at root.
            let finished = frames.pop().expect("frame present");
            let node = finished.node;
            if let Some(parent) = frames.last() {
                let low = lowlinks[parent.node].min(lowlinks[node]);
                lowlinks.insert(parent.node, low);
            }
            if lowlinks[node] == indices[node] {
                let mut component = Vec::new();
                loop {
                    let member = stack.pop().expect("scc stack non-empty at root");
                    on_stack.insert(member, false);
                    component.push(member.to_string());
                    if member == node {
                        break;
                    }
                }
                component.sort();
                components.push(component);
            }
        }
    }

    components
}
