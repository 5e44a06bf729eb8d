//! Graph mutation operations
//!
//! Substitution of a node's unit inside the live model. Identifiers never
//! change: the replacement lands at the same path and the node metadata is
//! refreshed from the new unit.

use tracing::debug;

use crate::error::{OptResult, OptimizeError};
use crate::model::{join_path, Module};
use crate::tensor::format_shape;

use super::context::ModelGraph;
use super::maps::{NodeId, NodeMap};

impl<'m> ModelGraph<'m> {
    // ========================================================================
    // Unit substitution
    // ========================================================================

    /// Replace the unit behind a node, returning the old unit
    ///
    /// The replacement must produce the same output shape for the traced
    /// input, and must keep every traced descendant path resolvable.
    /// On failure the model is left unchanged.
    pub fn replace_unit(&mut self, id: &str, unit: Module) -> OptResult<Module> {
        let entry = self
            .node_map
            .get(id)
            .ok_or_else(|| OptimizeError::NodeNotFound(id.to_string()))?;

        let output = unit.output_shape(&entry.input_shape).map_err(|e| match e {
            OptimizeError::ShapeMismatch(msg) => {
                OptimizeError::ShapeMismatch(format!("replacement for '{}': {}", id, msg))
            }
            other => other,
        })?;
        if output != entry.output_shape {
            return Err(OptimizeError::ShapeMismatch(format!(
                "replacement for '{}' produces {}, expected {}",
                id,
                format_shape(&output),
                format_shape(&entry.output_shape)
            )));
        }

        let node_id = entry.id.clone();
        let descendants: Vec<NodeId> = self
            .node_map
            .keys()
            .filter(|k| node_id.is_ancestor_of(k.as_str()))
            .cloned()
            .collect();

        let input = entry.input_shape.clone();
        let old = self.model.replace(id, unit)?;

        if let Some(missing) = descendants
            .iter()
            .find(|d| !self.model.contains(d.as_str()))
            .cloned()
        {
            self.model.replace(id, old)?;
            return Err(OptimizeError::InvalidPath(format!(
                "replacement for '{}' drops traced node '{}'",
                id, missing
            )));
        }

        let mut shapes = Vec::new();
        let retraced = match self.model.get(id) {
            Some(live) => retrace(live, id, input, &self.node_map, &mut shapes),
            None => Err(OptimizeError::InvalidPath(id.to_string())),
        };
        if let Err(e) = retraced {
            self.model.replace(id, old)?;
            return Err(e);
        }
        for (path, input_shape, output_shape) in shapes {
            if let Some(e) = self.node_map.get_mut(&path) {
                e.input_shape = input_shape;
                e.output_shape = output_shape;
            }
        }

        self.refresh_node(node_id.as_str());
        for d in &descendants {
            self.refresh_node(d.as_str());
        }
        self.refresh_ancestors(node_id.as_str());

        debug!(
            node = %node_id,
            old = old.kind(),
            new = self.node_map.get(id).map(|e| e.kind).unwrap_or("?"),
            "replaced unit"
        );

        Ok(old)
    }

    /// Re-read a node's metadata from the live model
    pub(crate) fn refresh_node(&mut self, id: &str) {
        if let (Some(entry), Some(unit)) = (self.node_map.get_mut(id), self.model.get(id)) {
            entry.refresh(unit);
        }
    }

    /// Refresh every enclosing container up to the top level
    pub(crate) fn refresh_ancestors(&mut self, id: &str) {
        let mut parent = self.node_map.get(id).and_then(|e| e.parent.clone());
        while let Some(p) = parent {
            self.refresh_node(p.as_str());
            parent = self.node_map.get(p.as_str()).and_then(|e| e.parent.clone());
        }
    }
}

/// Recompute traced shapes below a substituted unit
///
/// Expanded containers are walked child by child; every traced path gets
/// its new `(input, output)` pair pushed onto `shapes`.
fn retrace(
    unit: &Module,
    path: &str,
    input: Vec<usize>,
    nodes: &NodeMap,
    shapes: &mut Vec<(NodeId, Vec<usize>, Vec<usize>)>,
) -> OptResult<Vec<usize>> {
    let expanded = nodes.get(path).is_some_and(|e| !e.is_leaf);
    let output = match unit {
        Module::Sequential(seq) if expanded => {
            let mut shape = input.clone();
            for (name, child) in &seq.children {
                let child_path = join_path(path, name);
                shape = if nodes.contains_key(child_path.as_str()) {
                    retrace(child, &child_path, shape, nodes, shapes)?
                } else {
                    child.output_shape(&shape)?
                };
            }
            shape
        }
        _ => unit.output_shape(&input).map_err(|e| match e {
            OptimizeError::ShapeMismatch(msg) => {
                OptimizeError::ShapeMismatch(format!("at node '{}': {}", path, msg))
            }
            other => other,
        })?,
    };
    if nodes.contains_key(path) {
        shapes.push((NodeId::new(path), input, output.clone()));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use crate::error::OptimizeError;
    use crate::graph::{get_graph, Device};
    use crate::model::zoo::lenet5;
    use crate::model::{Conv2d, Linear, Module, Sequential};

    #[test]
    fn test_replace_unit_keeps_id() {
        let mut model = lenet5(0);
        let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();

        let old = graph
            .replace_unit("classifier.1", Module::Dropout { p: 0.1 })
            .unwrap();
        assert_eq!(old.kind(), "ReLU");

        let node = graph.find_node_by_id("classifier.1").unwrap();
        assert_eq!(node.kind(), "Dropout");
        assert_eq!(node.unit().kind(), "Dropout");
        assert_eq!(graph.node_count(), 14);
        drop(graph);

        assert_eq!(model.get("classifier.1").unwrap().kind(), "Dropout");
    }

    #[test]
    fn test_replace_unit_refreshes_ancestors() {
        let mut model = lenet5(0);
        let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();
        let before = graph.find_node_by_id("classifier").unwrap().entry().num_params;

        // same shape, no bias
        graph
            .replace_unit("classifier.4", Module::Linear(Linear::new(84, 10, false)))
            .unwrap();

        let after = graph.find_node_by_id("classifier").unwrap().entry().num_params;
        assert_eq!(before - after, 10);
    }

    #[test]
    fn test_replace_unit_rejects_shape_change() {
        let mut model = lenet5(0);
        let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();

        let err = graph
            .replace_unit("classifier.4", Module::Linear(Linear::new(84, 12, true)))
            .unwrap_err();
        assert!(matches!(err, OptimizeError::ShapeMismatch(_)));
        assert_eq!(
            graph.find_node_by_id("classifier.4").unwrap().output_shape(),
            &[1, 10]
        );
    }

    #[test]
    fn test_replace_unit_rejects_dropped_descendants() {
        let mut model = lenet5(0);
        let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();

        let replacement = Sequential::new().push("head", Module::Linear(Linear::new(256, 10, true)));
        let err = graph
            .replace_unit("classifier", Module::Sequential(replacement))
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidPath(_)));
        assert_eq!(graph.find_node_by_id("classifier.0").unwrap().kind(), "Linear");
    }

    #[test]
    fn test_replace_container_retraces_children() {
        let mut model = lenet5(0);
        let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();

        // a 3x3 first conv still lands on [1, 16, 4, 4] after the second pool
        let mut features = match graph.model().get("features") {
            Some(Module::Sequential(seq)) => seq.clone(),
            other => panic!("unexpected module {:?}", other),
        };
        features
            .children
            .insert("0".to_string(), Module::Conv2d(Conv2d::new(1, 6, 3, true)));

        graph
            .replace_unit("features", Module::Sequential(features))
            .unwrap();

        let conv1 = graph.find_node_by_id("features.0").unwrap();
        assert_eq!(conv1.output_shape(), &[1, 6, 26, 26]);
        let pool1 = graph.find_node_by_id("features.2").unwrap();
        assert_eq!(pool1.input_shape(), &[1, 6, 26, 26]);
        assert_eq!(pool1.output_shape(), &[1, 6, 13, 13]);
        let conv2 = graph.find_node_by_id("features.3").unwrap();
        assert_eq!(conv2.input_shape(), &[1, 6, 13, 13]);
        assert_eq!(conv2.output_shape(), &[1, 16, 9, 9]);
        assert_eq!(
            graph.find_node_by_id("features").unwrap().output_shape(),
            &[1, 16, 4, 4]
        );
    }

    #[test]
    fn test_replace_unknown_node() {
        let mut model = lenet5(0);
        let mut graph = get_graph(&mut model, &[1, 1, 28, 28], 1, Device::Cpu).unwrap();
        let err = graph.replace_unit("features.0", Module::Flatten).unwrap_err();
        assert!(matches!(err, OptimizeError::NodeNotFound(_)));
    }
}
