//! Printable graph summary
//!
//! Renders a traced graph as a layer table in the familiar model-summary
//! layout: one row per node with its `type: depth-index` label, id, output
//! shape and parameter count, followed by totals.

use std::fmt;

use thousands::Separable;

use crate::model::Module;
use crate::tensor::format_shape;

use super::context::ModelGraph;

const RULE_WIDTH: usize = 96;

/// One row of the summary table
#[derive(Debug, Clone)]
pub struct SummaryRow {
    /// Tree-indented `Kind: depth-index` label
    pub label: String,
    /// Node identifier
    pub id: String,
    /// Output shape
    pub output_shape: Vec<usize>,
    /// Parameter count, `None` for expanded containers
    pub params: Option<usize>,
    /// Quantization label for quantized units (`int8 weight_only`)
    pub quant: Option<String>,
}

/// Summary of a traced graph
#[derive(Debug, Clone)]
pub struct GraphSummary {
    /// Model name
    pub model_name: String,
    /// Traced input size
    pub input_size: Vec<usize>,
    /// Rows in trace order
    pub rows: Vec<SummaryRow>,
    /// Total trainable parameters
    pub total_params: usize,
    /// Number of quantized units
    pub quantized_units: usize,
    /// Parameter storage in bytes
    pub storage_bytes: usize,
}

fn quant_label(unit: &Module) -> Option<String> {
    match unit {
        Module::QuantConv2d(q) => Some(format!("{} {}", q.weight.params, q.strategy)),
        Module::QuantLinear(q) => Some(format!("{} {}", q.weight.params, q.strategy)),
        Module::Sequential(_) if unit.quantized_count() > 0 => {
            Some(format!("{} quantized", unit.quantized_count()))
        }
        _ => None,
    }
}

impl<'m> ModelGraph<'m> {
    /// Build a printable summary
    pub fn summary(&self) -> GraphSummary {
        let rows = self
            .nodes()
            .map(|node| {
                let indent = if node.depth() > 1 {
                    format!("{}└─", "│    ".repeat(node.depth() - 1))
                } else {
                    "├─".to_string()
                };
                SummaryRow {
                    label: format!("{}{}: {}", indent, node.kind(), node.entry().depth_index()),
                    id: node.id().to_string(),
                    output_shape: node.output_shape().to_vec(),
                    params: node.is_leaf().then(|| node.entry().num_params),
                    quant: quant_label(node.unit()),
                }
            })
            .collect();

        GraphSummary {
            model_name: self.model.name.clone(),
            input_size: self.input_size.clone(),
            rows,
            total_params: self.total_params(),
            quantized_units: self.quantized_node_count(),
            storage_bytes: self.storage_bytes(),
        }
    }
}

impl fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heavy = "=".repeat(RULE_WIDTH);
        writeln!(f, "{}", heavy)?;
        writeln!(
            f,
            "{:<36}{:<18}{:<18}{:>12}  {}",
            "Layer (type:depth-idx)", "Node id", "Output Shape", "Param #", "Quant"
        )?;
        writeln!(f, "{}", heavy)?;
        writeln!(
            f,
            "{:<36}{:<18}{:<18}{:>12}",
            self.model_name,
            "",
            format_shape(&self.input_size),
            "--"
        )?;

        for row in &self.rows {
            let params = row
                .params
                .map(|p| p.separate_with_commas())
                .unwrap_or_else(|| "--".to_string());
            let line = format!(
                "{:<36}{:<18}{:<18}{:>12}",
                row.label,
                row.id,
                format_shape(&row.output_shape),
                params
            );
            match &row.quant {
                Some(q) => writeln!(f, "{}  {}", line, q)?,
                None => writeln!(f, "{}", line.trim_end())?,
            }
        }

        writeln!(f, "{}", heavy)?;
        writeln!(f, "Total params: {}", self.total_params.separate_with_commas())?;
        writeln!(f, "Quantized units: {}", self.quantized_units)?;
        writeln!(
            f,
            "Parameter storage: {} bytes",
            self.storage_bytes.separate_with_commas()
        )?;
        write!(f, "{}", heavy)
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{get_graph, Device};
    use crate::model::zoo::lenet5;

    #[test]
    fn test_summary_rows() {
        let mut model = lenet5(0);
        let graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();
        let summary = graph.summary();

        assert_eq!(summary.rows.len(), 14);
        assert_eq!(summary.total_params, 44_426);
        assert!(summary.rows[0].params.is_none()); // expanded container
        assert_eq!(summary.rows[1].params, Some(156));
        assert!(summary.rows[1].label.ends_with("Conv2d: 2-1"));
    }

    #[test]
    fn test_summary_display() {
        let mut model = lenet5(0);
        let graph = get_graph(&mut model, &[1, 1, 28, 28], 2, Device::Cpu).unwrap();
        let text = graph.summary().to_string();

        assert!(text.contains("LeNet5"));
        assert!(text.contains("Total params: 44,426"));
        assert!(text.contains("classifier.4"));
        assert!(text.contains("[1, 16, 8, 8]"));
        assert!(text.contains("Quantized units: 0"));
    }
}
