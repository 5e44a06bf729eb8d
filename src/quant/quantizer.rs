//! Whole-model and single-node quantization
//!
//! Both paths share the same unit conversion: eligible `Conv2d` and `Linear`
//! units are swapped for their quantized counterparts at the same path.
//! Containers are handled by converting every eligible descendant.

use std::fmt;

use thousands::Separable;
use tracing::{info, warn};

use super::repr::{QuantParams, Representation};
use super::strategy::{strategy_by_name, QuantizationStrategy};
use crate::error::{OptResult, OptimizeError};
use crate::graph::ModelGraph;
use crate::model::{join_path, Model, Module, Sequential, PATH_SEPARATOR};

/// Options for whole-model quantization
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeOptions {
    /// Strategy name
    pub strategy: String,
    /// Representation kind
    pub representation: Representation,
    /// Bit width
    pub bits: u8,
    /// Path prefixes left in full precision
    pub exclude: Vec<String>,
}

impl QuantizeOptions {
    /// Options without exclusions
    pub fn new(strategy: impl Into<String>, representation: Representation, bits: u8) -> Self {
        Self {
            strategy: strategy.into(),
            representation,
            bits,
            exclude: Vec::new(),
        }
    }

    /// Leave a path (and everything under it) unquantized
    pub fn exclude(mut self, prefix: impl Into<String>) -> Self {
        self.exclude.push(prefix.into());
        self
    }
}

/// Outcome of a quantization run
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeReport {
    /// Strategy used
    pub strategy: String,
    /// Representation and width used
    pub params: QuantParams,
    /// Paths of units converted in this run
    pub quantized: Vec<String>,
    /// Paths of units that were already quantized
    pub skipped: Vec<String>,
    /// Paths of eligible units left alone because of an exclusion
    pub excluded: Vec<String>,
    /// Parameter storage before the run, in bytes
    pub storage_before: usize,
    /// Parameter storage after the run, in bytes
    pub storage_after: usize,
}

impl QuantizeReport {
    fn new(strategy: &str, params: QuantParams) -> Self {
        Self {
            strategy: strategy.to_string(),
            params,
            quantized: Vec::new(),
            skipped: Vec::new(),
            excluded: Vec::new(),
            storage_before: 0,
            storage_after: 0,
        }
    }

    /// Storage reduction factor (`before / after`)
    pub fn compression_ratio(&self) -> f64 {
        if self.storage_after == 0 {
            1.0
        } else {
            self.storage_before as f64 / self.storage_after as f64
        }
    }
}

impl fmt::Display for QuantizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): quantized {}, skipped {}, excluded {}, storage {} -> {} bytes ({:.2}x)",
            self.strategy,
            self.params,
            self.quantized.len(),
            self.skipped.len(),
            self.excluded.len(),
            self.storage_before.separate_with_commas(),
            self.storage_after.separate_with_commas(),
            self.compression_ratio()
        )
    }
}

fn is_excluded(path: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|prefix| {
        path == prefix
            || (path.starts_with(prefix.as_str())
                && path[prefix.len()..].starts_with(PATH_SEPARATOR))
    })
}

/// Convert every eligible unit under `seq` in place
fn quantize_tree(
    seq: &mut Sequential,
    prefix: &str,
    strategy: &dyn QuantizationStrategy,
    params: QuantParams,
    exclude: &[String],
    report: &mut QuantizeReport,
) -> OptResult<()> {
    for (name, child) in seq.children.iter_mut() {
        let path = join_path(prefix, name);

        if let Module::Sequential(inner) = child {
            quantize_tree(inner, &path, strategy, params, exclude, report)?;
            continue;
        }
        if !child.is_quantizable() && !child.is_quantized() {
            continue;
        }
        if is_excluded(&path, exclude) {
            report.excluded.push(path);
        } else if child.is_quantized() {
            warn!(node = %path, "unit already quantized, skipping");
            report.skipped.push(path);
        } else {
            *child = strategy.quantize_module(&path, child, params)?;
            report.quantized.push(path);
        }
    }
    Ok(())
}

/// Quantize every eligible unit of `model`
///
/// Consumes the model and returns the quantized one. Already quantized
/// units are skipped.
pub fn quantize(
    mut model: Model,
    strategy: &str,
    representation: Representation,
    bits: u8,
) -> OptResult<Model> {
    let options = QuantizeOptions::new(strategy, representation, bits);
    quantize_with_options(&mut model, &options)?;
    Ok(model)
}

/// Quantize `model` in place and report what changed
pub fn quantize_with_options(
    model: &mut Model,
    options: &QuantizeOptions,
) -> OptResult<QuantizeReport> {
    let strategy = strategy_by_name(&options.strategy)?;
    let params = QuantParams::new(options.representation, options.bits)?;

    let mut report = QuantizeReport::new(strategy.name(), params);
    report.storage_before = model.storage_bytes();

    quantize_tree(
        &mut model.root,
        "",
        strategy,
        params,
        &options.exclude,
        &mut report,
    )?;

    report.storage_after = model.storage_bytes();

    info!(
        model = %model.name,
        strategy = strategy.name(),
        params = %params,
        quantized = report.quantized.len(),
        skipped = report.skipped.len(),
        excluded = report.excluded.len(),
        "quantized model"
    );

    Ok(report)
}

/// Quantize the unit behind a single graph node
///
/// The node keeps its identifier; the live model is updated in place and
/// the new unit is returned. Container nodes have every eligible
/// descendant converted.
pub fn quantize_node<'g>(
    node_id: &str,
    graph: &'g mut ModelGraph<'_>,
    strategy: &str,
    representation: Representation,
    bits: u8,
) -> OptResult<&'g Module> {
    let strategy = strategy_by_name(strategy)?;
    let params = QuantParams::new(representation, bits)?;

    let node = graph.find_node_by_id(node_id)?;
    let replacement = match node.unit() {
        Module::Sequential(seq) => {
            let mut copy = seq.clone();
            let mut report = QuantizeReport::new(strategy.name(), params);
            quantize_tree(&mut copy, node_id, strategy, params, &[], &mut report)?;

            if report.quantized.is_empty() {
                return Err(if report.skipped.is_empty() {
                    OptimizeError::NotQuantizable {
                        id: node_id.to_string(),
                        kind: node.kind(),
                    }
                } else {
                    OptimizeError::AlreadyQuantized(node_id.to_string())
                });
            }
            Module::Sequential(copy)
        }
        unit => strategy.quantize_module(node_id, unit, params)?,
    };

    graph.replace_unit(node_id, replacement)?;

    info!(
        node = node_id,
        strategy = strategy.name(),
        params = %params,
        "quantized node"
    );

    graph
        .model()
        .get(node_id)
        .ok_or_else(|| OptimizeError::NodeNotFound(node_id.to_string()))
}
