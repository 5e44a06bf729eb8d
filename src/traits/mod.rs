//! Core traits for quantgraph
//!
//! Defines the fundamental interface for model-level transformations.

use crate::error::OptResult;
use crate::model::Model;

/// Transform trait for model-level optimizations
///
/// This is the core abstraction for everything the pipeline can run.
/// Implementations take ownership of a model and return the transformed one.
///
/// # Example
///
/// ```ignore
/// struct Rename;
///
/// impl ModelTransform for Rename {
///     fn name(&self) -> &str {
///         "rename"
///     }
///
///     fn transform(&self, mut model: Model) -> OptResult<Model> {
///         model.name.push_str("_opt");
///         Ok(model)
///     }
/// }
/// ```
pub trait ModelTransform {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Transform the given model
    ///
    /// # Arguments
    /// * `model` - The input model
    ///
    /// # Returns
    /// * `OptResult<Model>` - The transformed model or an error
    fn transform(&self, model: Model) -> OptResult<Model>;
}

/// Chainable transform that applies multiple transforms in sequence
#[derive(Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn ModelTransform>>,
}

impl TransformChain {
    /// Create a new empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform to the chain
    #[allow(clippy::should_implement_trait)]
    pub fn add<T: ModelTransform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Add an already boxed transform
    pub fn add_boxed(mut self, transform: Box<dyn ModelTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Number of transforms
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl ModelTransform for TransformChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn transform(&self, mut model: Model) -> OptResult<Model> {
        for transform in &self.transforms {
            tracing::debug!(transform = transform.name(), "running transform");
            model = transform.transform(model)?;
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rename(&'static str);

    impl ModelTransform for Rename {
        fn name(&self) -> &str {
            "rename"
        }

        fn transform(&self, mut model: Model) -> OptResult<Model> {
            model.name.push_str(self.0);
            Ok(model)
        }
    }

    #[test]
    fn test_single_transform() {
        let model = Rename("_a").transform(Model::new("m")).unwrap();
        assert_eq!(model.name, "m_a");
    }

    #[test]
    fn test_transform_chain_order() {
        let chain = TransformChain::new().add(Rename("_a")).add(Rename("_b"));
        assert_eq!(chain.len(), 2);

        let model = chain.transform(Model::new("m")).unwrap();
        assert_eq!(model.name, "m_a_b");
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = TransformChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.transform(Model::new("m")).unwrap(), Model::new("m"));
    }
}
