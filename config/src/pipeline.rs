use crate::{
    passes::{
        DistinguishedNames,
        KeyNormalization,
        MetricNames,
        ReplicatePerServer,
        ReservedKeyDisambiguation,
    },
    ConfigError,
    ConfigNode,
};

/// One rewrite step over the whole configuration tree.
///
/// Passes must be total for any well-typed tree: a missing optional field is
/// never an error, only a violated required-field rule is.
pub trait ConfigTransformer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn transform(&self, tree: ConfigNode) -> Result<ConfigNode, ConfigError>;
}

/// An ordered list of passes. The output of each pass is the input of the
/// next.
pub struct TransformPipeline {
    passes: Vec<Box<dyn ConfigTransformer>>,
}

impl TransformPipeline {
    pub fn new(passes: Vec<Box<dyn ConfigTransformer>>) -> Self {
        Self { passes }
    }

    /// The passes that need no server connection, in their required order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(KeyNormalization::new()),
            Box::new(ReservedKeyDisambiguation),
            Box::new(ReplicatePerServer),
            Box::new(DistinguishedNames),
            Box::new(MetricNames),
        ])
    }

    pub fn push(&mut self, pass: impl ConfigTransformer + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(&self, tree: ConfigNode) -> Result<ConfigNode, ConfigError> {
        self.passes.iter().try_fold(tree, |tree, pass| {
            debug!(pass = pass.name(), "applying configuration pass");
            pass.transform(tree)
        })
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("passes", &self.names())
            .finish()
    }
}
