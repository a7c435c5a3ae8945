#![doc = include_str!("../README.md")]

pub mod antitear;
pub mod catalogue;
pub mod graph;
pub mod ops;

pub use antitear::AntiTear;
pub use catalogue::{
    FieldKind, FilterKind, PARAM_BLOB_LEN, ParamField, UiHint, read_i16, read_u16, write_i16,
    write_u16,
};
pub use graph::{ChainBuildReport, FilterChain, FilterGraph, FilterNode, GraphRuntime, NodeId};
pub use ops::OpContext;

/// Errors raised while editing, loading, or traversing a filter graph.
///
/// # Example
/// ```rust
/// use scanline_filter::GraphError;
///
/// let err = GraphError::UnknownFilterName("emboss".into());
/// assert!(err.to_string().contains("emboss"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A chain loops back onto a node already in it.
    #[error("filter chain contains a cycle at node {0}")]
    CycleDetected(u32),
    /// A filter name did not match the catalogue.
    #[error("unknown filter name '{0}'")]
    UnknownFilterName(String),
}

pub mod prelude {
    pub use crate::{
        AntiTear, ChainBuildReport, FieldKind, FilterChain, FilterGraph, FilterKind, FilterNode,
        GraphError, GraphRuntime, NodeId, OpContext, PARAM_BLOB_LEN, ParamField, UiHint,
    };
}
