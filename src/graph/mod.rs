// Pipeline Graph Module
// Sequential state-graph for answering one question

pub mod builder;
pub mod node;
pub mod runtime;
pub mod state;

pub mod nodes;

pub use builder::build_mentor_graph;
pub use node::{GraphError, Node, NodeContext, NodeOutput};
pub use runtime::GraphRuntime;
pub use state::{AnswerSource, BlockDetail, PipelineState, Stage};
