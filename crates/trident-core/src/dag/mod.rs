//! DAG construction, cycle detection, execution-level computation, edge
//! mapping validation, and recursive sub-workflow validation.

mod builder;
mod validate;

pub use builder::{build, resolve_node, DagNode, WorkflowDag};
pub use validate::{validate_mappings, validate_subworkflows, MappingWarning};
