use std::collections::{BTreeMap, BTreeSet};

use crate::dag::builder::{build, resolve_node, WorkflowDag};
use crate::error::{Result, TridentError};
use crate::model::{FieldType, Node, NodeKind, OutputFormat, Project};

/// A non-fatal mapping issue: an edge whose declared mapping doesn't line
/// up with the endpoints' field contracts. In non-strict mode these are
/// reported to the caller; `project validate --strict` promotes them to
/// errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingWarning {
    pub edge_id: String,
    pub node_id: String,
    pub message: String,
}

impl std::fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "edge '{}' -> node '{}': {}", self.edge_id, self.node_id, self.message)
    }
}

/// The fields a node kind produces, per spec.md §4.1's table. `None` as a
/// field's type means "untyped" (no type-compatibility check applies); the
/// map itself being absent would mean "unknown kind", which never happens
/// for a resolved node.
fn produced_fields(project: &Project, node_id: &str) -> BTreeMap<String, Option<FieldType>> {
    let mut fields = BTreeMap::new();
    match resolve_node(project, node_id) {
        Some(Node::Input(n)) => {
            for (name, schema) in n.schema {
                fields.insert(name, Some(schema.field_type));
            }
        }
        Some(Node::Output(_)) => {}
        Some(Node::Prompt(p)) => {
            fields.insert("text".to_string(), None);
            if p.output.format == OutputFormat::Json {
                for (name, schema) in p.output.schema {
                    fields.insert(name, Some(schema.field_type));
                }
            }
        }
        Some(Node::Tool(_)) => {
            fields.insert("output".to_string(), None);
        }
        Some(Node::Agent(_)) => {
            // Best-effort: an agent's prompt may declare a json schema too,
            // but resolving `prompt_file` to a parsed PromptNode requires a
            // loader this static check doesn't have. `text` always applies.
            fields.insert("text".to_string(), None);
        }
        Some(Node::Branch(_)) => {
            fields.insert("output".to_string(), None);
            fields.insert("text".to_string(), None);
        }
        Some(Node::Trigger(_)) => {
            fields.insert("triggered".to_string(), None);
            fields.insert("status".to_string(), None);
            fields.insert("output".to_string(), None);
        }
        None => {}
    }
    fields
}

/// The fields a node kind expects on its inputs, typed. `None` means
/// "accepts anything" (no expected-field validation applies).
fn expected_fields(project: &Project, node_id: &str) -> Option<BTreeMap<String, FieldType>> {
    match resolve_node(project, node_id) {
        Some(Node::Prompt(p)) => {
            Some(p.inputs.iter().map(|(k, v)| (k.clone(), v.field_type)).collect())
        }
        _ => None,
    }
}

/// Check every edge's field mappings against the declared field contracts
/// of both endpoints, and flag prompt nodes with unmapped required inputs.
pub fn validate_mappings(project: &Project, dag: &WorkflowDag) -> Vec<MappingWarning> {
    let mut warnings = Vec::new();

    for dag_node in dag.nodes.values() {
        let expected = expected_fields(project, &dag_node.id);
        let mut satisfied: BTreeSet<String> = BTreeSet::new();

        for edge in &dag_node.in_edges {
            let produced = produced_fields(project, &edge.from_node);

            for mapping in &edge.mappings {
                let field_name =
                    mapping.source_expr.split('.').next().unwrap_or(&mapping.source_expr);

                let Some(source_type) = produced.get(field_name) else {
                    warnings.push(MappingWarning {
                        edge_id: edge.id.clone(),
                        node_id: dag_node.id.clone(),
                        message: format!(
                            "source field '{field_name}' is not produced by node '{}'",
                            edge.from_node
                        ),
                    });
                    continue;
                };

                let Some(expected_map) = &expected else {
                    continue;
                };
                let Some(target_type) = expected_map.get(&mapping.target_var) else {
                    warnings.push(MappingWarning {
                        edge_id: edge.id.clone(),
                        node_id: dag_node.id.clone(),
                        message: format!(
                            "target_var '{}' is not an expected input of this node",
                            mapping.target_var
                        ),
                    });
                    continue;
                };
                satisfied.insert(mapping.target_var.clone());

                if let Some(source_type) = source_type {
                    if !target_type.compatible_with(*source_type) {
                        warnings.push(MappingWarning {
                            edge_id: edge.id.clone(),
                            node_id: dag_node.id.clone(),
                            message: format!(
                                "'{}' expects {target_type:?} but source field '{field_name}' on '{}' is {source_type:?}",
                                mapping.target_var, edge.from_node
                            ),
                        });
                    }
                }
            }
        }

        if dag_node.kind == NodeKind::Prompt {
            if let Some(Node::Prompt(prompt)) = resolve_node(project, &dag_node.id) {
                for (name, decl) in &prompt.inputs {
                    if decl.required && decl.default.is_none() && !satisfied.contains(name) {
                        warnings.push(MappingWarning {
                            edge_id: String::new(),
                            node_id: dag_node.id.clone(),
                            message: format!(
                                "required input '{name}' has no default and is never mapped"
                            ),
                        });
                    }
                }
            }
        }
    }

    warnings
}

/// Recursively validate branch and trigger sub-workflow references: the
/// referenced project must parse and build a valid DAG, and no structural
/// cycle may exist among file-referenced sub-workflows. Branch nodes whose
/// `workflow_path` is the `self` sentinel recurse into their own project
/// (the loop mechanism) and are not treated as a cycle.
pub fn validate_subworkflows<F>(project: &Project, load: F) -> Result<()>
where
    F: Fn(&str) -> Result<Project> + Copy,
{
    let root_key = project.root.to_string_lossy().to_string();
    let mut visited = BTreeSet::new();
    visited.insert(root_key);
    validate_subworkflows_inner(project, load, &mut visited)
}

fn validate_subworkflows_inner<F>(project: &Project, load: F, visited: &mut BTreeSet<String>) -> Result<()>
where
    F: Fn(&str) -> Result<Project> + Copy,
{
    for branch in project.branches.values() {
        if branch.workflow_path == "self" {
            continue;
        }
        validate_referenced_workflow(&branch.workflow_path, load, visited)?;
    }
    for trigger in project.triggers.values() {
        validate_referenced_workflow(&trigger.workflow_path, load, visited)?;
    }
    Ok(())
}

fn validate_referenced_workflow<F>(path: &str, load: F, visited: &mut BTreeSet<String>) -> Result<()>
where
    F: Fn(&str) -> Result<Project> + Copy,
{
    if visited.contains(path) {
        return Err(TridentError::Validation(format!(
            "cycle detected in sub-workflow references at '{path}'"
        )));
    }
    let sub = load(path)?;
    build(&sub)?;
    visited.insert(path.to_string());
    validate_subworkflows_inner(&sub, load, visited)?;
    visited.remove(path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, FieldMapping, FieldSchema, FieldType, OutputFormat, PromptInput, PromptNode, PromptOutput};
    use std::collections::BTreeMap as Map;

    fn base_project() -> Project {
        Project {
            name: "test".into(),
            root: "/tmp".into(),
            version: "1".into(),
            defaults: Default::default(),
            entrypoints: vec![],
            orchestration: Default::default(),
            inputs: Map::new(),
            outputs: Map::new(),
            prompts: Map::new(),
            tools: Map::new(),
            agents: Map::new(),
            branches: Map::new(),
            triggers: Map::new(),
            edges: Map::new(),
        }
    }

    #[test]
    fn missing_required_input_is_warned() {
        let mut p = base_project();
        let mut inputs = Map::new();
        inputs.insert(
            "topic".to_string(),
            PromptInput { field_type: FieldType::String, description: String::new(), required: true, default: None },
        );
        p.prompts.insert(
            "summarize".into(),
            PromptNode {
                id: "summarize".into(),
                model: None,
                temperature: None,
                max_tokens: None,
                inputs,
                output: PromptOutput::default(),
                body: "{{topic}}".into(),
            },
        );
        let dag = build(&p).unwrap();
        let warnings = validate_mappings(&p, &dag);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("required input 'topic'"));
    }

    #[test]
    fn type_mismatch_across_json_outputs_is_warned() {
        let mut p = base_project();
        let mut from_schema = Map::new();
        from_schema.insert("count".to_string(), FieldSchema { field_type: FieldType::Boolean, description: String::new() });
        p.prompts.insert(
            "a".into(),
            PromptNode {
                id: "a".into(),
                model: None,
                temperature: None,
                max_tokens: None,
                inputs: Map::new(),
                output: PromptOutput { format: OutputFormat::Json, schema: from_schema },
                body: "x".into(),
            },
        );
        let mut to_inputs = Map::new();
        to_inputs.insert(
            "n".to_string(),
            PromptInput { field_type: FieldType::Integer, description: String::new(), required: true, default: None },
        );
        p.prompts.insert(
            "b".into(),
            PromptNode {
                id: "b".into(),
                model: None,
                temperature: None,
                max_tokens: None,
                inputs: to_inputs,
                output: PromptOutput::default(),
                body: "{{n}}".into(),
            },
        );
        p.edges.insert(
            "e1".into(),
            Edge {
                id: "e1".into(),
                from_node: "a".into(),
                to_node: "b".into(),
                mappings: vec![FieldMapping { target_var: "n".into(), source_expr: "count".into() }],
                condition: None,
            },
        );
        let dag = build(&p).unwrap();
        let warnings = validate_mappings(&p, &dag);
        assert!(warnings.iter().any(|w| w.message.contains("but source field 'count'")));
    }

    #[test]
    fn unproduced_source_field_is_warned() {
        use crate::model::{InputNode, OutputNode};
        let mut p = base_project();
        p.inputs.insert(
            "in".into(),
            InputNode {
                id: "in".into(),
                schema: {
                    let mut m = Map::new();
                    m.insert("x".to_string(), FieldSchema { field_type: FieldType::Integer, description: String::new() });
                    m
                },
            },
        );
        p.outputs.insert("out".into(), OutputNode { id: "out".into(), format: None });
        p.edges.insert(
            "e1".into(),
            Edge {
                id: "e1".into(),
                from_node: "in".into(),
                to_node: "out".into(),
                mappings: vec![FieldMapping { target_var: "y".into(), source_expr: "nonexistent".into() }],
                condition: None,
            },
        );
        let dag = build(&p).unwrap();
        let warnings = validate_mappings(&p, &dag);
        assert!(warnings.iter().any(|w| w.message.contains("not produced by node 'in'")));
    }

    #[test]
    fn output_node_accepts_any_target_var() {
        use crate::model::{InputNode, OutputNode};
        let mut p = base_project();
        p.inputs.insert(
            "in".into(),
            InputNode {
                id: "in".into(),
                schema: {
                    let mut m = Map::new();
                    m.insert("x".to_string(), FieldSchema { field_type: FieldType::Integer, description: String::new() });
                    m
                },
            },
        );
        p.outputs.insert("out".into(), OutputNode { id: "out".into(), format: None });
        p.edges.insert(
            "e1".into(),
            Edge {
                id: "e1".into(),
                from_node: "in".into(),
                to_node: "out".into(),
                mappings: vec![FieldMapping { target_var: "anything_goes".into(), source_expr: "x".into() }],
                condition: None,
            },
        );
        let dag = build(&p).unwrap();
        let warnings = validate_mappings(&p, &dag);
        assert!(warnings.is_empty());
    }

    #[test]
    fn self_referencing_branch_is_not_a_cycle() {
        use crate::model::BranchNode;
        let mut p = base_project();
        p.branches.insert(
            "loop".into(),
            BranchNode { id: "loop".into(), workflow_path: "self".into(), condition: None, loop_while: None, max_iterations: 10 },
        );
        let result = validate_subworkflows(&p, |_path| unreachable!("self should never be loaded"));
        assert!(result.is_ok());
    }
}
