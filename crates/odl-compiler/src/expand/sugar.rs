//! The four sugar rewrites.
//!
//! Each rewrite replaces a sugar node with a `serial` wrapper at the
//! sugar's own path. Leftover user params stay on the wrapper; params the
//! rewrite consumes (`generator`, `samples`, `briefing`, ...) do not.
//!
//! Synthesized artifacts use the namespaces users cannot: verdict and
//! feedback documents carry the reserved `__Review_` infix, ensemble
//! drafts are private (`_` prefix). Both namespaces are rejected for user
//! declarations at the syntax stage, so collisions are impossible.

use indexmap::IndexMap;
use odl_types::{name, OpCode, StackPath, Value, Wiring, WorkerMode};

use super::{briefing, expand_children, expand_node};
use crate::ast::{Node, PathAllocator, SugarOp, SurfaceOp};
use crate::error::{CompileError, ErrorKind};

/// Loop break condition consumed by the kernel: terminate early once the
/// iteration's gating artifacts report success.
const BREAK_ON_SUCCESS: &str = "success";

/// Rounds an approval gate retries before the kernel reports exhaustion.
const DEFAULT_GATE_ROUNDS: i64 = 10;

/// `generate_team` => self-correcting loop.
///
/// ```text
/// serial (wrapper, sugar's path)
/// ├─ loop {count, break_on: success}
/// │  └─ serial
/// │     ├─ worker (generator)       inputs + Draft@prev + verdicts@prev -> Draft
/// │     └─ parallel
/// │        └─ worker (validator i)  inputs + Draft -> Draft__Review_{agent}
/// └─ scope_resolve                  elects the accepted Draft
/// ```
pub(super) fn generate_team(mut sugar: Node, path: StackPath) -> Result<Node, CompileError> {
    let generator = take_str(&mut sugar, "generator", &path)?;
    let validators = take_str_list(&mut sugar, "validators", &path)?;
    let rounds = take_int(&mut sugar, "loop", &path)?;
    let briefing = briefing::take(&mut sugar.params);
    let output = take_output(&mut sugar, &path)?;
    let inputs = std::mem::take(&mut sugar.wiring.inputs);

    let loop_path = path.child("loop", 0);
    let body_path = loop_path.child("serial", 0);

    let verdicts: Vec<String> = validators
        .iter()
        .map(|agent| name::review_artifact(&output, agent))
        .collect();

    // Generator: sees the declared inputs plus the prior round's draft
    // and every validator's prior verdict.
    let mut generator_inputs = inputs.clone();
    generator_inputs.push(format!("{output}@prev"));
    for verdict in &verdicts {
        generator_inputs.push(format!("{verdict}@prev"));
    }
    let generator_node = action(
        OpCode::Worker,
        body_path.child("worker", 0),
        briefing::merge(&briefing, &generator, briefing::system(&generator, WorkerMode::Generate)),
        generator_inputs,
        Some(output.clone()),
    );

    let parallel_path = body_path.child("parallel", 0);
    let validator_nodes = validators
        .iter()
        .zip(&verdicts)
        .enumerate()
        .map(|(i, (agent, verdict))| {
            let mut validator_inputs = inputs.clone();
            validator_inputs.push(output.clone());
            action(
                OpCode::Worker,
                parallel_path.child("worker", i),
                briefing::merge(&briefing, agent, briefing::system(agent, WorkerMode::Validate)),
                validator_inputs,
                Some(verdict.clone()),
            )
        })
        .collect();

    let body = container(
        OpCode::Serial,
        body_path,
        vec![
            generator_node,
            container(OpCode::Parallel, parallel_path, validator_nodes),
        ],
    );
    let loop_node = looping(loop_path, rounds, body);
    let elect = scope_resolve(path.child("scope_resolve", 0), &output);

    Ok(wrapper(sugar, path, vec![loop_node, elect]))
}

/// `approval_gate` => loop of contents + approver.
///
/// Only the gate's `contents` re-run on rejection; siblings authored
/// outside the gate stay outside the generated loop. The approver's
/// feedback from the prior round is injected into every contents-internal
/// producer of the target.
pub(super) fn approval_gate(mut sugar: Node, path: StackPath) -> Result<Node, CompileError> {
    let approver = take_str(&mut sugar, "approver", &path)?;
    let target = take_str(&mut sugar, "target", &path)?;
    let rounds = match sugar.params.shift_remove("max_rounds") {
        Some(Value::Int(n)) if n >= 1 => n,
        Some(other) => {
            return Err(CompileError::at(
                ErrorKind::MissingRequiredField,
                path,
                format!("'max_rounds' must be an integer >= 1, got {}", other.type_name()),
            ));
        }
        None => DEFAULT_GATE_ROUNDS,
    };
    let briefing = briefing::take(&mut sugar.params);
    let feedback = name::review_artifact(&target, &approver);
    let feedback_prev = format!("{feedback}@prev");

    let mut contents = std::mem::take(&mut sugar.children);
    for child in &mut contents {
        inject_feedback(child, &target, &feedback_prev);
        inject_self_reference(child);
    }

    let loop_path = path.child("loop", 0);
    let body_path = loop_path.child("serial", 0);

    let mut alloc = PathAllocator::new();
    let mut body_children = Vec::with_capacity(contents.len() + 1);
    for child in contents {
        let child_path = alloc.next(&body_path, child.op.physical());
        body_children.push(expand_node(child, child_path)?);
    }

    let mut approver_params =
        briefing::merge(&briefing, &approver, briefing::system(&approver, WorkerMode::Approve));
    approver_params.insert("target".to_string(), Value::from(target.as_str()));
    body_children.push(action(
        OpCode::Approver,
        alloc.next(&body_path, OpCode::Approver),
        approver_params,
        vec![
            target.clone(),
            format!("{target}@prev"),
            feedback_prev,
        ],
        Some(feedback),
    ));

    let body = container(OpCode::Serial, body_path, body_children);
    let loop_node = looping(loop_path, rounds, body);
    let elect = scope_resolve(path.child("scope_resolve", 0), &target);

    Ok(wrapper(sugar, path, vec![loop_node, elect]))
}

/// `ensemble` => parallel sampling + consolidation.
///
/// Draft identity derives from generator index and sample index, so the
/// expansion is deterministic and agent renames cannot shift it.
pub(super) fn ensemble(mut sugar: Node, path: StackPath) -> Result<Node, CompileError> {
    let generators = take_str_list(&mut sugar, "generators", &path)?;
    let consolidator = take_str(&mut sugar, "consolidator", &path)?;
    let samples = take_int(&mut sugar, "samples", &path)?;
    let briefing = briefing::take(&mut sugar.params);
    let output = take_output(&mut sugar, &path)?;
    let inputs = std::mem::take(&mut sugar.wiring.inputs);

    let parallel_path = path.child("parallel", 0);
    let mut drafts = Vec::new();
    let mut sampler_nodes = Vec::new();
    for (g, agent) in generators.iter().enumerate() {
        for s in 0..samples as usize {
            let draft = format!("_{output}__Draft_{g}_{s}");
            sampler_nodes.push(action(
                OpCode::Worker,
                parallel_path.child("worker", sampler_nodes.len()),
                briefing::merge(&briefing, agent, briefing::system(agent, WorkerMode::Generate)),
                inputs.clone(),
                Some(draft.clone()),
            ));
            drafts.push(draft);
        }
    }

    let mut consolidator_inputs = inputs;
    consolidator_inputs.extend(drafts);
    let consolidator_node = action(
        OpCode::Worker,
        path.child("worker", 0),
        briefing::merge(
            &briefing,
            &consolidator,
            briefing::system(&consolidator, WorkerMode::Consolidate),
        ),
        consolidator_inputs,
        Some(output),
    );

    Ok(wrapper(
        sugar,
        path,
        vec![
            container(OpCode::Parallel, parallel_path, sampler_nodes),
            consolidator_node,
        ],
    ))
}

/// `fan_out` => iterator_init + iterate over the worker template.
///
/// The source list is dynamic, so the template is compiled once and
/// cloned per item by the kernel; `$KEY`/`$ITEM` stay symbolic.
pub(super) fn fan_out(mut sugar: Node, path: StackPath) -> Result<Node, CompileError> {
    let source = take_str(&mut sugar, "source", &path)?;
    let item_key = take_str(&mut sugar, "item_key", &path)?;
    let strategy = take_str(&mut sugar, "strategy", &path)?;
    if sugar.children.len() != 1 {
        return Err(CompileError::at(
            ErrorKind::MissingRequiredField,
            path,
            format!(
                "fan_out requires exactly one worker template, found {}",
                sugar.children.len()
            ),
        ));
    }
    let Some(template) = sugar.children.pop() else {
        return Err(missing(&sugar, "worker", &path));
    };

    let mut init = Node::new(SurfaceOp::Primitive(OpCode::IteratorInit));
    init.path = Some(path.child("iterator_init", 0));
    init.params.insert("source".to_string(), Value::from(source.as_str()));
    init.params.insert("item_key".to_string(), Value::from(item_key.as_str()));
    init.wiring.inputs = vec![source];

    let iterate_path = path.child("iterate", 0);
    let mut iterate = Node::new(SurfaceOp::Primitive(OpCode::Iterate));
    iterate.params.insert("strategy".to_string(), Value::from(strategy.as_str()));
    iterate.params.insert("item_key".to_string(), Value::from(item_key.as_str()));
    iterate.children = expand_children(vec![template], &iterate_path)?;
    iterate.path = Some(iterate_path);

    Ok(wrapper(sugar, path, vec![init, iterate]))
}

// --- construction helpers ---

/// The `serial` wrapper standing where the sugar stood. Keeps whatever
/// params the rewrite did not consume.
fn wrapper(sugar: Node, path: StackPath, children: Vec<Node>) -> Node {
    let mut node = Node::new(SurfaceOp::Primitive(OpCode::Serial));
    node.params = sugar.params;
    node.children = children;
    node.path = Some(path);
    node
}

fn container(op: OpCode, path: StackPath, children: Vec<Node>) -> Node {
    let mut node = Node::new(SurfaceOp::Primitive(op));
    node.children = children;
    node.path = Some(path);
    node
}

fn action(
    op: OpCode,
    path: StackPath,
    params: IndexMap<String, Value>,
    inputs: Vec<String>,
    output: Option<String>,
) -> Node {
    let mut node = Node::new(SurfaceOp::Primitive(op));
    node.params = params;
    node.wiring = Wiring { inputs, output };
    node.path = Some(path);
    node
}

fn looping(path: StackPath, count: i64, body: Node) -> Node {
    let mut node = container(OpCode::Loop, path, vec![body]);
    node.params.insert("count".to_string(), Value::Int(count));
    node.params
        .insert("break_on".to_string(), Value::from(BREAK_ON_SUCCESS));
    node
}

/// The mediator electing a loop-internal artifact into the outer scope.
fn scope_resolve(path: StackPath, target: &str) -> Node {
    let mut node = Node::new(SurfaceOp::Primitive(OpCode::ScopeResolve));
    node.params.insert("target".to_string(), Value::from(target));
    node.params.insert("from_scope".to_string(), Value::from("loop"));
    node.params
        .insert("strategy".to_string(), Value::from("take_latest_success"));
    node.wiring = Wiring {
        inputs: vec![target.to_string()],
        output: Some(target.to_string()),
    };
    node.path = Some(path);
    node
}

/// Appends the approver's prior-round feedback to every producer of the
/// gate target inside the gate body: plain workers and the team/ensemble
/// sugars (whose rewrites forward inputs to their generators).
fn inject_feedback(node: &mut Node, target: &str, feedback_prev: &str) {
    let is_generator = matches!(
        node.op,
        SurfaceOp::Primitive(OpCode::Worker)
            | SurfaceOp::Sugar(SugarOp::GenerateTeam)
            | SurfaceOp::Sugar(SugarOp::Ensemble)
    );
    if is_generator
        && node.wiring.output.as_deref() == Some(target)
        && !node.wiring.inputs.iter().any(|i| i == feedback_prev)
    {
        node.wiring.inputs.push(feedback_prev.to_string());
    }
    for child in &mut node.children {
        inject_feedback(child, target, feedback_prev);
    }
}

/// Appends each producer's own prior-round output to its inputs, so a
/// rerun round sees the document it produced last round. Applies to
/// every plain worker and ensemble inside the gate body, whatever it
/// produces. `generate_team` is skipped (its expansion already wires
/// `{output}@prev` into the generator), and a nested `fan_out` template
/// iterates over items, not gate rounds.
fn inject_self_reference(node: &mut Node) {
    if node.op == SurfaceOp::Sugar(SugarOp::GenerateTeam) {
        return;
    }
    if matches!(
        node.op,
        SurfaceOp::Primitive(OpCode::Worker) | SurfaceOp::Sugar(SugarOp::Ensemble)
    ) {
        if let Some(output) = &node.wiring.output {
            let prev = format!("{output}@prev");
            if !node.wiring.inputs.iter().any(|i| i == &prev) {
                node.wiring.inputs.push(prev);
            }
        }
    }
    if node.op == SurfaceOp::Sugar(SugarOp::FanOut) {
        return;
    }
    for child in &mut node.children {
        inject_self_reference(child);
    }
}

// --- param extraction (syntax has already validated; these are defenses) ---

fn take_str(node: &mut Node, key: &str, path: &StackPath) -> Result<String, CompileError> {
    match node.params.shift_remove(key) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(missing(node, key, path)),
    }
}

fn take_str_list(node: &mut Node, key: &str, path: &StackPath) -> Result<Vec<String>, CompileError> {
    match node.params.shift_remove(key) {
        Some(Value::List(items)) if !items.is_empty() => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(missing(node, key, path)),
            })
            .collect(),
        _ => Err(missing(node, key, path)),
    }
}

fn take_int(node: &mut Node, key: &str, path: &StackPath) -> Result<i64, CompileError> {
    match node.params.shift_remove(key) {
        Some(Value::Int(n)) if n >= 1 => Ok(n),
        _ => Err(missing(node, key, path)),
    }
}

fn take_output(node: &mut Node, path: &StackPath) -> Result<String, CompileError> {
    node.wiring
        .output
        .take()
        .ok_or_else(|| missing(node, "output", path))
}

fn missing(node: &Node, key: &str, path: &StackPath) -> CompileError {
    CompileError::at(
        ErrorKind::MissingRequiredField,
        path.clone(),
        format!("'{}' is missing required '{key}'", node.op),
    )
}

#[cfg(test)]
mod tests {
    use super::super::expand;
    use crate::ast::Node;
    use crate::parse;
    use odl_types::{OpCode, Value};

    fn expand_yaml(source: &str) -> Node {
        let value: Value = serde_yaml::from_str(source).unwrap();
        expand(parse::parse(&value).expect("parse")).expect("expand")
    }

    fn find<'a>(node: &'a Node, path: &str) -> &'a Node {
        fn walk<'a>(node: &'a Node, path: &str) -> Option<&'a Node> {
            if node.path.as_ref().map(ToString::to_string).as_deref() == Some(path) {
                return Some(node);
            }
            node.children.iter().find_map(|c| walk(c, path))
        }
        walk(node, path).unwrap_or_else(|| panic!("no node at {path}"))
    }

    #[test]
    fn test_generate_team_shape() {
        let tree = expand_yaml(
            "generate_team: {generator: D, validators: [R], loop: 2, inputs: [Spec], output: Draft}\n",
        );

        let loop_node = find(&tree, "root/loop_0");
        assert_eq!(loop_node.op.physical(), OpCode::Loop);
        assert_eq!(loop_node.param_int("count"), Some(2));
        assert_eq!(loop_node.param_str("break_on"), Some("success"));

        let generator = find(&tree, "root/loop_0/serial_0/worker_0");
        assert_eq!(generator.param_str("agent"), Some("D"));
        assert_eq!(generator.param_str("mode"), Some("generate"));
        assert_eq!(generator.wiring.output.as_deref(), Some("Draft"));
        assert_eq!(
            generator.wiring.inputs,
            ["Spec", "Draft@prev", "Draft__Review_R@prev"]
        );

        let validator = find(&tree, "root/loop_0/serial_0/parallel_0/worker_0");
        assert_eq!(validator.param_str("agent"), Some("R"));
        assert_eq!(validator.param_str("mode"), Some("validate"));
        assert_eq!(validator.wiring.inputs, ["Spec", "Draft"]);
        assert_eq!(validator.wiring.output.as_deref(), Some("Draft__Review_R"));

        let elect = find(&tree, "root/scope_resolve_0");
        assert_eq!(elect.param_str("target"), Some("Draft"));
        assert_eq!(elect.wiring.output.as_deref(), Some("Draft"));
    }

    #[test]
    fn test_approval_gate_shape_and_isolation() {
        let tree = expand_yaml(
            "serial:\n  - worker: {agent: Prep, output: Notes}\n  - approval_gate:\n      approver: Boss\n      target: Plan\n      contents:\n        - worker: {agent: Author, inputs: [Notes], output: Plan}\n",
        );

        // The node outside contents stays outside the generated loop.
        let prep = find(&tree, "root/worker_0");
        assert_eq!(prep.param_str("agent"), Some("Prep"));

        let author = find(&tree, "root/serial_0/loop_0/serial_0/worker_0");
        assert_eq!(author.wiring.output.as_deref(), Some("Plan"));
        assert_eq!(
            author.wiring.inputs,
            ["Notes", "Plan__Review_Boss@prev", "Plan@prev"]
        );

        let approver = find(&tree, "root/serial_0/loop_0/serial_0/approver_0");
        assert_eq!(approver.op.physical(), OpCode::Approver);
        assert_eq!(approver.param_str("mode"), Some("approve"));
        assert_eq!(approver.param_str("target"), Some("Plan"));
        assert_eq!(
            approver.wiring.inputs,
            ["Plan", "Plan@prev", "Plan__Review_Boss@prev"]
        );
        assert_eq!(
            approver.wiring.output.as_deref(),
            Some("Plan__Review_Boss")
        );

        let loop_node = find(&tree, "root/serial_0/loop_0");
        assert_eq!(loop_node.param_int("count"), Some(10));
    }

    #[test]
    fn test_ensemble_shape() {
        let tree = expand_yaml(
            "ensemble: {generators: [A, B], samples: 2, consolidator: C, inputs: [Spec], output: Plan}\n",
        );

        let parallel = find(&tree, "root/parallel_0");
        assert_eq!(parallel.children.len(), 4);

        let second_of_b = find(&tree, "root/parallel_0/worker_3");
        assert_eq!(second_of_b.param_str("agent"), Some("B"));
        assert_eq!(
            second_of_b.wiring.output.as_deref(),
            Some("_Plan__Draft_1_1")
        );

        let consolidator = find(&tree, "root/worker_0");
        assert_eq!(consolidator.param_str("agent"), Some("C"));
        assert_eq!(consolidator.param_str("mode"), Some("consolidate"));
        assert_eq!(
            consolidator.wiring.inputs,
            [
                "Spec",
                "_Plan__Draft_0_0",
                "_Plan__Draft_0_1",
                "_Plan__Draft_1_0",
                "_Plan__Draft_1_1",
            ]
        );
        assert_eq!(consolidator.wiring.output.as_deref(), Some("Plan"));
    }

    #[test]
    fn test_fan_out_shape() {
        let tree = expand_yaml(
            "fan_out:\n  source: RegionList\n  item_key: region\n  strategy: serial\n  worker:\n    worker: {agent: Analyst, inputs: ['$ITEM'], output: Report}\n",
        );

        let init = find(&tree, "root/iterator_init_0");
        assert_eq!(init.param_str("source"), Some("RegionList"));
        assert_eq!(init.param_str("item_key"), Some("region"));
        assert_eq!(init.wiring.inputs, ["RegionList"]);

        let iterate = find(&tree, "root/iterate_0");
        assert_eq!(iterate.param_str("strategy"), Some("serial"));
        assert_eq!(iterate.children.len(), 1);

        let template = find(&tree, "root/iterate_0/worker_0");
        assert_eq!(template.wiring.inputs, ["$ITEM"]);
    }

    #[test]
    fn test_briefing_reaches_synthesized_workers() {
        let tree = expand_yaml(
            "generate_team:\n  generator: D\n  validators: [R]\n  loop: 1\n  output: Draft\n  briefing:\n    tone: blunt\n    R: {template: T9}\n",
        );
        let generator = find(&tree, "root/loop_0/serial_0/worker_0");
        assert_eq!(generator.param_str("tone"), Some("blunt"));
        assert!(generator.param("template").is_none());

        let validator = find(&tree, "root/loop_0/serial_0/parallel_0/worker_0");
        assert_eq!(validator.param_str("tone"), Some("blunt"));
        assert_eq!(validator.param_str("template"), Some("T9"));
    }

    #[test]
    fn test_wrapper_keeps_leftover_params() {
        let tree = expand_yaml(
            "ensemble: {generators: [A], samples: 1, consolidator: C, output: Plan, description: options pass}\n",
        );
        assert_eq!(tree.param_str("description"), Some("options pass"));
        assert!(tree.param("generators").is_none());
        assert!(tree.param("samples").is_none());
    }

    #[test]
    fn test_gate_contents_workers_get_their_own_prev_output() {
        let tree = expand_yaml(
            "approval_gate:\n  approver: Boss\n  target: Plan\n  contents:\n    - worker: {agent: Researcher, output: Outline}\n    - worker: {agent: Author, inputs: [Outline], output: Plan}\n",
        );

        // A worker that does not produce the target still sees its own
        // prior-round output, but no approver feedback.
        let researcher = find(&tree, "root/loop_0/serial_0/worker_0");
        assert_eq!(researcher.wiring.inputs, ["Outline@prev"]);

        // The target producer gets both edges.
        let author = find(&tree, "root/loop_0/serial_0/worker_1");
        assert_eq!(
            author.wiring.inputs,
            ["Outline", "Plan__Review_Boss@prev", "Plan@prev"]
        );
    }

    #[test]
    fn test_nested_team_inside_gate_gets_feedback() {
        let tree = expand_yaml(
            "approval_gate:\n  approver: Boss\n  target: Draft\n  contents:\n    - generate_team: {generator: D, validators: [R], loop: 2, inputs: [Spec], output: Draft}\n",
        );
        // The team's generator inherits the gate feedback through the
        // sugar's forwarded inputs.
        let generator = find(&tree, "root/loop_0/serial_0/serial_0/loop_0/serial_0/worker_0");
        assert!(generator
            .wiring
            .inputs
            .contains(&"Draft__Review_Boss@prev".to_string()));
    }
}
