//! End-to-end pipeline tests through the public API.

use odl_compiler::error::{format_errors, ErrorKind};
use odl_compiler::compile;
use odl_types::{IrNode, OpCode, StackPath, Value};

fn compile_yaml(source: &str) -> Result<IrNode, Vec<odl_compiler::CompileError>> {
    let value: Value = serde_yaml::from_str(source).expect("valid yaml");
    compile(&value)
}

/// A quarterly-report organization exercising every sugar at once.
const QUARTERLY_ORG: &str = r#"
serial:
  - worker:
      agent: Librarian
      inputs: ["Archive:PriorReports@2025"]
      output: Baseline
  - fan_out:
      source: Baseline
      item_key: division
      strategy: serial
      worker:
        worker:
          agent: DivisionAnalyst
          inputs: ["$ITEM", DivisionSummary@history]
          output: DivisionSummary
  - ensemble:
      generators: [Optimist, Pessimist, Realist]
      samples: 1
      consolidator: LeadWriter
      inputs: [Baseline]
      output: Outlook
      briefing:
        horizon: two quarters
        Pessimist:
          horizon: one quarter
  - approval_gate:
      approver: CFO
      target: QuarterlyReport
      max_rounds: 4
      contents:
        - generate_team:
            generator: Writer
            validators: [FactChecker, Stylist]
            loop: 2
            inputs: [Outlook]
            output: QuarterlyReport
  - dialogue:
      agents: [CFO, LeadWriter]
      inputs: [QuarterlyReport]
      topic: sign-off
"#;

#[test]
fn quarterly_org_compiles_to_primitives_only() {
    let ir = compile_yaml(QUARTERLY_ORG).expect("compiles");

    let mut opcodes = std::collections::HashMap::new();
    ir.walk(&mut |node| {
        *opcodes.entry(node.opcode).or_insert(0usize) += 1;
    });

    // Sugar surfaces never reach the IR; the typed opcode set is closed,
    // so this mostly documents the expanded shape.
    assert_eq!(opcodes[&OpCode::IteratorInit], 1);
    assert_eq!(opcodes[&OpCode::Iterate], 1);
    assert_eq!(opcodes[&OpCode::Loop], 2);
    assert_eq!(opcodes[&OpCode::ScopeResolve], 2);
    assert_eq!(opcodes[&OpCode::Approver], 1);
    assert_eq!(opcodes[&OpCode::Dialogue], 1);
    // Librarian, analyst template, 3 ensemble samplers + consolidator,
    // team generator + 2 validators.
    assert_eq!(opcodes[&OpCode::Worker], 9);
}

#[test]
fn quarterly_org_wiring_is_fully_bound() {
    let ir = compile_yaml(QUARTERLY_ORG).expect("compiles");

    // The closing dialogue reads the gate's elected report.
    let dialogue = ir
        .find(&StackPath::parse("root/dialogue_0"))
        .expect("dialogue");
    assert_eq!(
        dialogue.wiring.inputs,
        ["QuarterlyReport#root/serial_2/scope_resolve_0"]
    );

    // The analyst template keeps its symbolic item binding and carries
    // its own history reference.
    let analyst = ir
        .find(&StackPath::parse("root/serial_0/iterate_0/worker_0"))
        .expect("analyst");
    assert_eq!(
        analyst.wiring.inputs,
        [
            "$ITEM",
            "DivisionSummary#root/serial_0/iterate_0/worker_0@history",
        ]
    );

    // Briefing: global value for everyone, overridden for one agent.
    let mut horizons = Vec::new();
    ir.walk(&mut |node| {
        if node.stack_path.to_string().starts_with("root/serial_1/parallel_0/") {
            horizons.push((
                node.params["agent"].as_str().unwrap().to_string(),
                node.params["horizon"].as_str().unwrap().to_string(),
            ));
        }
    });
    assert_eq!(
        horizons,
        [
            ("Optimist".to_string(), "two quarters".to_string()),
            ("Pessimist".to_string(), "one quarter".to_string()),
            ("Realist".to_string(), "two quarters".to_string()),
        ]
    );
}

#[test]
fn quarterly_org_is_deterministic_across_compilations() {
    let first = serde_yaml::to_string(&compile_yaml(QUARTERLY_ORG).unwrap()).unwrap();
    for _ in 0..3 {
        let again = serde_yaml::to_string(&compile_yaml(QUARTERLY_ORG).unwrap()).unwrap();
        assert_eq!(first, again);
    }
}

#[test]
fn ir_survives_a_serde_round_trip() {
    let ir = compile_yaml(QUARTERLY_ORG).expect("compiles");
    let yaml = serde_yaml::to_string(&ir).unwrap();
    let back: IrNode = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(back, ir);
}

#[test]
fn batched_report_is_readable() {
    let errors = compile_yaml(
        "serial:\n  - worker: {agent: A, output: _draft}\n  - worker: {inputs: [X], output: Y}\n",
    )
    .unwrap_err();
    let report = format_errors(&errors);
    assert!(report.contains("private name"));
    assert!(report.contains("missing required field"));
    assert!(report.contains("root/worker_0"));
    assert!(report.contains("root/worker_1"));
}

#[test]
fn gate_exhaustion_is_not_a_compile_error() {
    // A gate that can reject forever still compiles; exhaustion is a
    // runtime concern and the output stays bound through the mediator.
    let ir = compile_yaml(
        "serial:\n  - approval_gate:\n      approver: Boss\n      target: Memo\n      max_rounds: 1\n      contents:\n        - worker: {agent: Author, output: Memo}\n  - worker: {agent: Archivist, inputs: [Memo], output: Archived}\n",
    )
    .expect("compiles");
    let archivist = ir
        .find(&StackPath::parse("root/worker_0"))
        .expect("archivist");
    assert_eq!(
        archivist.wiring.inputs,
        ["Memo#root/serial_0/scope_resolve_0"]
    );
}

#[test]
fn project_documents_cannot_be_written() {
    let errors = compile_yaml(
        "worker: {agent: A, inputs: [], output: 'Handbook:Style@v1'}\n",
    )
    .unwrap_err();
    assert_eq!(errors[0].kind, ErrorKind::ExternalWriteAttempt);
}
