use serde_json::json;
use tosca_parser::policies::TargetKind;
use tosca_parser::{
    parse_template_str, validate_template, Extension, IssueCode, ParserConfig, ToscaError,
};

const SERVICE: &str = r#"
tosca_definitions_version: tosca_simple_yaml_1_0
description: Web tier with one database
metadata:
  template_name: web-tier
topology_template:
  inputs:
    cpus:
      type: integer
      default: 1
      constraints:
        - valid_values: [1, 2, 4, 8]
  node_templates:
    server:
      type: tosca.nodes.Compute
      capabilities:
        host:
          properties:
            num_cpus: { get_input: cpus }
            mem_size: 2048 MB
        os:
          properties:
            type: linux
            distribution: ubuntu
    web:
      type: tosca.nodes.WebServer
      requirements:
        - host: server
  groups:
    tier:
      type: tosca.groups.Root
      members: [server, web]
  policies:
    - spread:
        type: tosca.policies.Placement
        targets: [tier]
    - grow:
        type: tosca.policies.Scaling
        targets: [server]
        triggers:
          high_load:
            event: load_high
            condition:
              constraint: { utilization: { greater_than: 80 } }
              period: 60 s
              evaluations: 2
              method: average
            action:
              resize: { get_input: cpus }
  outputs:
    server_ip:
      description: Private address of the server
      value: { get_attribute: [server, private_address] }
"#;

#[test]
fn complete_service_template_is_valid() {
    let config = ParserConfig::default();
    assert!(validate_template(SERVICE, &config).is_ok());

    let template = parse_template_str(SERVICE, &config).unwrap();
    assert_eq!(template.version.as_deref(), Some("tosca_simple_yaml_1_0"));
    assert_eq!(template.description.as_deref(), Some("Web tier with one database"));
    let topology = template.topology_template.as_ref().unwrap();
    assert_eq!(topology.group("tier").unwrap().members, vec!["server", "web"]);
    assert_eq!(
        topology.policy("spread").unwrap().targets_kind,
        Some(TargetKind::Group)
    );
    let grow = topology.policy("grow").unwrap();
    assert_eq!(grow.triggers[0].event.as_deref(), Some("load_high"));
    assert_eq!(topology.output("server_ip").unwrap().description.as_deref(), Some("Private address of the server"));

    let mem = topology
        .node_template("server")
        .unwrap()
        .entity
        .get_capability("host")
        .unwrap()
        .get_property_value("mem_size")
        .cloned();
    assert_eq!(mem, Some(json!("2048 MB")));
}

#[test]
fn parameters_feed_inputs_and_are_checked() {
    let config = ParserConfig::default().with_param("cpus", json!(4));
    let template = parse_template_str(SERVICE, &config).unwrap();
    assert!(template.is_valid(), "{:?}", template.issues());
    let topology = template.topology_template.as_ref().unwrap();
    assert_eq!(topology.input_values()["cpus"], json!(4));

    let config = ParserConfig::default().with_param("cpus", json!(3));
    let template = parse_template_str(SERVICE, &config).unwrap();
    assert_eq!(template.issues().len(), 1);
    assert_eq!(template.issues()[0].code, IssueCode::ValidationError);
}

#[test]
fn validation_failure_aggregates_every_issue() {
    let text = r#"
tosca_definitions_version: tosca_simple_yaml_1_0
topology_template:
  node_templates:
    server:
      type: tosca.nodes.Compute
      colour: blue
    app:
      type: tosca.nodes.SoftwareComponent
      requirements:
        - host: missing
  outputs:
    endpoint:
      description: no value
"#;
    let err = validate_template(text, &ParserConfig::default()).unwrap_err();
    let ToscaError::Validation { path, issues } = &err else {
        panic!("expected aggregated validation error, got {err:?}");
    };
    assert_eq!(path, "<input>");
    assert_eq!(issues.len(), 3);
    let message = err.to_string();
    assert!(message.contains("UnknownFieldError"));
    assert!(message.contains("KeyError: Node template \"missing\" was not found."));
    assert!(message.contains("MissingRequiredFieldError"));
}

#[test]
fn nfv_profile_enables_its_types() {
    let nfv = r#"
tosca_definitions_version: tosca_simple_profile_for_nfv_1_0_0
topology_template:
  node_templates:
    vdu1:
      type: tosca.nodes.nfv.VDU
"#;
    let template = parse_template_str(nfv, &ParserConfig::default()).unwrap();
    assert!(template.is_valid(), "{:?}", template.issues());

    let plain = nfv.replace("tosca_simple_profile_for_nfv_1_0_0", "tosca_simple_yaml_1_0");
    let template = parse_template_str(&plain, &ParserConfig::default()).unwrap();
    assert_eq!(template.issues().len(), 1);
    assert_eq!(template.issues()[0].code, IssueCode::InvalidType);
}

#[test]
fn registered_extension_adds_a_version() {
    let extension = Extension::from_yaml(
        "acme_profile_1_0",
        "node_types:\n  acme.nodes.Appliance:\n    derived_from: tosca.nodes.Compute\n",
    )
    .unwrap();
    let config = ParserConfig::default().with_extension(extension);
    let text = r#"
tosca_definitions_version: acme_profile_1_0
topology_template:
  node_templates:
    box:
      type: acme.nodes.Appliance
"#;
    let template = parse_template_str(text, &config).unwrap();
    assert!(template.is_valid(), "{:?}", template.issues());

    let template = parse_template_str(text, &ParserConfig::default()).unwrap();
    assert!(template
        .issues()
        .iter()
        .any(|i| i.code == IssueCode::InvalidTemplateVersion));
}

#[test]
fn template_model_serializes_to_json() {
    let template = parse_template_str(SERVICE, &ParserConfig::default()).unwrap();
    let value = serde_json::to_value(&template).unwrap();
    assert_eq!(value["version"], json!("tosca_simple_yaml_1_0"));
    assert_eq!(value["topology_template"]["node_templates"][0]["name"], json!("server"));
    assert_eq!(value["issues"], json!([]));
}
