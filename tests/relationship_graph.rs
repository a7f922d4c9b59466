use tosca_parser::{parse_template_str, IssueCode, ParserConfig, ToscaTemplate};

fn parse(yaml: &str) -> ToscaTemplate {
    parse_template_str(yaml, &ParserConfig::default()).unwrap()
}

const STACK: &str = r#"
tosca_definitions_version: tosca_simple_yaml_1_0
topology_template:
  node_templates:
    server:
      type: tosca.nodes.Compute
    mysql:
      type: tosca.nodes.DBMS
      properties:
        root_password: secret
        port: 3306
      requirements:
        - host: server
    orders:
      type: tosca.nodes.Database
      properties:
        name: orders
      requirements:
        - host:
            node: mysql
            relationship: tosca.relationships.HostedOn
    web:
      type: tosca.nodes.WebServer
      requirements:
        - host: server
        - dependency:
            node: orders
            relationship: audit_link
  relationship_templates:
    audit_link:
      type: tosca.relationships.ConnectsTo
      description: audit feed
"#;

#[test]
fn relationships_form_a_deployable_graph() {
    let template = parse(STACK);
    assert!(template.is_valid(), "{:?}", template.issues());
    let topology = template.topology_template.as_ref().unwrap();
    let graph = &topology.graph;

    assert_eq!(graph.vertex_count(), 4);
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(graph.successors("orders"), vec!["mysql"]);
    let mut web_targets = graph.successors("web");
    web_targets.sort();
    assert_eq!(web_targets, vec!["orders", "server"]);

    let order = graph.deployment_order().unwrap();
    let position = |name: &str| order.iter().position(|n| *n == name).unwrap();
    assert!(position("server") < position("mysql"));
    assert!(position("mysql") < position("orders"));
    assert!(position("orders") < position("web"));

    let link = topology.relationship_template("audit_link").unwrap();
    assert_eq!(link.source.as_deref(), Some("web"));
    assert_eq!(link.target.as_deref(), Some("orders"));

    let web = topology.node_template("web").unwrap();
    let dependency = web
        .relationships
        .iter()
        .find(|r| r.requirement == "dependency")
        .unwrap();
    assert_eq!(dependency.relationship_type, "tosca.relationships.ConnectsTo");
    assert_eq!(dependency.template.as_deref(), Some("audit_link"));
}

#[test]
fn missing_target_is_one_key_error() {
    let template = parse(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_0
topology_template:
  node_templates:
    server:
      type: tosca.nodes.Compute
    app:
      type: tosca.nodes.SoftwareComponent
      requirements:
        - host: server
        - dependency:
            node: db
"#,
    );
    assert_eq!(template.issues().len(), 1, "{:?}", template.issues());
    assert_eq!(template.issues()[0].code, IssueCode::KeyError);
    assert_eq!(
        template.issues()[0].message,
        "Node template \"db\" was not found."
    );
    let topology = template.topology_template.as_ref().unwrap();
    let app = topology.node_template("app").unwrap();
    assert_eq!(app.relationships.len(), 1);
    assert!(app.relationships.iter().all(|r| r.requirement != "dependency"));
}

#[test]
fn edges_only_point_at_known_vertices() {
    let template = parse(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_0
topology_template:
  node_templates:
    server:
      type: tosca.nodes.Compute
    app:
      type: tosca.nodes.SoftwareComponent
      requirements:
        - host: server
        - dependency: ghost
        - dependency: tosca.nodes.Compute
    other:
      type: tosca.nodes.SoftwareComponent
      requirements:
        - host: nowhere
"#,
    );
    assert_eq!(template.issues().iter().filter(|i| i.code == IssueCode::KeyError).count(), 2);
    assert_eq!(
        template.issues().iter().filter(|i| i.code == IssueCode::NotImplemented).count(),
        1
    );
    let graph = &template.topology_template.as_ref().unwrap().graph;
    let vertices = graph.vertices();
    for (source, target, _) in graph.edges() {
        assert!(vertices.contains(&source));
        assert!(vertices.contains(&target));
    }
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn inline_relationship_properties_are_validated() {
    let template = parse(
        r#"
tosca_definitions_version: tosca_simple_yaml_1_0
topology_template:
  node_templates:
    server:
      type: tosca.nodes.Compute
    volume:
      type: tosca.nodes.BlockStorage
      properties:
        size: 10 GB
    consumer:
      type: tosca.nodes.Compute
      requirements:
        - local_storage:
            node: volume
            relationship:
              type: tosca.relationships.AttachesTo
              properties:
                location: 42
                mount_mode: rw
"#,
    );
    assert_eq!(
        template.issues().iter().filter(|i| i.code == IssueCode::UnknownField).count(),
        1,
        "{:?}",
        template.issues()
    );
    let topology = template.topology_template.as_ref().unwrap();
    let volume = topology.node_template("volume").unwrap();
    assert_eq!(volume.relationship_templates.len(), 1);
    assert_eq!(
        volume.relationship_templates[0].entity.type_label(),
        "tosca.relationships.AttachesTo"
    );
}
