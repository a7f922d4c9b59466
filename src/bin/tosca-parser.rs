use std::{collections::BTreeMap, env, path::PathBuf, process::ExitCode};

use serde_json::{json, Value as JsonValue};

use tosca_parser::{parse_template_path, ParserConfig, ToscaTemplate};

#[derive(Debug, Default)]
struct Options {
    pretty: bool,
    max_depth: Option<usize>,
    params: BTreeMap<String, JsonValue>,
}

impl Options {
    fn config(&self) -> ParserConfig {
        let mut config = ParserConfig::default().with_parsed_params(self.params.clone());
        if let Some(depth) = self.max_depth {
            config = config.with_max_nesting_depth(depth);
        }
        config
    }
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            ExitCode::from(2)
        }
    }
}

/// Returns whether the template was valid.
fn run(args: Vec<String>) -> Result<bool, String> {
    if args.len() < 3 {
        return Err("not enough arguments".to_string());
    }
    let command = args[1].as_str();
    if !matches!(command, "validate" | "summary") {
        return Err(format!("unknown command '{command}'"));
    }
    let file = PathBuf::from(&args[2]);
    let options = parse_options(&args[3..])?;

    let template = parse_template_path(&file, &options.config()).map_err(|e| e.to_string())?;
    if command == "summary" {
        run_summary(&template, options.pretty)
    } else {
        Ok(run_validate(&template))
    }
}

fn run_validate(template: &ToscaTemplate) -> bool {
    match template.validation_result() {
        Ok(()) => {
            println!("OK");
            true
        }
        Err(err) => {
            eprintln!("{err}");
            false
        }
    }
}

fn run_summary(template: &ToscaTemplate, pretty: bool) -> Result<bool, String> {
    let topology = template.topology_template.as_ref();
    let edges: Vec<JsonValue> = topology
        .map(|t| {
            t.graph
                .edges()
                .into_iter()
                .map(|(source, target, relationship)| {
                    json!({ "source": source, "target": target, "relationship": relationship })
                })
                .collect()
        })
        .unwrap_or_default();
    let summary = json!({
        "path": template.path,
        "version": template.version,
        "imports": template.imports,
        "node_templates": topology.map(|t| t.node_templates.len()).unwrap_or(0),
        "relationship_templates": topology.map(|t| t.relationship_templates.len()).unwrap_or(0),
        "inputs": topology.map(|t| t.input_values()).unwrap_or_default(),
        "edges": edges,
        "deployment_order": topology.and_then(|t| t.graph.deployment_order()),
        "issues": template.issues(),
    });
    let output = if pretty {
        serde_json::to_string_pretty(&summary)
    } else {
        serde_json::to_string(&summary)
    }
    .map_err(|e| format!("failed to serialize summary: {e}"))?;
    println!("{output}");
    Ok(template.is_valid())
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--pretty" => {
                options.pretty = true;
                i += 1;
            }
            "--max-depth" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "--max-depth requires a value".to_string())?;
                let depth = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid --max-depth value '{value}'"))?;
                options.max_depth = Some(depth);
                i += 2;
            }
            "--param" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "--param requires NAME=VALUE".to_string())?;
                let (name, raw) = value
                    .split_once('=')
                    .ok_or_else(|| format!("invalid --param '{value}'; expected NAME=VALUE"))?;
                options.params.insert(name.to_string(), parse_param_value(raw));
                i += 2;
            }
            other => return Err(format!("unknown option '{other}'")),
        }
    }
    Ok(options)
}

/// Values are read as YAML scalars so `--param port=80` passes an integer.
fn parse_param_value(raw: &str) -> JsonValue {
    serde_yaml::from_str::<JsonValue>(raw)
        .ok()
        .filter(|v| !v.is_null() || raw.trim().is_empty())
        .unwrap_or_else(|| JsonValue::String(raw.to_string()))
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  tosca-parser validate <file> [--param NAME=VALUE]... [--max-depth N]");
    eprintln!("  tosca-parser summary <file> [--pretty] [--param NAME=VALUE]... [--max-depth N]");
    eprintln!();
    eprintln!("options:");
    eprintln!("  --param NAME=VALUE     value for a topology input; VALUE is read as YAML");
    eprintln!("  --max-depth N          maximum substitution nesting level (default 20)");
    eprintln!("  --pretty               pretty-print the summary JSON");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_options, parse_param_value};

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn params_are_read_as_yaml_scalars() {
        let options = parse_options(&args(&["--param", "port=8080", "--param", "name=web"])).unwrap();
        assert_eq!(options.params["port"], json!(8080));
        assert_eq!(options.params["name"], json!("web"));
    }

    #[test]
    fn max_depth_and_pretty_are_parsed() {
        let options = parse_options(&args(&["--pretty", "--max-depth", "3"])).unwrap();
        assert!(options.pretty);
        assert_eq!(options.max_depth, Some(3));
    }

    #[test]
    fn bad_options_are_rejected() {
        assert!(parse_options(&args(&["--max-depth", "deep"])).is_err());
        assert!(parse_options(&args(&["--param", "novalue"])).is_err());
        assert!(parse_options(&args(&["--verbose"])).is_err());
    }

    #[test]
    fn null_like_values_stay_strings() {
        assert_eq!(parse_param_value("~"), json!("~"));
        assert_eq!(parse_param_value("true"), json!(true));
    }
}
