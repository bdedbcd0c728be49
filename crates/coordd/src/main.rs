//! coordd: operator tool for the WarpGrid coordination layer.
//!
//! # Usage
//!
//! ```text
//! coordd keys container --field Domain=prod --field Service=api ...
//! coordd templates --config coordd.toml
//! coordd check coordd.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{debug, info};
use warpgrid_keys::KeyTemplates;
use warpgrid_reload::CoordConfig;

#[derive(Parser)]
#[command(name = "coordd", about = "WarpGrid coordination tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive the key and value a namespace template produces.
    Keys {
        /// Template name, e.g. `env-entry` or `live`.
        template: String,

        /// Entry field as `Name=Value`. Repeatable.
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,

        /// Config file whose template overrides apply.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the available namespace templates.
    Templates {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load and validate a coordinator config.
    Check {
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,coordd=debug,warpgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Keys {
            template,
            fields,
            config,
        } => derive_keys(&template, &fields, config.as_deref()),
        Command::Templates { config } => {
            let templates = load_templates(config.as_deref())?;
            for line in describe_templates(&templates) {
                println!("{line}");
            }
            Ok(())
        }
        Command::Check { config } => check_config(&config),
    }
}

fn load_templates(config: Option<&Path>) -> anyhow::Result<KeyTemplates> {
    match config {
        Some(path) => {
            let config = CoordConfig::from_file(path)?;
            debug!(path = %path.display(), overrides = config.templates.len(), "config loaded");
            Ok(config.key_templates()?)
        }
        None => Ok(KeyTemplates::standard()),
    }
}

/// One line per template: its name and the entry fields it reads.
fn describe_templates(templates: &KeyTemplates) -> Vec<String> {
    templates
        .names()
        .into_iter()
        .filter_map(|name| templates.get(name))
        .map(|template| {
            let mut fields = template.key.fields();
            for field in template.value.fields() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
            format!("{}: {}", template.name, fields.join(", "))
        })
        .collect()
}

fn derive_keys(template: &str, fields: &[String], config: Option<&Path>) -> anyhow::Result<()> {
    let templates = load_templates(config)?;
    let entry = parse_fields(fields)?;
    let (key, value) = templates
        .derive_key_value(template, &entry)
        .with_context(|| format!("deriving {template}"))?;
    println!("{key}");
    println!("{value}");
    Ok(())
}

fn parse_fields(fields: &[String]) -> anyhow::Result<Value> {
    let mut entry = Map::new();
    for field in fields {
        let (name, value) = field
            .split_once('=')
            .with_context(|| format!("field {field:?} is not NAME=VALUE"))?;
        entry.insert(name.to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(entry))
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = CoordConfig::from_file(path)?;
    let rules = config
        .rules()
        .with_context(|| format!("validating {}", path.display()))?;
    info!(path = %path.display(), rules = rules.len(), "config is valid");

    println!(
        "{}: {} template override(s), {} reload rule(s)",
        path.display(),
        config.templates.len(),
        rules.len()
    );
    for rule in &rules {
        println!(
            "  {} -> {} (template {}, {:?} tier{})",
            rule.watch,
            rule.output.display(),
            rule.template.name,
            rule.template.scope.tier(),
            if rule.command.is_empty() { "" } else { ", with command" },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_become_a_string_map() {
        let entry = parse_fields(&["Domain=prod".to_string(), "Url=http://x/?a=b".to_string()]).unwrap();
        assert_eq!(entry["Domain"], "prod");
        assert_eq!(entry["Url"], "http://x/?a=b");
    }

    #[test]
    fn field_without_equals_is_rejected() {
        assert!(parse_fields(&["Domain".to_string()]).is_err());
    }

    #[test]
    fn derives_a_standard_key() {
        let templates = load_templates(None).unwrap();
        let entry = parse_fields(&[
            "Domain=prod".to_string(),
            "Service=api".to_string(),
        ])
        .unwrap();
        let (key, value) = templates.derive_key_value("live-watch", &entry).unwrap();
        assert_eq!((key.as_str(), value.as_str()), ("/prod/api/live/watch", "0"));
    }

    #[test]
    fn template_listing_names_the_fields_each_reads() {
        let lines = describe_templates(&KeyTemplates::standard());
        assert!(lines.contains(&"live-watch: Domain, Service".to_string()));
        assert_eq!(lines.len(), KeyTemplates::standard().names().len());
    }
}
