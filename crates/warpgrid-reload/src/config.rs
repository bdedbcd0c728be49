//! coordd.toml configuration parser.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use warpgrid_keys::KeyTemplates;
use warpgrid_registry::{BaseScope, ConfKind, ConfScope, OverrideScope};

use crate::coordinator::{ConfRef, EnvRef, ReloadRule};
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordConfig {
    /// Template overrides and additions: name → source.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
    #[serde(default)]
    pub reload: Vec<ReloadRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReloadRuleConfig {
    pub watch: String,
    pub domain: String,
    pub service: String,
    pub version: String,
    /// Name of the configuration object holding the template.
    pub template: String,
    #[serde(default = "default_kind")]
    pub kind: ConfKind,
    pub domain_class: String,
    /// Read the template through this instance's override tier.
    pub domain_instance: Option<String>,
    pub output: PathBuf,
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_kind() -> ConfKind {
    ConfKind::Config
}

impl CoordConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Compile the built-in templates with this config's overrides.
    pub fn key_templates(&self) -> Result<KeyTemplates, ConfigError> {
        Ok(KeyTemplates::with_overrides(&self.templates)?)
    }

    /// Check every reload rule and that templates compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.key_templates()?;
        for (index, rule) in self.reload.iter().enumerate() {
            rule.validate().map_err(|reason| ConfigError::InvalidRule {
                index,
                watch: rule.watch.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Validated reload rules.
    pub fn rules(&self) -> Result<Vec<ReloadRule>, ConfigError> {
        self.validate()?;
        Ok(self.reload.iter().map(ReloadRuleConfig::to_rule).collect())
    }
}

impl ReloadRuleConfig {
    fn validate(&self) -> Result<(), String> {
        if self.watch.is_empty() {
            return Err("watch path is empty".to_string());
        }
        if !self.watch.starts_with('/') {
            return Err(format!("watch path {} is not absolute", self.watch));
        }
        if self.template.is_empty() {
            return Err("template name is empty".to_string());
        }
        if self.output.as_os_str().is_empty() {
            return Err("output path is empty".to_string());
        }
        if self.command.first().is_some_and(|program| program.is_empty()) {
            return Err("command program is empty".to_string());
        }
        Ok(())
    }

    pub fn to_rule(&self) -> ReloadRule {
        let scope = match &self.domain_instance {
            Some(instance) => ConfScope::Override(OverrideScope::new(
                self.domain_class.as_str(),
                instance.as_str(),
                self.service.as_str(),
                self.version.as_str(),
            )),
            None => ConfScope::Base(BaseScope::new(
                self.domain_class.as_str(),
                self.service.as_str(),
            )),
        };
        ReloadRule {
            watch: self.watch.clone(),
            env: EnvRef {
                domain: self.domain.clone(),
                service: self.service.clone(),
                version: self.version.clone(),
            },
            template: ConfRef {
                kind: self.kind,
                scope,
                name: self.template.clone(),
            },
            output: self.output.clone(),
            command: self.command.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[templates]
env-root = '{{define "KEY"}}/envs/{{.Domain}}/{{.Service}}/{{.Version}}{{end}}{{define "VALUE"}}{{end}}'

[[reload]]
watch = "/prod/api/live/watch"
domain = "prod"
service = "api"
version = "1.2"
template = "nginx.conf"
domain_class = "prod"
domain_instance = "prod-east"
output = "/etc/nginx/nginx.conf"
command = ["nginx", "-s", "reload"]

[[reload]]
watch = "/prod/web/live/watch"
domain = "prod"
service = "web"
version = "3"
template = "app.tgz"
kind = "pkg"
domain_class = "prod"
output = "/srv/web/app.tgz"
"#;

    #[test]
    fn parses_sample_config() {
        let config = CoordConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.reload.len(), 2);
        config.validate().unwrap();

        let rules = config.rules().unwrap();
        assert_eq!(
            rules[0].template.scope,
            ConfScope::Override(OverrideScope::new("prod", "prod-east", "api", "1.2"))
        );
        assert_eq!(rules[0].command, vec!["nginx", "-s", "reload"]);
        assert_eq!(rules[1].template.kind, ConfKind::Package);
        assert_eq!(rules[1].template.scope, ConfScope::Base(BaseScope::new("prod", "web")));
        assert!(rules[1].command.is_empty());

        let templates = config.key_templates().unwrap();
        let root = warpgrid_keys::EnvRoot::new("prod", "api", "1.2");
        assert_eq!(templates.path(&root).unwrap(), "/envs/prod/api/1.2");
    }

    #[test]
    fn empty_config_is_valid() {
        let config = CoordConfig::parse("").unwrap();
        assert!(config.reload.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn rejects_rules_missing_required_paths() {
        let mut config = CoordConfig::parse(SAMPLE).unwrap();
        config.reload[1].output = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { index: 1, .. }));

        let mut config = CoordConfig::parse(SAMPLE).unwrap();
        config.reload[0].watch = "relative/watch".to_string();
        assert!(config.validate().is_err());

        let mut config = CoordConfig::parse(SAMPLE).unwrap();
        config.reload[0].template.clear();
        assert!(config.rules().is_err());
    }

    #[test]
    fn broken_template_override_rejects_config() {
        let config = CoordConfig::parse(
            r#"
[templates]
live = '{{define "KEY"}}/x{{end}}'
"#,
        )
        .unwrap();
        assert!(matches!(config.validate().unwrap_err(), ConfigError::Template(_)));
    }

    #[test]
    fn unknown_rule_fields_are_rejected() {
        let err = CoordConfig::parse(
            r#"
[[reload]]
watch = "/a"
domain = "d"
service = "s"
version = "v"
template = "t"
domain_class = "c"
output = "/o"
reload_cmd = "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CoordConfig::from_file(Path::new("/nonexistent/coordd.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/coordd.toml"));
    }
}
