//! The compiled key template registry.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::entries::{self, NamespaceEntry};
use crate::error::{TemplateError, TemplateResult};
use crate::template::{parse_sections, Template};

const KEY: &str = "KEY";
const VALUE: &str = "VALUE";

/// A named (path, payload) template pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    pub name: String,
    pub key: Template,
    pub value: Template,
}

impl KeyTemplate {
    /// Compile a template source holding a `KEY` and a `VALUE` block.
    pub fn compile(name: &str, source: &str) -> TemplateResult<Self> {
        let mut key = None;
        let mut value = None;

        for (section, body) in parse_sections(name, source)? {
            let slot = match section.as_str() {
                KEY => &mut key,
                VALUE => &mut value,
                other => {
                    return Err(TemplateError::Parse {
                        template: name.to_string(),
                        reason: format!("unexpected section \"{other}\""),
                    })
                }
            };
            if slot.is_some() {
                return Err(TemplateError::Parse {
                    template: name.to_string(),
                    reason: format!("section \"{section}\" defined twice"),
                });
            }
            *slot = Some(Template::parse(&format!("{name}/{section}"), &body)?);
        }

        let missing = |section| TemplateError::MissingSection {
            template: name.to_string(),
            section,
        };
        Ok(Self {
            name: name.to_string(),
            key: key.ok_or_else(|| missing(KEY))?,
            value: value.ok_or_else(|| missing(VALUE))?,
        })
    }
}

/// Built-in namespace templates, by name.
const STANDARD: &[(&str, &str)] = &[
    (
        entries::ENV_ROOT,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/{{.Version}}/env{{end}}
           {{define "VALUE"}}{{end}}"#,
    ),
    (
        entries::ENV_ENTRY,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/{{.Version}}/env/{{.Name}}{{end}}
           {{define "VALUE"}}{{.Value}}{{end}}"#,
    ),
    (
        entries::RELEASE,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/{{.Version}}{{end}}
           {{define "VALUE"}}{{.Image}}{{end}}"#,
    ),
    (
        entries::RELEASE_WATCH,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/{{.Version}}/watch{{end}}
           {{define "VALUE"}}0{{end}}"#,
    ),
    (
        entries::IMAGE_COUNT,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/{{.Version}}/container/{{.Image}}{{end}}
           {{define "VALUE"}}{{.Count}}{{end}}"#,
    ),
    (
        entries::CONTAINER,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/{{.Version}}/container/{{.Image}}/{{.ContainerId}}:{{.Port}}{{end}}
           {{define "VALUE"}}{{.Host}}:{{.HostPort}}{{end}}"#,
    ),
    (
        entries::LIVE,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/live{{end}}
           {{define "VALUE"}}{{.ContainerPath}},{{.EnvPath}}{{end}}"#,
    ),
    (
        entries::LIVE_WATCH,
        r#"{{define "KEY"}}/{{.Domain}}/{{.Service}}/live/watch{{end}}
           {{define "VALUE"}}0{{end}}"#,
    ),
    (
        entries::DASHBOARD,
        r#"{{define "KEY"}}/dashboard/{{.Domain}}/{{.Service}}/{{.Host}}:{{.Port}}{{end}}
           {{define "VALUE"}}{{.Url}}{{end}}"#,
    ),
    (
        entries::CONF_BASE_ROOT,
        r#"{{define "KEY"}}/{{.Kind}}/base/{{.DomainClass}}/{{.Service}}{{end}}
           {{define "VALUE"}}{{end}}"#,
    ),
    (
        entries::CONF_BASE,
        r#"{{define "KEY"}}/{{.Kind}}/base/{{.DomainClass}}/{{.Service}}/{{.Name}}{{end}}
           {{define "VALUE"}}{{end}}"#,
    ),
    (
        entries::CONF_OVERRIDE_ROOT,
        r#"{{define "KEY"}}/{{.Kind}}/override/{{.DomainClass}}/{{.DomainInstance}}/{{.Service}}/{{.Version}}{{end}}
           {{define "VALUE"}}{{end}}"#,
    ),
    (
        entries::CONF_OVERRIDE,
        r#"{{define "KEY"}}/{{.Kind}}/override/{{.DomainClass}}/{{.DomainInstance}}/{{.Service}}/{{.Version}}/{{.Name}}{{end}}
           {{define "VALUE"}}{{end}}"#,
    ),
];

/// Compiled templates, keyed by name. Built once at startup.
#[derive(Debug, Clone)]
pub struct KeyTemplates {
    templates: HashMap<String, KeyTemplate>,
}

impl KeyTemplates {
    /// Compile a set of `(name, source)` templates.
    ///
    /// Any template missing its `KEY` or `VALUE` section rejects the whole set.
    pub fn compile<'a>(sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> TemplateResult<Self> {
        let mut templates = HashMap::new();
        for (name, source) in sources {
            let template = KeyTemplate::compile(name, source)?;
            templates.insert(name.to_string(), template);
        }
        debug!(count = templates.len(), "key templates compiled");
        Ok(Self { templates })
    }

    /// The built-in namespace templates.
    ///
    /// # Panics
    ///
    /// Panics if a built-in template is malformed. Path derivation cannot
    /// run safely without them, so this is checked once at startup.
    pub fn standard() -> Self {
        Self::compile(STANDARD.iter().copied())
            .unwrap_or_else(|e| panic!("built-in key templates are invalid: {e}"))
    }

    /// The built-in templates with `overrides` replacing or adding entries.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> TemplateResult<Self> {
        let mut sources: BTreeMap<&str, &str> = STANDARD.iter().copied().collect();
        for (name, source) in overrides {
            sources.insert(name.as_str(), source.as_str());
        }
        Self::compile(sources)
    }

    pub fn get(&self, name: &str) -> Option<&KeyTemplate> {
        self.templates.get(name)
    }

    /// Template names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render the named template against `entry`, returning `(key, value)`.
    pub fn derive_key_value(
        &self,
        name: &str,
        entry: &impl Serialize,
    ) -> TemplateResult<(String, String)> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::UnknownTemplate(name.to_string()))?;
        let context =
            serde_json::to_value(entry).map_err(|e| TemplateError::Entry(e.to_string()))?;
        if !context.is_object() {
            return Err(TemplateError::Entry(format!(
                "{name} needs a field map, got {context}"
            )));
        }

        let key = template.key.render(&context)?;
        let value = template.value.render(&context)?;
        Ok((key, value))
    }

    /// Typed form of [`derive_key_value`](Self::derive_key_value).
    pub fn derive<E: NamespaceEntry>(&self, entry: &E) -> TemplateResult<(String, String)> {
        self.derive_key_value(E::TEMPLATE, entry)
    }

    /// Only the key (path) of [`derive`](Self::derive).
    pub fn path<E: NamespaceEntry>(&self, entry: &E) -> TemplateResult<String> {
        self.derive(entry).map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::*;
    use serde_json::json;

    #[test]
    fn standard_templates_compile() {
        let templates = KeyTemplates::standard();
        assert_eq!(templates.names().len(), STANDARD.len());
        assert!(templates.get(ENV_ROOT).is_some());
    }

    #[test]
    fn missing_value_fails_at_compile_time() {
        let err = KeyTemplates::compile([("broken", r#"{{define "KEY"}}/a{{end}}"#)]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingSection {
                template: "broken".to_string(),
                section: "VALUE",
            }
        );
    }

    #[test]
    fn missing_key_fails_at_compile_time() {
        let err = KeyTemplates::compile([("broken", r#"{{define "VALUE"}}x{{end}}"#)]).unwrap_err();
        assert!(matches!(err, TemplateError::MissingSection { section: "KEY", .. }));
    }

    #[test]
    fn duplicate_or_unknown_sections_are_rejected() {
        let dup = r#"{{define "KEY"}}a{{end}}{{define "KEY"}}b{{end}}{{define "VALUE"}}{{end}}"#;
        assert!(KeyTemplates::compile([("dup", dup)]).is_err());
        let extra = r#"{{define "KEY"}}a{{end}}{{define "VALUE"}}{{end}}{{define "X"}}{{end}}"#;
        assert!(KeyTemplates::compile([("extra", extra)]).is_err());
    }

    #[test]
    fn derives_env_paths() {
        let templates = KeyTemplates::standard();
        let (key, value) = templates.derive(&EnvRoot::new("prod", "api", "1.2")).unwrap();
        assert_eq!(key, "/prod/api/1.2/env");
        assert_eq!(value, "");

        let entry = EnvEntry::new("prod", "api", "1.2", "PORT", "8080");
        let (key, value) = templates.derive(&entry).unwrap();
        assert_eq!(key, "/prod/api/1.2/env/PORT");
        assert_eq!(value, "8080");
    }

    #[test]
    fn derives_container_registration() {
        let templates = KeyTemplates::standard();
        let reg = ContainerRegistration {
            domain: "prod".to_string(),
            service: "api".to_string(),
            version: "1.2".to_string(),
            image: "api:1.2-7".to_string(),
            container_id: "c0ffee".to_string(),
            port: 8080,
            host: "10.0.0.5".to_string(),
            host_port: 31000,
        };
        let (key, value) = templates.derive(&reg).unwrap();
        assert_eq!(key, "/prod/api/1.2/container/api:1.2-7/c0ffee:8080");
        assert_eq!(value, "10.0.0.5:31000");
    }

    #[test]
    fn derives_live_pointer_value() {
        let templates = KeyTemplates::standard();
        let live = LivePointer::new("prod", "api", "/prod/api/1.2/container", "/prod/api/1.2/env");
        let (key, value) = templates.derive(&live).unwrap();
        assert_eq!(key, "/prod/api/live");
        assert_eq!(value, "/prod/api/1.2/container,/prod/api/1.2/env");
    }

    #[test]
    fn derives_conf_tiers() {
        let templates = KeyTemplates::standard();
        let base = ConfBase {
            kind: ConfKind::Config,
            domain_class: "prod".to_string(),
            service: "api".to_string(),
            name: "nginx.conf".to_string(),
        };
        assert_eq!(templates.path(&base).unwrap(), "/conf/base/prod/api/nginx.conf");

        let over = ConfOverrideRoot {
            kind: ConfKind::Package,
            domain_class: "prod".to_string(),
            domain_instance: "prod-east".to_string(),
            service: "api".to_string(),
            version: "1.2".to_string(),
        };
        assert_eq!(templates.path(&over).unwrap(), "/pkg/override/prod/prod-east/api/1.2");
    }

    #[test]
    fn unknown_template_and_missing_fields_are_errors() {
        let templates = KeyTemplates::standard();
        assert_eq!(
            templates.derive_key_value("nope", &json!({})).unwrap_err(),
            TemplateError::UnknownTemplate("nope".to_string())
        );
        let err = templates
            .derive_key_value(ENV_ROOT, &json!({"Domain": "prod"}))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Unresolved { .. }));
        assert!(templates.derive_key_value(ENV_ROOT, &"scalar").is_err());
    }

    #[test]
    fn overrides_replace_builtins() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            ENV_ROOT.to_string(),
            r#"{{define "KEY"}}/envs/{{.Domain}}/{{.Service}}/{{.Version}}{{end}}{{define "VALUE"}}{{end}}"#
                .to_string(),
        );
        let templates = KeyTemplates::with_overrides(&overrides).unwrap();
        let key = templates.path(&EnvRoot::new("prod", "api", "1")).unwrap();
        assert_eq!(key, "/envs/prod/api/1");
        assert!(templates.get(RELEASE).is_some());
    }
}
