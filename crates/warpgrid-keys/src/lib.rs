//! warpgrid-keys: canonical paths in the coordination tree.
//!
//! Every record the platform keeps in the shared tree lives at a path
//! derived from a named [`KeyTemplate`]. A template is a pair of
//! sub-templates, `KEY` (the path) and `VALUE` (the payload), written as
//! `{{define "KEY"}}...{{end}}` blocks with `{{.Field}}` substitutions:
//!
//! ```text
//! {{define "KEY"}}/{{.Domain}}/{{.Service}}/{{.Version}}/env/{{.Name}}{{end}}
//! {{define "VALUE"}}{{.Value}}{{end}}
//! ```
//!
//! Templates are compiled once into [`KeyTemplates`] at startup and are
//! immutable afterwards. Entries are plain serde structs; their PascalCase
//! field names are what the templates refer to.

pub mod entries;
pub mod error;
pub mod parse;
pub mod template;
pub mod templates;

pub use entries::*;
pub use error::{ParseError, TemplateError, TemplateResult};
pub use parse::{parse_docker_image, parse_host_port, parse_live_value, parse_version};
pub use template::Template;
pub use templates::{KeyTemplate, KeyTemplates};
