//! Parsers for identifiers stored in the tree.

use crate::error::ParseError;

/// Split an image reference into `(repository, tag)` at its last `:`.
///
/// A `:` followed by a `/` belongs to a registry port, so
/// `registry:5000/api` has no tag and is rejected.
pub fn parse_docker_image(image: &str) -> Result<(&str, &str), ParseError> {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => Ok((repo, tag)),
        _ => Err(ParseError::BadImage(image.to_string())),
    }
}

/// Split an image reference into `(repository, version, build)`.
///
/// The tag splits at its last `-`; without one the whole tag is the
/// version and the build is empty.
pub fn parse_version(image: &str) -> Result<(&str, &str, &str), ParseError> {
    let (repo, tag) = parse_docker_image(image)?;
    let (version, build) = tag.rsplit_once('-').unwrap_or((tag, ""));
    Ok((repo, version, build))
}

/// Split a live pointer value into `(container path, env path)`.
///
/// Returns `None` unless the value has exactly two comma-separated parts.
pub fn parse_live_value(value: &str) -> Option<(&str, &str)> {
    split_pair(value, ',')
}

/// Split `host:port` into its parts.
///
/// Returns `None` unless the value has exactly two colon-separated parts.
pub fn parse_host_port(value: &str) -> Option<(&str, &str)> {
    split_pair(value, ':')
}

fn split_pair(value: &str, sep: char) -> Option<(&str, &str)> {
    let mut parts = value.split(sep);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Some((a, b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_image_splits_tag() {
        assert_eq!(parse_docker_image("repo:1.2-7"), Ok(("repo", "1.2-7")));
        assert_eq!(
            parse_docker_image("registry:5000/team/api:2.0"),
            Ok(("registry:5000/team/api", "2.0"))
        );
    }

    #[test]
    fn docker_image_without_tag_is_bad() {
        assert_eq!(
            parse_docker_image("repo"),
            Err(ParseError::BadImage("repo".to_string()))
        );
        assert!(parse_docker_image("registry:5000/api").is_err());
    }

    #[test]
    fn version_splits_build() {
        assert_eq!(parse_version("repo:1.2-7"), Ok(("repo", "1.2", "7")));
        assert_eq!(parse_version("repo:1.2"), Ok(("repo", "1.2", "")));
        assert_eq!(parse_version("repo:1.2-rc-3"), Ok(("repo", "1.2-rc", "3")));
        assert!(parse_version("repo").is_err());
    }

    #[test]
    fn live_value_needs_two_parts() {
        assert_eq!(parse_live_value("a/b,c/d"), Some(("a/b", "c/d")));
        assert_eq!(parse_live_value("onlyone"), None);
        assert_eq!(parse_live_value("a,b,c"), None);
    }

    #[test]
    fn host_port_needs_two_parts() {
        assert_eq!(parse_host_port("10.0.0.5:31000"), Some(("10.0.0.5", "31000")));
        assert_eq!(parse_host_port("10.0.0.5"), None);
        assert_eq!(parse_host_port("::1:80"), None);
    }
}
