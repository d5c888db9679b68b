//! Declarative template sources and their resolution.
//!
//! A template reaches a provider either by reference ([`TemplateSource::Url`])
//! or as literal content ([`TemplateSource::Body`]), never both. The
//! [`TemplateResolver`] trait is the seam deployers call; the
//! [`DefaultTemplateResolver`] maps URLs, inline documents, and local files.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

use crate::deployer::Provider;
use crate::error::DeployError;

/// Reference to, or literal content of, a declarative template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TemplateSource {
    /// Location the provider fetches the template from.
    Url(String),
    /// Literal template document.
    Body(String),
}

/// Maps a locator to a [`TemplateSource`].
pub trait TemplateResolver: Send + Sync {
    /// Resolves `locator` for the given provider, template version and region.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Validation`] when the locator cannot be resolved.
    fn resolve(
        &self,
        provider: Provider,
        locator: Option<&str>,
        version: &str,
        region: &str,
    ) -> Result<TemplateSource, DeployError>;
}

/// Resolver used by the CLI and the provider facade.
///
/// Resolution order: `http(s)://` locators become [`TemplateSource::Url`];
/// text that looks like a document (leading `{` or any newline) becomes
/// [`TemplateSource::Body`]; anything else is read as a local file. With no
/// locator the template URL is derived from the base URL, which may contain a
/// `{region}` placeholder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DefaultTemplateResolver {
    base_url: String,
}

impl DefaultTemplateResolver {
    /// Creates a resolver deriving default locations from `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn default_url(&self, provider: Provider, version: &str, region: &str) -> String {
        let base = self.base_url.trim().trim_end_matches('/').replace("{region}", region);
        format!("{base}/{version}/{provider}.yaml")
    }
}

impl TemplateResolver for DefaultTemplateResolver {
    fn resolve(
        &self,
        provider: Provider,
        locator: Option<&str>,
        version: &str,
        region: &str,
    ) -> Result<TemplateSource, DeployError> {
        let Some(raw) = locator.filter(|text| !text.trim().is_empty()) else {
            return Ok(TemplateSource::Url(self.default_url(provider, version, region)));
        };
        let trimmed = raw.trim();

        if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            return Ok(TemplateSource::Url(trimmed.to_owned()));
        }
        if trimmed.starts_with('{') || raw.contains('\n') {
            return Ok(TemplateSource::Body(raw.to_owned()));
        }

        let content = read_to_string_ambient(trimmed).map_err(|message| {
            DeployError::Validation(format!(
                "template '{trimmed}' is not a URL, an inline document, or a readable file: {message}"
            ))
        })?;
        if content.trim().is_empty() {
            return Err(DeployError::Validation(format!(
                "template file '{trimmed}' is empty"
            )));
        }
        Ok(TemplateSource::Body(content))
    }
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Write;

    #[fixture]
    fn resolver() -> DefaultTemplateResolver {
        DefaultTemplateResolver::new("https://templates.example.com/{region}/")
    }

    #[rstest]
    fn default_location_uses_version_and_provider(resolver: DefaultTemplateResolver) {
        let source = resolver
            .resolve(Provider::Aws, None, "v1.2.0", "eu-west-1")
            .expect("default should resolve");
        assert_eq!(
            source,
            TemplateSource::Url(String::from(
                "https://templates.example.com/eu-west-1/v1.2.0/aws.yaml"
            ))
        );
    }

    #[rstest]
    #[case("https://bucket.example.com/stack.yaml")]
    #[case("  http://internal/stack.json  ")]
    fn urls_pass_through(resolver: DefaultTemplateResolver, #[case] locator: &str) {
        let source = resolver
            .resolve(Provider::Aws, Some(locator), "latest", "us-east-1")
            .expect("url should resolve");
        assert_eq!(source, TemplateSource::Url(locator.trim().to_owned()));
    }

    #[rstest]
    #[case("{\"Resources\": {}}")]
    #[case("Resources:\n  Topic:\n    Type: AWS::SNS::Topic\n")]
    fn inline_documents_become_bodies(resolver: DefaultTemplateResolver, #[case] locator: &str) {
        let source = resolver
            .resolve(Provider::Aws, Some(locator), "latest", "us-east-1")
            .expect("inline should resolve");
        assert_eq!(source, TemplateSource::Body(locator.to_owned()));
    }

    #[rstest]
    fn local_files_are_read(resolver: DefaultTemplateResolver) {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "resources: []").expect("write template");
        let path = file.path().to_str().expect("utf8 path").to_owned();

        let source = resolver
            .resolve(Provider::Gcp, Some(&path), "latest", "us-central1")
            .expect("file should resolve");
        assert_eq!(source, TemplateSource::Body(String::from("resources: []")));
    }

    #[rstest]
    fn missing_files_are_rejected(resolver: DefaultTemplateResolver) {
        let err = resolver
            .resolve(
                Provider::Aws,
                Some("/nonexistent/backplane/template.yaml"),
                "latest",
                "us-east-1",
            )
            .expect_err("missing file should fail");
        assert!(matches!(err, DeployError::Validation(_)), "{err:?}");
    }
}
