//! Index renderer: pure functions turning the manifest into the two derived
//! HTML listing documents, a repository-wide package list and a per-package
//! file list.
//!
//! Both documents are regenerated in full from the manifest on every update,
//! never patched. Output order is the manifest's insertion order, so the same
//! manifest always renders to byte-identical markup. Handlebars escapes every
//! interpolation, so package and file names coming from CLI/filesystem input
//! cannot inject markup into the pages.

use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde_json::json;

use crate::index::Manifest;

pub use handlebars::RenderError;

const REPO_TEMPLATE: &str = "\
<!DOCTYPE html>
<html>
  <head>
    <title>Package index</title>
  </head>
  <body>
{{#each packages}}    <a href=\"/{{this}}/\">{{this}}</a><br>
{{/each}}  </body>
</html>
";

const PACKAGE_TEMPLATE: &str = "\
<!DOCTYPE html>
<html>
  <head>
    <title>Links for {{name}}</title>
  </head>
  <body>
    <h1>Links for {{name}}</h1>
{{#each files}}    <a href=\"/{{../name}}/{{this}}\">{{this}}</a><br>
{{/each}}  </body>
</html>
";

static TEMPLATES: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut registry = Handlebars::new();
    registry
        .register_template_string("repo_index", REPO_TEMPLATE)
        .expect("repo index template is well-formed");
    registry
        .register_template_string("package_index", PACKAGE_TEMPLATE)
        .expect("package index template is well-formed");
    registry
});

/// Renders the repository-wide listing: one link per package, manifest order.
pub fn render_repo_index(manifest: &Manifest) -> Result<String, RenderError> {
    let packages: Vec<&str> = manifest.keys().map(String::as_str).collect();
    TEMPLATES.render("repo_index", &json!({ "packages": packages }))
}

/// Renders the listing of a single package's files, manifest order. A package
/// without a manifest entry renders as an empty listing.
pub fn render_package_index(manifest: &Manifest, package: &str) -> Result<String, RenderError> {
    let files: &[String] = manifest.get(package).map(Vec::as_slice).unwrap_or(&[]);
    TEMPLATES.render(
        "package_index",
        &json!({ "name": package, "files": files }),
    )
}
