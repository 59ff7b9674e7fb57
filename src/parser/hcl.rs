//! HCL directory parser implementation.
//!
//! This module provides the default [`ModuleParser`] built on the `hcl-rs`
//! crate. It reads the `.tf` files directly inside a resource directory and
//! produces one [`ParsedBlock`] per `module` and `resource` block.
//!
//! Attribute values are converted to JSON. `var.*` and `local.*` references
//! are resolved against `variable` defaults and `locals` found in the same
//! directory; references to other blocks become reference objects carrying
//! the referenced block's name under `__name__`.

use crate::config::Config;
use crate::error::{DiscoveryError, Result};
use crate::extract::REFERENCE_NAME_KEY;
use crate::parser::{ModuleParser, SKIP_FILES, TERRAFORM_EXTENSIONS};
use crate::types::{ParseResult, ParsedBlock, TfMeta};

use hcl::expr::{Expression, ObjectKey, TemplateExpr, Traversal, TraversalOperator};
use hcl::{Block, Body};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use walkdir::WalkDir;

// `${var.name}` / `${local.name}` interpolations inside template strings.
static INTERPOLATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*(var|local)\.([A-Za-z0-9_-]+)\s*\}").expect("Invalid regex")
});

/// HCL parser for Terraform resource directories.
pub struct HclModuleParser {
    /// File name patterns to ignore
    exclude_patterns: Vec<glob::Pattern>,
}

/// Values visible to `var.` and `local.` references, keyed `var.x` / `local.x`.
#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, Value>,
}

/// One parsed file waiting for block conversion.
struct SourceFile {
    name: String,
    content: String,
    body: Body,
}

impl HclModuleParser {
    /// Create a new HCL parser with the given configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let exclude_patterns = config
            .discovery
            .exclude_patterns
            .iter()
            .filter_map(|pattern| match glob::Pattern::new(pattern) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();

        Self { exclude_patterns }
    }

    /// Parse the contents of a single file.
    ///
    /// Variables and locals declared in the same content are resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid HCL.
    pub fn parse_content(&self, content: &str, file_name: &str) -> Result<ParseResult> {
        let file = read_body(content, file_name)?;
        let mut scope = Scope::default();
        scope.collect(&file.body);
        Ok(convert_file(&file, &scope))
    }

    /// Check if a path should be skipped.
    fn should_skip(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if file_name.starts_with('.') {
            tracing::debug!(path = %path.display(), reason = "hidden file/directory", "Skipping path");
            return true;
        }

        if SKIP_FILES.iter().any(|s| file_name == *s) {
            tracing::debug!(path = %path.display(), reason = "known skip file", "Skipping path");
            return true;
        }

        if self.exclude_patterns.iter().any(|p| p.matches(file_name)) {
            tracing::debug!(path = %path.display(), reason = "matches exclude pattern", "Skipping path");
            return true;
        }

        false
    }

    /// Check if a file is a Terraform file.
    fn is_terraform_file(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        TERRAFORM_EXTENSIONS.iter().any(|ext| path_str.ends_with(ext))
    }
}

impl ModuleParser for HclModuleParser {
    fn parse_dir(&mut self, dir: &Path) -> Result<ParseResult> {
        if !dir.is_dir() {
            return Err(crate::err!(DirectoryNotFound {
                path: dir.to_path_buf(),
            }));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                crate::err!(Parser {
                    dir: dir.to_path_buf(),
                    message: format!("failed to read directory entry: {e}"),
                })
            })?;
            let path = entry.path();
            if self.should_skip(path) || !entry.file_type().is_file() || !self.is_terraform_file(path) {
                continue;
            }

            tracing::trace!(file = %path.display(), "Parsing file");
            let content = std::fs::read_to_string(path)
                .map_err(|e| DiscoveryError::io(path, e, file!(), line!()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(read_body(&content, &name).map_err(|e| match e {
                DiscoveryError::HclParse { message, .. } => crate::err!(HclParse {
                    file: path.to_path_buf(),
                    message,
                }),
                other => other,
            })?);
        }

        let mut scope = Scope::default();
        for file in &files {
            scope.collect(&file.body);
        }

        let mut result = ParseResult::default();
        for file in &files {
            result.merge(convert_file(file, &scope));
        }

        tracing::debug!(
            dir = %dir.display(),
            files = files.len(),
            modules = result.modules.len(),
            resource_types = result.resources.len(),
            "Parsing complete"
        );

        Ok(result)
    }
}

fn read_body(content: &str, file_name: &str) -> Result<SourceFile> {
    let body: Body = hcl::from_str(content).map_err(|e| {
        crate::err!(HclParse {
            file: file_name.into(),
            message: e.to_string(),
        })
    })?;

    Ok(SourceFile {
        name: file_name.to_string(),
        content: content.to_string(),
        body,
    })
}

impl Scope {
    /// Record variable defaults and locals declared in a body.
    fn collect(&mut self, body: &Body) {
        for block in body.blocks() {
            match block.identifier.as_str() {
                "variable" => {
                    let Some(name) = block.labels.first().map(|l| l.as_str().to_string()) else {
                        continue;
                    };
                    if let Some(attr) = block.body.attributes().find(|a| a.key.as_str() == "default") {
                        let value = self.to_value(&attr.expr);
                        if !value.is_null() {
                            self.values.insert(format!("var.{name}"), value);
                        }
                    }
                }
                "locals" => {
                    for attr in block.body.attributes() {
                        let value = self.to_value(&attr.expr);
                        self.values.insert(format!("local.{}", attr.key.as_str()), value);
                    }
                }
                _ => {}
            }
        }
    }

    fn lookup(&self, kind: &str, name: &str) -> Option<&Value> {
        self.values.get(&format!("{kind}.{name}"))
    }

    /// Convert an expression to JSON.
    fn to_value(&self, expr: &Expression) -> Value {
        match expr {
            Expression::Null => Value::Null,
            Expression::Bool(b) => Value::Bool(*b),
            Expression::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::from(i)
                } else if let Some(u) = n.as_u64() {
                    Value::from(u)
                } else {
                    n.as_f64()
                        .and_then(serde_json::Number::from_f64)
                        .map_or(Value::Null, Value::Number)
                }
            }
            Expression::String(s) => Value::String(s.clone()),
            Expression::Array(items) => Value::Array(items.iter().map(|e| self.to_value(e)).collect()),
            Expression::Object(object) => Value::Object(
                object
                    .iter()
                    .map(|(key, value)| (self.object_key(key), self.to_value(value)))
                    .collect(),
            ),
            Expression::TemplateExpr(template) => match template.as_ref() {
                TemplateExpr::QuotedString(s) => self.interpolate(s),
                TemplateExpr::Heredoc(heredoc) => self.interpolate(&heredoc.template),
            },
            Expression::Variable(v) => Value::String(v.as_str().to_string()),
            Expression::Traversal(traversal) => self.traversal(traversal),
            Expression::Parenthesis(inner) => self.to_value(inner),
            other => Value::String(render(other)),
        }
    }

    fn object_key(&self, key: &ObjectKey) -> String {
        match key {
            ObjectKey::Identifier(id) => id.as_str().to_string(),
            ObjectKey::Expression(expr) => match self.to_value(expr) {
                Value::String(s) => s,
                other => other.to_string(),
            },
            _ => String::new(),
        }
    }

    /// Resolve `${var.x}` interpolations. A template consisting of exactly
    /// one resolvable interpolation keeps the referenced value's type.
    fn interpolate(&self, template: &str) -> Value {
        if let Some(caps) = INTERPOLATION_PATTERN.captures(template) {
            if caps.get(0).is_some_and(|m| m.as_str() == template) {
                if let Some(value) = self.lookup(&caps[1], &caps[2]) {
                    return value.clone();
                }
            }
        }

        let resolved = INTERPOLATION_PATTERN.replace_all(template, |caps: &regex::Captures<'_>| {
            match self.lookup(&caps[1], &caps[2]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => caps[0].to_string(),
            }
        });
        Value::String(resolved.into_owned())
    }

    fn traversal(&self, traversal: &Traversal) -> Value {
        let root = match &traversal.expr {
            Expression::Variable(v) => v.as_str().to_string(),
            other => return Value::String(render(other)),
        };

        let attrs: Vec<&str> = traversal
            .operators
            .iter()
            .map_while(|op| match op {
                TraversalOperator::GetAttr(id) => Some(id.as_str()),
                _ => None,
            })
            .collect();

        let mut address = root.clone();
        for attr in &attrs {
            address.push('.');
            address.push_str(attr);
        }

        match (root.as_str(), attrs.first()) {
            ("var" | "local", Some(name)) if attrs.len() == 1 => self
                .lookup(&root, name)
                .cloned()
                .unwrap_or_else(|| Value::String(format!("${{{address}}}"))),
            ("var" | "local" | "each" | "count" | "path" | "terraform", _) => {
                Value::String(format!("${{{address}}}"))
            }
            (_, Some(name)) => {
                let mut reference = Map::new();
                reference.insert(REFERENCE_NAME_KEY.to_string(), Value::from(*name));
                reference.insert("__ref__".to_string(), Value::String(address));
                Value::Object(reference)
            }
            (_, None) => Value::String(address),
        }
    }
}

fn render(expr: &Expression) -> String {
    hcl::format::to_string(expr).unwrap_or_else(|_| format!("{expr:?}"))
}

/// Convert the `module` and `resource` blocks of one file.
fn convert_file(file: &SourceFile, scope: &Scope) -> ParseResult {
    let mut result = ParseResult::default();

    for block in file.body.blocks() {
        match block.identifier.as_str() {
            "module" => {
                let Some(label) = block.labels.first().map(|l| l.as_str()) else {
                    tracing::warn!(file = %file.name, "Module block without a label");
                    continue;
                };
                let header = format!(r#"module\s+"?{}"?"#, regex::escape(label));
                let meta = block_meta(file, &header, label, format!("module.{label}"));
                result.modules.push(convert_block(block, meta, scope));
            }
            "resource" => {
                let (Some(kind), Some(label)) = (
                    block.labels.first().map(|l| l.as_str()),
                    block.labels.get(1).map(|l| l.as_str()),
                ) else {
                    tracing::warn!(file = %file.name, "Resource block without type and name labels");
                    continue;
                };
                let header = format!(
                    r#"resource\s+"?{}"?\s+"?{}"?"#,
                    regex::escape(kind),
                    regex::escape(label)
                );
                let meta = block_meta(file, &header, label, format!("{kind}.{label}"));
                result
                    .resources
                    .entry(kind.to_string())
                    .or_default()
                    .push(convert_block(block, meta, scope));
            }
            _ => {
                // variable/locals feed the scope; provider, data, output are not catalogued
            }
        }
    }

    result
}

fn convert_block(block: &Block, meta: TfMeta, scope: &Scope) -> ParsedBlock {
    ParsedBlock {
        meta: Some(meta),
        attributes: body_to_map(&block.body, scope),
    }
}

fn body_to_map(body: &Body, scope: &Scope) -> Map<String, Value> {
    let mut map = Map::new();
    for attr in body.attributes() {
        map.insert(attr.key.as_str().to_string(), scope.to_value(&attr.expr));
    }

    // Nested blocks become objects; repeated blocks become a list.
    for nested in body.blocks() {
        let key = nested.identifier.as_str().to_string();
        let value = Value::Object(body_to_map(&nested.body, scope));
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }

    map
}

fn block_meta(file: &SourceFile, header: &str, label: &str, path: String) -> TfMeta {
    let (line_start, line_end) = block_span(&file.content, header).unwrap_or((0, 0));
    TfMeta {
        label: label.to_string(),
        filename: file.name.clone(),
        path,
        line_start,
        line_end,
    }
}

/// Locate a block by its header pattern and return its 1-based line span.
fn block_span(content: &str, header: &str) -> Option<(usize, usize)> {
    let pattern = Regex::new(&format!(r"(?m)^[ \t]*{header}[ \t]*\{{")).ok()?;
    let found = pattern.find(content)?;
    let line_of = |offset: usize| content[..offset].matches('\n').count() + 1;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;
    let body = &content[found.end() - 1..];

    for (offset, ch) in body.char_indices() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            continue;
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '#' => in_comment = true,
            '/' if body[offset..].starts_with("//") => in_comment = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some((line_of(found.start()), line_of(found.end() - 1 + offset)));
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn create_test_parser() -> HclModuleParser {
        HclModuleParser::new(&Config::default())
    }

    const RDS: &str = r#"variable "namespace" {
  default = "visits-dev"
}

variable "is_production" {
  default = "false"
}

module "rds" {
  source = "github.com/ministryofjustice/cloud-platform-terraform-rds-instance?ref=5.2.1"

  db_instance_class        = "db.t4g.micro"
  db_max_allocated_storage = 100
  namespace                = var.namespace
  is_production            = var.is_production
  environment_name         = "${var.namespace}-env"

  providers = {
    aws = aws.london
  }
}
"#;

    #[test]
    fn test_parse_module_with_metadata() {
        let result = create_test_parser().parse_content(RDS, "rds.tf").unwrap();

        assert_eq!(result.modules.len(), 1);
        let module = &result.modules[0];
        let meta = module.meta.as_ref().unwrap();
        assert_eq!(meta.label, "rds");
        assert_eq!(meta.filename, "rds.tf");
        assert_eq!(meta.path, "module.rds");
        assert_eq!(meta.line_start, 9);
        assert_eq!(meta.line_end, 21);
        assert!(module.source().contains("rds-instance"));
    }

    #[test]
    fn test_variables_are_resolved() {
        let result = create_test_parser().parse_content(RDS, "rds.tf").unwrap();
        let module = &result.modules[0];

        assert_eq!(module.get("namespace"), Some(&json!("visits-dev")));
        assert_eq!(module.get("is_production"), Some(&json!("false")));
        assert_eq!(module.get("environment_name"), Some(&json!("visits-dev-env")));
        assert_eq!(module.get("db_max_allocated_storage"), Some(&json!(100)));
    }

    #[test]
    fn test_block_references_become_reference_objects() {
        let content = r#"
resource "aws_elasticache_parameter_group" "custom" {
  name   = "visits-params"
  family = "redis7"
}

module "cache" {
  source               = "github.com/ministryofjustice/cloud-platform-terraform-elasticache-cluster?ref=6.2.0"
  parameter_group_name = aws_elasticache_parameter_group.custom.name
}
"#;
        let result = create_test_parser().parse_content(content, "cache.tf").unwrap();
        let reference = result.modules[0].get("parameter_group_name").unwrap();

        assert_eq!(reference[REFERENCE_NAME_KEY], json!("custom"));
        assert_eq!(
            reference["__ref__"],
            json!("aws_elasticache_parameter_group.custom.name")
        );
        assert_eq!(
            result.collection("aws_elasticache_parameter_group").unwrap().len(),
            1
        );
    }

    #[test]
    fn test_parse_pingdom_resources() {
        let content = r#"
resource "pingdom_check" "visits-health" {
  type                     = "http"
  name                     = "visits - health"
  host                     = "visits.service.justice.gov.uk"
  resolution               = 1
  notifywhenbackup         = true
  sendnotificationwhendown = 6
  integrationids           = [12345]
  url                      = "/health"
  probefilters             = "region:EU"
}
"#;
        let result = create_test_parser().parse_content(content, "pingdom.tf").unwrap();
        let checks = result.collection("pingdom_check").unwrap();

        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].kind(), "http");
        assert_eq!(checks[0].get("integrationids"), Some(&json!([12345])));
        assert_eq!(checks[0].meta.as_ref().unwrap().path, "pingdom_check.visits-health");
        assert_eq!(checks[0].meta.as_ref().unwrap().line_start, 2);
        assert_eq!(checks[0].meta.as_ref().unwrap().line_end, 12);
    }

    #[test]
    fn test_unresolved_variable_is_kept_as_template() {
        let content = r#"
module "template" {
  source      = "github.com/ministryofjustice/hmpps-template?ref=1.1"
  github_repo = var.repo
}
"#;
        let result = create_test_parser().parse_content(content, "main.tf").unwrap();
        assert_eq!(result.modules[0].get("github_repo"), Some(&json!("${var.repo}")));
    }

    #[test]
    fn test_braces_in_strings_do_not_end_block() {
        let content = "module \"a\" {\n  source = \"x\"\n  note = \"}\"\n  # }\n}\n";
        assert_eq!(block_span(content, r#"module\s+"?a"?"#), Some((1, 5)));
    }

    #[test]
    fn test_parse_invalid_hcl() {
        let result = create_test_parser().parse_content("this is not valid { hcl", "bad.tf");
        assert!(matches!(result, Err(DiscoveryError::HclParse { .. })));
    }

    #[test]
    fn test_parse_dir_reads_top_level_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rds.tf"), RDS).unwrap();
        std::fs::write(dir.path().join("README.md"), "# not terraform").unwrap();
        std::fs::create_dir(dir.path().join(".terraform")).unwrap();
        std::fs::write(dir.path().join(".terraform/cached.tf"), "module \"x\" {\n source = \"y\"\n}\n").unwrap();

        let mut parser = create_test_parser();
        let result = parser.parse_dir(dir.path()).unwrap();
        assert_eq!(result.modules.len(), 1);
    }

    #[test]
    fn test_variables_resolve_across_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("variables.tf"),
            "variable \"namespace\" {\n  default = \"visits-prod\"\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("cache.tf"),
            "module \"cache\" {\n  source    = \"cloud-platform-terraform-elasticache-cluster\"\n  namespace = var.namespace\n}\n",
        )
        .unwrap();

        let result = create_test_parser().parse_dir(dir.path()).unwrap();
        assert_eq!(result.modules[0].get("namespace"), Some(&json!("visits-prod")));
    }

    #[test]
    fn test_parse_dir_missing() {
        let result = create_test_parser().parse_dir(Path::new("/nonexistent/resources"));
        assert!(matches!(result, Err(DiscoveryError::DirectoryNotFound { .. })));
    }

    #[test]
    fn test_should_skip() {
        let parser = create_test_parser();

        assert!(parser.should_skip(Path::new(".terraform")));
        assert!(parser.should_skip(Path::new(".git")));
        assert!(parser.should_skip(Path::new(".terragrunt-cache")));
        assert!(!parser.should_skip(Path::new("main.tf")));
    }

    #[test]
    fn test_is_terraform_file() {
        let parser = create_test_parser();

        assert!(parser.is_terraform_file(Path::new("main.tf")));
        assert!(parser.is_terraform_file(Path::new("variables.tf")));
        assert!(!parser.is_terraform_file(Path::new("readme.md")));
    }
}
