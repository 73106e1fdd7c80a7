//! YAML compilation rules
//!
//! A rules file selects items and layouts by pattern and gives each matched
//! item rep an ordered list of steps:
//!
//! ```yaml
//! preprocess:
//!   - pattern: "/posts/**/*"
//!     set: { kind: article }
//! compile:
//!   - pattern: "/**/*.md"
//!     steps:
//!       - filter: markdown
//!       - layout: /default.html
//!     path: "{without_ext}/index.html"
//!   - regex: '^/assets/(.*)$'
//!     path: "/static/{1}"
//! layouts:
//!   - pattern: "/**/*.html"
//!     filter: template
//! ```
//!
//! Every rep sequence starts with a `raw` snapshot and ends with `last`
//! (routed to `path`, when given). A `pre` snapshot is taken before the
//! first layout unless the steps declare one. The first matching rule wins
//! for each rep name.

use crate::action_provider::ActionProvider;
use crate::attributes::attributes_from_mapping;
use crate::code_snippet::CodeSnippet;
use crate::document::Document;
use crate::rep::LAST_SNAPSHOT;
use crate::site::Site;
use anyhow::{anyhow, bail};
use kiln_types::{ActionSequence, Attributes, Pattern, PatternError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const RAW_SNAPSHOT: &str = "raw";
pub const PRE_SNAPSHOT: &str = "pre";
pub const DEFAULT_REP: &str = "default";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").unwrap());

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Failed to read rules file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse rules: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("A rule needs exactly one of `pattern` or `regex`")]
    Selector,
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    preprocess: Vec<RawPreprocessRule>,
    #[serde(default)]
    compile: Vec<RawCompileRule>,
    #[serde(default)]
    layouts: Vec<RawLayoutRule>,
}

#[derive(Debug, Deserialize)]
struct RawSelector {
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    regex: Option<String>,
}

impl RawSelector {
    fn compile(self) -> Result<Pattern, RulesError> {
        match (self.pattern, self.regex) {
            (Some(glob), None) => Ok(Pattern::glob(glob)),
            (None, Some(regex)) => Ok(Pattern::regex(&regex)?),
            _ => Err(RulesError::Selector),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPreprocessRule {
    #[serde(flatten)]
    selector: RawSelector,
    #[serde(default)]
    set: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
struct RawCompileRule {
    #[serde(flatten)]
    selector: RawSelector,
    #[serde(default = "default_rep")]
    rep: String,
    #[serde(default)]
    steps: Vec<Step>,
    #[serde(default)]
    path: Option<String>,
}

fn default_rep() -> String {
    DEFAULT_REP.to_string()
}

#[derive(Debug, Deserialize)]
struct RawLayoutRule {
    #[serde(flatten)]
    selector: RawSelector,
    filter: String,
    #[serde(default)]
    params: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Step {
    Filter {
        filter: String,
        #[serde(default)]
        params: serde_yaml::Mapping,
    },
    Layout {
        layout: String,
        #[serde(default)]
        params: serde_yaml::Mapping,
    },
    Snapshot {
        snapshot: String,
        #[serde(default)]
        path: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct PreprocessRule {
    pattern: Pattern,
    set: Attributes,
}

#[derive(Debug, Clone)]
struct CompileRule {
    pattern: Pattern,
    rep: String,
    steps: Vec<Step>,
    path: Option<String>,
}

#[derive(Debug, Clone)]
struct LayoutRule {
    pattern: Pattern,
    filter: String,
    params: Attributes,
}

/// Parsed rules, usable as the compiler's action provider
#[derive(Debug, Clone)]
pub struct Rules {
    preprocess: Vec<PreprocessRule>,
    compile: Vec<CompileRule>,
    layouts: Vec<LayoutRule>,
    source: CodeSnippet,
}

impl Rules {
    pub fn from_file(path: &Path) -> Result<Self, RulesError> {
        let snippet = CodeSnippet::from_file(path)?;
        Self::parse(snippet)
    }

    /// Parse rules from YAML; the snippet's path names it in checksums
    pub fn parse(source: CodeSnippet) -> Result<Self, RulesError> {
        let file: RulesFile = if source.data.trim().is_empty() {
            RulesFile {
                preprocess: Vec::new(),
                compile: Vec::new(),
                layouts: Vec::new(),
            }
        } else {
            serde_yaml::from_str(&source.data)?
        };

        let preprocess = file
            .preprocess
            .into_iter()
            .map(|rule| {
                Ok(PreprocessRule {
                    pattern: rule.selector.compile()?,
                    set: attributes_from_mapping(rule.set),
                })
            })
            .collect::<Result<_, RulesError>>()?;

        let compile = file
            .compile
            .into_iter()
            .map(|rule| {
                Ok(CompileRule {
                    pattern: rule.selector.compile()?,
                    rep: rule.rep,
                    steps: rule.steps,
                    path: rule.path,
                })
            })
            .collect::<Result<_, RulesError>>()?;

        let layouts = file
            .layouts
            .into_iter()
            .map(|rule| {
                Ok(LayoutRule {
                    pattern: rule.selector.compile()?,
                    filter: rule.filter,
                    params: attributes_from_mapping(rule.params),
                })
            })
            .collect::<Result<_, RulesError>>()?;

        Ok(Self {
            preprocess,
            compile,
            layouts,
            source,
        })
    }

    fn compile_rule(&self, item: &Document, rep: &str) -> Option<&CompileRule> {
        self.compile
            .iter()
            .find(|rule| rule.rep == rep && item.identifier().matches(&rule.pattern))
    }
}

impl ActionProvider for Rules {
    fn rep_names_for(&self, item: &Document) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for rule in &self.compile {
            if item.identifier().matches(&rule.pattern) && !names.contains(&rule.rep) {
                names.push(rule.rep.clone());
            }
        }
        names
    }

    fn action_sequence_for_rep(&self, item: &Document, rep_name: &str) -> anyhow::Result<ActionSequence> {
        let rule = self
            .compile_rule(item, rep_name)
            .ok_or_else(|| anyhow!("No compilation rule for rep {rep_name:?} of {}", item.identifier()))?;
        let captures = rule.pattern.captures(item.identifier()).unwrap_or_default();
        let render = |template: &str| render_path(template, item, rep_name, &captures);

        let declares_pre = rule
            .steps
            .iter()
            .any(|step| matches!(step, Step::Snapshot { snapshot, .. } if snapshot == PRE_SNAPSHOT));
        let mut pre_taken = declares_pre;

        let mut sequence = ActionSequence::new();
        sequence.add_snapshot(RAW_SNAPSHOT, None);
        for step in &rule.steps {
            match step {
                Step::Filter { filter, params } => {
                    sequence.add_filter(filter.clone(), attributes_from_mapping(params.clone()));
                }
                Step::Layout { layout, params } => {
                    if !pre_taken {
                        sequence.add_snapshot(PRE_SNAPSHOT, None);
                        pre_taken = true;
                    }
                    sequence.add_layout(layout.clone(), attributes_from_mapping(params.clone()));
                }
                Step::Snapshot { snapshot, path } => {
                    let path = path.as_deref().map(render).transpose()?;
                    sequence.add_snapshot(snapshot.clone(), path);
                }
            }
        }
        let path = rule.path.as_deref().map(render).transpose()?;
        sequence.add_snapshot(LAST_SNAPSHOT, path);
        Ok(sequence)
    }

    fn action_sequence_for_layout(&self, layout: &Document) -> anyhow::Result<ActionSequence> {
        let mut sequence = ActionSequence::new();
        if let Some(rule) = self
            .layouts
            .iter()
            .find(|rule| layout.identifier().matches(&rule.pattern))
        {
            sequence.add_filter(rule.filter.clone(), rule.params.clone());
        }
        Ok(sequence)
    }

    fn code_snippets(&self) -> Vec<CodeSnippet> {
        vec![self.source.clone()]
    }

    fn preprocess(&self, site: &mut Site) -> anyhow::Result<()> {
        for rule in &self.preprocess {
            let mut updated = 0;
            for item in site.items.iter_mut() {
                if item.identifier().matches(&rule.pattern) {
                    item.update_attributes(rule.set.clone());
                    updated += 1;
                }
            }
            tracing::debug!("Preprocess rule {} updated {} items", rule.pattern, updated);
        }
        Ok(())
    }
}

/// Expand `{identifier}`, `{without_ext}`, `{without_exts}`, `{ext}`,
/// `{rep}` and regex captures `{1}`, `{2}`, ... in an output path template
fn render_path(
    template: &str,
    item: &Document,
    rep: &str,
    captures: &[String],
) -> anyhow::Result<String> {
    let id = item.identifier();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        let value = match name.as_str() {
            "identifier" => id.to_string(),
            "without_ext" => id.without_ext()?,
            "without_exts" => id.without_exts()?,
            "ext" => id.ext()?.unwrap_or_default(),
            "rep" => rep.to_string(),
            other => match other.parse::<usize>() {
                Ok(n) if n >= 1 => captures.get(n - 1).cloned().unwrap_or_default(),
                _ => bail!("Unknown placeholder {{{other}}} in path {template:?}"),
            },
        };
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_types::{Action, Identifier};

    const RULES: &str = r#"
preprocess:
  - pattern: "/posts/*.md"
    set: { kind: article }
compile:
  - regex: '\.md$'
    steps:
      - filter: markdown
      - layout: /default.html
        params: { wide: true }
    path: "{without_ext}/index.html"
  - regex: '\.md$'
    rep: raw
    path: "{identifier}"
  - regex: '^/assets/(.*)\.(\w+)$'
    path: "/static/{1}-v1.{2}"
layouts:
  - pattern: "/*.html"
    filter: template
    params: { escape: false }
"#;

    fn rules() -> Rules {
        Rules::parse(CodeSnippet::new("rules.yml", RULES)).unwrap()
    }

    fn item(path: &str) -> Document {
        Document::item(Identifier::full(path).unwrap(), "", Attributes::new())
    }

    #[test]
    fn test_rep_names() {
        let rules = rules();
        assert_eq!(rules.rep_names_for(&item("/about.md")), vec!["default", "raw"]);
        assert_eq!(rules.rep_names_for(&item("/assets/site.css")), vec!["default"]);
        assert!(rules.rep_names_for(&item("/robots.txt")).is_empty());
    }

    #[test]
    fn test_sequence_has_implicit_snapshots() {
        let sequence = rules()
            .action_sequence_for_rep(&item("/posts/hello.md"), "default")
            .unwrap();
        let actions: Vec<&Action> = sequence.iter().collect();

        assert!(matches!(actions[0], Action::Snapshot { name, path: None } if name == "raw"));
        assert!(matches!(actions[1], Action::Filter { name, .. } if name == "markdown"));
        assert!(matches!(actions[2], Action::Snapshot { name, .. } if name == "pre"));
        assert!(matches!(actions[3], Action::Layout { identifier, .. } if identifier == "/default.html"));
        assert_eq!(
            actions[4].path(),
            Some("/posts/hello/index.html")
        );
        assert_eq!(sequence.snapshot_names(), vec!["raw", "pre", "last"]);
    }

    #[test]
    fn test_regex_captures_in_paths() {
        let sequence = rules()
            .action_sequence_for_rep(&item("/assets/css/site.css"), "default")
            .unwrap();
        assert_eq!(sequence.paths(), vec![("last", "/static/css/site-v1.css")]);
    }

    #[test]
    fn test_layout_sequence() {
        let layout = Document::layout(
            Identifier::full("/default.html").unwrap(),
            "",
            Attributes::new(),
        );
        let sequence = rules().action_sequence_for_layout(&layout).unwrap();
        assert!(matches!(
            sequence.iter().next(),
            Some(Action::Filter { name, .. }) if name == "template"
        ));

        let unmatched = Document::layout(Identifier::full("/x.txt").unwrap(), "", Attributes::new());
        assert!(rules().action_sequence_for_layout(&unmatched).unwrap().is_empty());
    }

    #[test]
    fn test_preprocess_sets_attributes() {
        let mut site = Site::new(Default::default());
        site.items.add(item("/posts/a.md")).unwrap();
        site.items.add(item("/about.md")).unwrap();

        rules().preprocess(&mut site).unwrap();
        let post = site.items.get(&Identifier::full("/posts/a.md").unwrap()).unwrap();
        assert_eq!(post.attribute("kind").and_then(|v| v.as_str()), Some("article"));
        let about = site.items.get(&Identifier::full("/about.md").unwrap()).unwrap();
        assert!(about.attribute("kind").is_none());
    }

    #[test]
    fn test_unknown_placeholder() {
        let rules = Rules::parse(CodeSnippet::new(
            "rules.yml",
            "compile:\n  - pattern: '/*'\n    path: '/{slug}.html'\n",
        ))
        .unwrap();
        assert!(rules.action_sequence_for_rep(&item("/a.md"), "default").is_err());
    }

    #[test]
    fn test_selector_is_required() {
        let result = Rules::parse(CodeSnippet::new(
            "rules.yml",
            "compile:\n  - path: '/x.html'\n",
        ));
        assert!(matches!(result, Err(RulesError::Selector)));
    }
}
