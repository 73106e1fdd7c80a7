//! Placeholder templates
//!
//! `{{ expr }}` is replaced by the value of `expr`:
//!
//! | expression          | value                                             |
//! |---------------------|---------------------------------------------------|
//! | `content`           | content being laid out                            |
//! | `title`             | attribute of the item being compiled              |
//! | `config.base_url`   | configuration value                               |
//! | `param.lang`        | parameter of the filter or layout step            |
//! | `compiled /a.md`    | last snapshot of another item's default rep       |
//! | `path /a.md`        | output path of another item's default rep         |
//! | `list /posts/*`     | HTML list of links to the matching items          |

use anyhow::anyhow;
use kiln_core::{FilterContext, FilterError, LAST_SNAPSHOT};
use kiln_types::{Attributes, Identifier, Pattern};
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap());

const DEFAULT_REP: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expression {
    Content,
    Attribute(String),
    Config(String),
    Param(String),
    Compiled(String),
    Path(String),
    List(String),
}

fn parse_expression(expr: &str) -> Expression {
    if let Some((head, arg)) = expr.split_once(char::is_whitespace) {
        let arg = arg.trim().to_string();
        match head {
            "compiled" => return Expression::Compiled(arg),
            "path" => return Expression::Path(arg),
            "list" => return Expression::List(arg),
            _ => {}
        }
    }
    if expr == "content" {
        Expression::Content
    } else if let Some(key) = expr.strip_prefix("config.") {
        Expression::Config(key.to_string())
    } else if let Some(key) = expr.strip_prefix("param.") {
        Expression::Param(key.to_string())
    } else {
        Expression::Attribute(expr.to_string())
    }
}

/// Expand every placeholder in `template`
pub fn render(
    template: &str,
    content: Option<&str>,
    params: &Attributes,
    ctx: &FilterContext<'_>,
) -> Result<String, FilterError> {
    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        output.push_str(&template[last..whole.start()]);
        output.push_str(&evaluate(&parse_expression(expr.as_str()), content, params, ctx)?);
        last = whole.end();
    }
    output.push_str(&template[last..]);
    Ok(output)
}

fn evaluate(
    expr: &Expression,
    content: Option<&str>,
    params: &Attributes,
    ctx: &FilterContext<'_>,
) -> Result<String, FilterError> {
    let value = match expr {
        Expression::Content => content.unwrap_or_default().to_string(),
        Expression::Attribute(key) => ctx
            .item()
            .attribute(key)
            .and_then(|value| value.to_display_string())
            .map(|value| escape_html(&value))
            .unwrap_or_default(),
        Expression::Config(key) => ctx
            .config_value(key)
            .and_then(|value| value.to_display_string())
            .map(|value| escape_html(&value))
            .unwrap_or_default(),
        Expression::Param(key) => params
            .get(key)
            .and_then(|value| value.to_display_string())
            .map(|value| escape_html(&value))
            .unwrap_or_default(),
        Expression::Compiled(target) => {
            let id = identifier(target)?;
            let compiled = ctx.compiled_content(&id, DEFAULT_REP, LAST_SNAPSHOT)?;
            compiled
                .as_text()
                .ok_or_else(|| FilterError::BinaryInput {
                    filter: "template".to_string(),
                })?
                .to_string()
        }
        Expression::Path(target) => {
            let id = identifier(target)?;
            ctx.rep_path(&id, DEFAULT_REP, LAST_SNAPSHOT)?
                .unwrap_or_default()
        }
        Expression::List(glob) => render_list(&Pattern::glob(glob.as_str()), ctx)?,
    };
    Ok(value)
}

fn render_list(pattern: &Pattern, ctx: &FilterContext<'_>) -> Result<String, FilterError> {
    let mut documents = ctx.items_matching(pattern);
    documents.sort_by(|a, b| a.identifier().as_str().cmp(b.identifier().as_str()));

    let mut html = String::from("<ul>\n");
    for document in documents {
        let id = document.identifier();
        let title = ctx
            .item_attribute(id, "title")
            .and_then(|value| value.to_display_string())
            .unwrap_or_else(|| id.to_string());
        let path = match ctx.rep_path(id, DEFAULT_REP, LAST_SNAPSHOT) {
            Ok(path) => path,
            Err(FilterError::UnknownRep(_)) => None,
            Err(e) => return Err(e),
        };
        match path {
            Some(path) => html.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                escape_html(&path),
                escape_html(&title)
            )),
            None => html.push_str(&format!("<li>{}</li>\n", escape_html(&title))),
        }
    }
    html.push_str("</ul>");
    Ok(html)
}

fn identifier(target: &str) -> Result<Identifier, FilterError> {
    Identifier::full(target).map_err(|e| FilterError::Failed(anyhow!(e)))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expression() {
        assert_eq!(parse_expression("content"), Expression::Content);
        assert_eq!(parse_expression("title"), Expression::Attribute("title".into()));
        assert_eq!(
            parse_expression("config.site.name"),
            Expression::Config("site.name".into())
        );
        assert_eq!(parse_expression("param.lang"), Expression::Param("lang".into()));
        assert_eq!(
            parse_expression("compiled /a.md"),
            Expression::Compiled("/a.md".into())
        );
        assert_eq!(parse_expression("path  /a.md"), Expression::Path("/a.md".into()));
        assert_eq!(
            parse_expression("list /posts/*"),
            Expression::List("/posts/*".into())
        );
    }

    #[test]
    fn test_placeholder_matches_trimmed_expression() {
        let caps = PLACEHOLDER.captures("<h1>{{  title }}</h1>").unwrap();
        assert_eq!(&caps[1], "title");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
    }
}
