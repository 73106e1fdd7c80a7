//! Filters the `kiln` binary offers to rules files:
//!
//! - `markdown`: Markdown to HTML
//! - `template`: `{{ expr }}` placeholders, usable on items and layouts
//! - `identity`: passes content through unchanged

mod markdown;
mod template;

use kiln_core::{FilterContext, FilterError, TransformStep, Transformer};
use kiln_types::Content;
use markdown::MarkdownFilter;

#[derive(Default)]
pub struct SiteFilters {
    markdown: MarkdownFilter,
}

impl SiteFilters {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for SiteFilters {
    fn apply(&self, step: TransformStep<'_>, ctx: &FilterContext<'_>) -> Result<Content, FilterError> {
        match step {
            TransformStep::Filter {
                name,
                params,
                content,
            } => match name {
                "identity" => Ok(content.clone()),
                "markdown" => {
                    let html = self.markdown.render(text(content, name)?, ctx)?;
                    Ok(Content::textual(html))
                }
                "template" => {
                    let rendered = template::render(text(content, name)?, None, params, ctx)?;
                    Ok(Content::textual(rendered))
                }
                other => Err(FilterError::UnknownFilter(other.to_string())),
            },
            TransformStep::Layout {
                layout,
                filter,
                params,
                content,
            } => match filter {
                "template" => {
                    let rendered = template::render(
                        text(layout.content(), filter)?,
                        Some(text(content, filter)?),
                        params,
                        ctx,
                    )?;
                    Ok(Content::textual(rendered))
                }
                other => Err(FilterError::UnknownFilter(other.to_string())),
            },
        }
    }
}

fn text<'a>(content: &'a Content, filter: &str) -> Result<&'a str, FilterError> {
    content.as_text().ok_or_else(|| FilterError::BinaryInput {
        filter: filter.to_string(),
    })
}
