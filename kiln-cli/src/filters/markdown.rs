//! Markdown to HTML, with `[[/identifier]]` links between items.

use kiln_core::{FilterContext, FilterError};
use kiln_types::Identifier;
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};

/// Rep whose output path an item link points at
const LINK_REP: &str = "default";

pub struct MarkdownFilter {
    options: Options,
}

impl Default for MarkdownFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownFilter {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        Self { options }
    }

    pub fn render(&self, markdown: &str, ctx: &FilterContext<'_>) -> Result<String, FilterError> {
        let events: Vec<Event> = Parser::new_ext(markdown, self.options).collect();
        let events = resolve_item_links(events, ctx)?;

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());
        Ok(html_output)
    }
}

/// Replace `[[/target.md]]` and `[[/target.md|text]]` in text outside code
/// blocks with links to the target's output path
fn resolve_item_links<'a>(
    events: Vec<Event<'a>>,
    ctx: &FilterContext<'_>,
) -> Result<Vec<Event<'a>>, FilterError> {
    let mut result = Vec::with_capacity(events.len());
    let mut pending_text = String::new();
    let mut in_code_block = false;

    for event in events {
        match event {
            Event::Text(text) if !in_code_block => {
                pending_text.push_str(&text);
                continue;
            }
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            _ => {}
        }
        flush_text(&mut pending_text, &mut result, ctx)?;
        result.push(event);
    }
    flush_text(&mut pending_text, &mut result, ctx)?;

    Ok(result)
}

fn flush_text<'a>(
    pending: &mut String,
    out: &mut Vec<Event<'a>>,
    ctx: &FilterContext<'_>,
) -> Result<(), FilterError> {
    if pending.is_empty() {
        return Ok(());
    }
    let text = std::mem::take(pending);
    let mut remaining = text.as_str();

    while let Some(start) = remaining.find("[[") {
        let Some(end) = remaining[start..].find("]]") else {
            break;
        };
        if start > 0 {
            out.push(text_event(&remaining[..start]));
        }
        out.extend(item_link(&remaining[start + 2..start + end], ctx)?);
        remaining = &remaining[start + end + 2..];
    }
    if !remaining.is_empty() {
        out.push(text_event(remaining));
    }
    Ok(())
}

fn item_link<'a>(link: &str, ctx: &FilterContext<'_>) -> Result<Vec<Event<'a>>, FilterError> {
    let (target, display) = match link.split_once('|') {
        Some((target, display)) => (target.trim(), Some(display.trim())),
        None => (link.trim(), None),
    };

    let Ok(id) = Identifier::full(target) else {
        return Ok(vec![text_event(&format!("[[{}]]", link))]);
    };
    let title = ctx
        .item_attribute(&id, "title")
        .and_then(|value| value.to_display_string());
    let text = display
        .map(str::to_string)
        .or(title)
        .unwrap_or_else(|| target.to_string());

    let path = match ctx.rep_path(&id, LINK_REP, kiln_core::LAST_SNAPSHOT) {
        Ok(path) => path,
        Err(FilterError::UnknownRep(_)) => None,
        Err(e) => return Err(e),
    };
    let Some(path) = path else {
        tracing::warn!("{}: link to {} has no output path", ctx.rep(), target);
        return Ok(vec![text_event(&text)]);
    };

    Ok(vec![
        Event::Start(Tag::Link {
            link_type: LinkType::Inline,
            dest_url: CowStr::Boxed(path.into_boxed_str()),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }),
        text_event(&text),
        Event::End(TagEnd::Link),
    ])
}

fn text_event<'a>(text: &str) -> Event<'a> {
    Event::Text(CowStr::Boxed(text.to_string().into_boxed_str()))
}
