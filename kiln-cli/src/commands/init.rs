//! Init command implementation.

use super::RULES_FILE;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Where compiled files are written
output_dir: output
# Compiler state kept between runs
tmp_dir: tmp/kiln
prune:
  auto_prune: true
data_sources:
  - type: filesystem
    content_dir: content
    layouts_dir: layouts
title: My kiln site
"#;

const DEFAULT_RULES: &str = r#"compile:
  - regex: '\.md$'
    steps:
      - filter: markdown
      - layout: /default.html
    path: "{without_ext}.html"
  - regex: '.*'
    path: "{identifier}"
layouts:
  - pattern: "/*.html"
    filter: template
"#;

const DEFAULT_LAYOUT: &str = r#"<!doctype html>
<html>
  <head><title>{{ title }} | {{ config.title }}</title></head>
  <body>
{{ content }}
  </body>
</html>
"#;

const SAMPLE_ITEM: &str = r#"---
title: Welcome
---

# Welcome

Edit `rules.yml` to decide how items are compiled, then run:

```bash
kiln build
kiln watch
```

See [[/about.md]].
"#;

const SAMPLE_ABOUT: &str = r#"---
title: About
---

Items link to each other with `[[/identifier]]`.
"#;

/// Initialize a new kiln project
pub fn init_project(path: Option<&Path>) -> Result<()> {
    let root = path.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(root).with_context(|| format!("Failed to create {:?}", root))?;

    write_if_missing(&root.join("kiln.yml"), DEFAULT_CONFIG)?;
    write_if_missing(&root.join(RULES_FILE), DEFAULT_RULES)?;
    write_if_missing(&root.join("layouts/default.html"), DEFAULT_LAYOUT)?;
    write_if_missing(&root.join("content/index.md"), SAMPLE_ITEM)?;
    write_if_missing(&root.join("content/about.md"), SAMPLE_ABOUT)?;

    println!("✓ kiln initialized in {:?}", root);
    println!("  - Edit kiln.yml for site settings and rules.yml for compilation rules");
    println!("  - Write items in content/ and layouts in layouts/");
    Ok(())
}

fn write_if_missing(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        println!("{:?} already exists", path);
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    println!("Created {:?}", path);
    Ok(())
}
