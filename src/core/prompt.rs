use anyhow::{Context, Result};
use std::path::Path;

pub const PATCHES_PLACEHOLDER: &str = "{patches}";
pub const FILENAME_PLACEHOLDER: &str = "{filename}";

const DEFAULT_TEMPLATE: &str = r#"You are reviewing one file of a pull request: `{filename}`.

The changes are given in two sections. `---new_hunk---` holds the new version of
the changed regions; every line starts with its line number in the new file.
`---old_hunk---` holds the old version of the same regions without line numbers.

{patches}

Review only the new version. Report bugs, security problems, performance
problems and clear mistakes. Do not comment on formatting.

Respond with one block per issue, using exactly this layout:

<start line>-<end line>:
<one-line description of the issue>
```diff
<optional suggested change, lines prefixed with - and +>
```
---

Line numbers refer to the new file. Separate blocks with a line containing
only `---`. If a range has no issues, write `LGTM!` as its description. If the
whole file has no issues, respond with only `LGTM!`."#;

/// Review prompt with `{patches}` and `{filename}` substitution points.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [PATCHES_PLACEHOLDER, FILENAME_PLACEHOLDER] {
            if !template.contains(placeholder) {
                anyhow::bail!("Prompt template is missing the {} placeholder", placeholder);
            }
        }
        Ok(Self { template })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template {}", path.display()))?;
        Self::new(content)
    }

    pub fn render(&self, patches: &str, filename: &str) -> String {
        // Patches last so placeholder text inside a patch survives
        self.template
            .replace(FILENAME_PLACEHOLDER, filename)
            .replace(PATCHES_PLACEHOLDER, patches)
    }
}
