//! Plain-text report assembly.
//!
//! A report is a title with an underline, a few header fields, zero or more
//! titled sections of lines and a closing summary block. Everything is kept
//! as ordered lines until `render()` joins them, so orchestration code never
//! concatenates strings itself.

#[derive(Debug, Clone, Default, PartialEq)]
struct Section {
    title: Option<String>,
    lines: Vec<String>,
}

/// Ordered-lines accumulator for one task report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportBuilder {
    title: String,
    header: Vec<String>,
    sections: Vec<Section>,
    summary: Vec<(String, String)>,
}

impl ReportBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            header: Vec::new(),
            sections: Vec::new(),
            summary: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Add a `label: value` line under the title.
    pub fn field(&mut self, label: &str, value: impl std::fmt::Display) -> &mut Self {
        self.header.push(format!("{}: {}", label, value));
        self
    }

    /// Start a new titled section; following `line` calls land in it.
    pub fn section(&mut self, title: impl Into<String>) -> &mut Self {
        self.sections.push(Section {
            title: Some(title.into()),
            lines: Vec::new(),
        });
        self
    }

    /// Append a line to the current section (an untitled one is opened if needed).
    pub fn line(&mut self, line: impl Into<String>) -> &mut Self {
        if self.sections.is_empty() {
            self.sections.push(Section::default());
        }
        if let Some(section) = self.sections.last_mut() {
            section.lines.push(line.into());
        }
        self
    }

    pub fn summary(&mut self, label: impl Into<String>, value: impl std::fmt::Display) -> &mut Self {
        self.summary.push((label.into(), value.to_string()));
        self
    }

    pub fn has_summary(&self) -> bool {
        !self.summary.is_empty()
    }

    /// All body lines in insertion order, without section titles.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .flat_map(|s| s.lines.iter().map(String::as_str))
    }

    pub fn render(&self) -> String {
        let mut out = vec![self.title.clone(), underline(&self.title, '=')];
        out.extend(self.header.iter().cloned());

        for section in &self.sections {
            out.push(String::new());
            if let Some(title) = &section.title {
                out.push(title.clone());
                out.push(underline(title, '-'));
            }
            out.extend(section.lines.iter().cloned());
        }

        if !self.summary.is_empty() {
            out.push(String::new());
            out.push("--- SUMMARY ---".to_string());
            for (label, value) in &self.summary {
                out.push(format!("{}: {}", label, value));
            }
        }

        out.join("\n")
    }
}

fn underline(text: &str, ch: char) -> String {
    std::iter::repeat(ch).take(text.chars().count().max(3)).collect()
}

/// Aggregates the fragments of an interactive sub-session (e.g. the cleanup
/// menu). Produces a report only if the user actually picked an action, even
/// when that action yielded nothing.
#[derive(Debug, Clone)]
pub struct SessionReport {
    title: String,
    fragments: Vec<String>,
    actions_taken: usize,
}

pub const FRAGMENT_RULE_WIDTH: usize = 40;

impl SessionReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fragments: Vec::new(),
            actions_taken: 0,
        }
    }

    /// Record one user action and the text it produced (may be empty).
    pub fn record(&mut self, fragment: impl Into<String>) {
        self.actions_taken += 1;
        let fragment = fragment.into();
        if !fragment.trim().is_empty() {
            self.fragments.push(fragment);
        }
    }

    pub fn actions_taken(&self) -> usize {
        self.actions_taken
    }

    pub fn finish(self) -> Option<String> {
        if self.actions_taken == 0 {
            return None;
        }

        let rule = "=".repeat(FRAGMENT_RULE_WIDTH);
        let mut out = vec![self.title.clone(), underline(&self.title, '='), String::new()];
        for fragment in &self.fragments {
            out.push(fragment.clone());
            out.push(String::new());
            out.push(rule.clone());
            out.push(String::new());
        }
        if self.fragments.is_empty() {
            out.push("No output was produced by the selected actions.".to_string());
        }

        Some(out.join("\n").trim_end().to_string())
    }
}
