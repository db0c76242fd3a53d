//! Append-only narration collected during a run and flushed to the incident
//! as a single note once the investigation is done.

/// Severity tag prefixed to each recorded line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteSeverity {
    Info,
    Success,
    Warning,
    Failure,
}

impl NoteSeverity {
    #[must_use]
    const fn tag(self) -> &'static str {
        match self {
            Self::Info => "[info]",
            Self::Success => "[ok]",
            Self::Warning => "[warning]",
            Self::Failure => "[failure]",
        }
    }
}

/// Collects severity-tagged lines on behalf of one investigation run.
#[derive(Debug)]
pub struct NoteWriter {
    investigation: String,
    lines: Vec<String>,
}

impl NoteWriter {
    #[must_use]
    pub fn new(investigation: impl Into<String>) -> Self {
        Self {
            investigation: investigation.into(),
            lines: Vec::new(),
        }
    }

    pub fn append(&mut self, severity: NoteSeverity, line: impl AsRef<str>) {
        self.lines
            .push(format!("{} {}", severity.tag(), line.as_ref()));
    }

    pub fn info(&mut self, line: impl AsRef<str>) {
        self.append(NoteSeverity::Info, line);
    }

    pub fn success(&mut self, line: impl AsRef<str>) {
        self.append(NoteSeverity::Success, line);
    }

    pub fn warning(&mut self, line: impl AsRef<str>) {
        self.append(NoteSeverity::Warning, line);
    }

    pub fn failure(&mut self, line: impl AsRef<str>) {
        self.append(NoteSeverity::Failure, line);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Renders the accumulated lines, or `None` when nothing was recorded.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let mut note = format!("Automation '{}' notes:\n", self.investigation);
        note.push_str(&self.lines.join("\n"));
        Some(note)
    }
}
