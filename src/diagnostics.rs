use std::fmt;

/// Severity of a diagnostic, ordered from harmless to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    #[default]
    None,
    Message,
    Warning,
    Error,
    Abort,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Message => "message",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// A single logged problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Accumulates diagnostics produced while computing a skeleton.
///
/// Computation never fails outright; callers poll [`ErrorLog::severity`]
/// afterwards to decide whether to trust the result. Every entry is also
/// emitted as a `tracing` event.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Vec<Diagnostic>,
}

impl ErrorLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::None | Severity::Message => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error | Severity::Abort => tracing::error!("{message}"),
        }
        self.entries.push(Diagnostic { severity, message });
    }

    /// Appends a message-level diagnostic.
    pub fn message(&mut self, message: impl Into<String>) {
        self.push(Severity::Message, message);
    }

    /// Appends a warning.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message);
    }

    /// Appends an error.
    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    /// Moves all entries of `other` into this log without re-emitting them.
    pub fn append(&mut self, other: &mut ErrorLog) {
        self.entries.append(&mut other.entries);
    }

    /// Highest severity logged so far.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.entries
            .iter()
            .map(|d| d.severity)
            .max()
            .unwrap_or_default()
    }

    /// All diagnostics in the order they were logged.
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Returns `true` if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_has_no_severity() {
        let log = ErrorLog::new();
        assert_eq!(log.severity(), Severity::None);
        assert!(log.is_empty());
    }

    #[test]
    fn severity_is_the_maximum() {
        let mut log = ErrorLog::new();
        log.warning("edge skipped");
        log.message("note");
        assert_eq!(log.severity(), Severity::Warning);
        log.error("collapse failed");
        assert_eq!(log.severity(), Severity::Error);
        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.entries()[0].to_string(), "warning: edge skipped");
        log.clear();
        assert_eq!(log.severity(), Severity::None);
    }

    #[test]
    fn append_moves_entries() {
        let mut a = ErrorLog::new();
        let mut b = ErrorLog::new();
        b.error("boom");
        a.append(&mut b);
        assert!(b.is_empty());
        assert_eq!(a.severity(), Severity::Error);
    }
}
