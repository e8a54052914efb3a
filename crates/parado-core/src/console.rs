use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stdout,
    Stderr,
    System,
}

impl Channel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Stdout => "out",
            Self::Stderr => "err",
            Self::System => "sys",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub channel: Channel,
    pub text: String,
    pub created_at: DateTime<Local>,
}

impl LogEntry {
    pub fn timestamp(&self) -> String {
        self.created_at.format("%H:%M:%S").to_string()
    }

    pub fn render(&self) -> String {
        format!("[{}] {} {}", self.timestamp(), self.channel.label(), self.text)
    }
}

/// Append-only session log. Entries are only removed by [`ConsoleLog::clear`].
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
    entries: Vec<LogEntry>,
}

impl ConsoleLog {
    pub fn push(&mut self, channel: Channel, text: impl Into<String>) {
        let text = text.into();
        tracing::trace!(channel = channel.label(), %text, "console entry");
        self.entries.push(LogEntry {
            channel,
            text,
            created_at: Local::now(),
        });
    }

    pub fn stdout(&mut self, text: impl Into<String>) {
        self.push(Channel::Stdout, text);
    }

    pub fn stderr(&mut self, text: impl Into<String>) {
        self.push(Channel::Stderr, text);
    }

    pub fn system(&mut self, text: impl Into<String>) {
        self.push(Channel::System, text);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries appended after the log held `mark` entries.
    pub fn since(&self, mark: usize) -> &[LogEntry] {
        self.entries.get(mark..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Channel, ConsoleLog};

    #[test]
    fn entries_keep_append_order() {
        let mut log = ConsoleLog::default();
        log.system("start");
        log.stdout("hello");
        log.stderr("oops");
        let channels: Vec<Channel> = log.entries().iter().map(|e| e.channel).collect();
        assert_eq!(channels, vec![Channel::System, Channel::Stdout, Channel::Stderr]);
        assert_eq!(log.entries()[1].text, "hello");
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = ConsoleLog::default();
        log.stdout("a");
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn since_returns_new_entries_only() {
        let mut log = ConsoleLog::default();
        log.stdout("old");
        let mark = log.len();
        log.stdout("new");
        let fresh: Vec<&str> = log.since(mark).iter().map(|e| e.text.as_str()).collect();
        assert_eq!(fresh, vec!["new"]);
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn timestamp_is_wall_clock_time() {
        let mut log = ConsoleLog::default();
        log.system("tick");
        let stamp = log.entries()[0].timestamp();
        assert_eq!(stamp.len(), 8);
        assert_eq!(stamp.matches(':').count(), 2);
        assert!(log.entries()[0].render().ends_with("sys tick"));
    }
}
