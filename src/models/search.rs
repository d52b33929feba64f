use chrono::{DateTime, Utc};

/// The search the user is currently looking at.
///
/// Built once per distinct detection and never mutated afterwards; a newer
/// detection replaces the whole record. `subject` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    query: String,
    subject: String,
    context: Option<String>,
    detected_at: DateTime<Utc>,
}

impl SearchRecord {
    /// Returns `None` when the subject is blank. An empty context collapses to `None`.
    pub fn new(
        query: impl Into<String>,
        subject: impl Into<String>,
        context: Option<String>,
        detected_at: DateTime<Utc>,
    ) -> Option<Self> {
        let subject = subject.into().trim().to_string();
        if subject.is_empty() {
            return None;
        }

        let context = context
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Some(Self {
            query: query.into(),
            subject,
            context,
            detected_at,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Status line shown when this record is published.
    pub fn status_message(&self) -> String {
        match &self.context {
            Some(context) => format!("Detected: '{}' from '{}'", self.subject, context),
            None => format!("Detected: '{}'", self.subject),
        }
    }
}
