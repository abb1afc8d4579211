// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Player problems: non-fatal diagnostics that accumulate over a session.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Severity of a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, e.g. a clamped seek target
    Info,
    /// Something is inconsistent but playback is unaffected
    Warn,
    /// Data was lost (a message skipped, a source dropped)
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warn => write!(f, "warn"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic surfaced to the consumer without aborting playback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Problem {
    /// Human readable message
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// Optional remediation tip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
    /// Underlying error text, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Problem {
    /// Create a problem with the given severity.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            tip: None,
            error: None,
        }
    }

    /// Create an info problem.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    /// Create a warn problem.
    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, message)
    }

    /// Create an error problem.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Set the remediation tip.
    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip = Some(tip.into());
        self
    }

    /// Attach the underlying error.
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Receiver for problems as they are recorded.
///
/// Delivery is fire-and-forget: sinks cannot reject or answer.
pub trait DiagnosticsSink: Send + Sync {
    /// Called once for every recorded problem.
    fn report(&self, problem: &Problem);
}

/// Default sink: forwards problems to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, problem: &Problem) {
        let detail = problem.error.as_deref().unwrap_or("");
        match problem.severity {
            Severity::Info => info!(context = "problem", detail, "{}", problem.message),
            Severity::Warn => warn!(context = "problem", detail, "{}", problem.message),
            Severity::Error => error!(context = "problem", detail, "{}", problem.message),
        }
    }
}

/// Append-only problem list.
///
/// Problems are never removed once recorded; the log is the single place
/// where a session's diagnostics accumulate.
#[derive(Clone)]
pub struct ProblemLog {
    problems: Vec<Problem>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl Default for ProblemLog {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl fmt::Debug for ProblemLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemLog")
            .field("problems", &self.problems)
            .finish()
    }
}

impl ProblemLog {
    /// Create an empty log reporting to `sink`.
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            problems: Vec::new(),
            sink,
        }
    }

    /// Record a problem and forward it to the sink.
    pub fn push(&mut self, problem: Problem) {
        self.sink.report(&problem);
        self.problems.push(problem);
    }

    /// Record several problems in order.
    pub fn extend(&mut self, problems: impl IntoIterator<Item = Problem>) {
        for problem in problems {
            self.push(problem);
        }
    }

    /// All problems recorded so far, oldest first.
    pub fn as_slice(&self) -> &[Problem] {
        &self.problems
    }

    /// Number of recorded problems.
    pub fn len(&self) -> usize {
        self.problems.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    /// Number of problems with the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.problems
            .iter()
            .filter(|p| p.severity == severity)
            .count()
    }
}
