//! Diagnostic collection with debug-gated logging.

use dc_core::{DebugConfig, Diagnostic, DiagnosticSeverity};
use tracing::{error, info, warn};

/// Records every diagnostic and forwards the ones the debug flag allows to
/// `tracing`. Errors are always forwarded.
#[derive(Debug)]
pub(crate) struct Reporter {
    debug: DebugConfig,
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub(crate) const fn new(debug: DebugConfig) -> Self {
        Self {
            debug,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        if self.debug.should_log(diagnostic.severity) {
            emit(&diagnostic);
        }
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn finish(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

fn emit(diagnostic: &Diagnostic) {
    let stage = diagnostic.stage.as_str();
    let element = diagnostic.element_index;
    let excerpt = diagnostic.excerpt.as_deref().unwrap_or_default();
    let message = diagnostic.message.as_str();
    match diagnostic.severity {
        DiagnosticSeverity::Error => error!(stage, ?element, excerpt, "{message}"),
        DiagnosticSeverity::Warning => warn!(stage, ?element, "{message}"),
        DiagnosticSeverity::Info => info!(stage, ?element, "{message}"),
    }
}
