use std::{
    fmt::Display,
    ops::{Deref, DerefMut},
};

use serde::Serialize;

/// Category of a finding. Every error type in the crate maps onto one of these.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FindingKind {
    Parse,
    DeviceMismatch,
    IdentMismatch,
    SeriesExhausted,
    InsufficientStock,
    ExcessOverrun,
    Config,
    EmptyBoundedSeries,
    Validation,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Advice,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "Error"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Advice => write!(f, "Advice"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: FindingKind,
    pub severity: Severity,
    /// What the finding is about: an ident, a refdes, a motif or a file.
    pub subject: String,
    pub body: String,

    /// Optional underlying finding, e.g. the catalog miss behind a failed motif solve.
    pub child: Option<Box<Diagnostic>>,
}

impl Diagnostic {
    pub fn new(kind: FindingKind, severity: Severity, body: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            subject: String::new(),
            body: body.into(),
            child: None,
        }
    }

    pub fn error(kind: FindingKind, body: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, body)
    }

    pub fn warning(kind: FindingKind, body: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, body)
    }

    pub fn with_subject(self, subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..self
        }
    }

    pub fn with_child(self, child: Diagnostic) -> Self {
        Self {
            child: Some(Box::new(child)),
            ..self
        }
    }

    /// Downgrade to a warning, keeping kind and body.
    pub fn as_warning(self) -> Self {
        Self {
            severity: Severity::Warning,
            ..self
        }
    }

    /// Return `true` if the diagnostic severity is `Error`.
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut current = Some(self);
        let mut first = true;
        while let Some(diag) = current {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}: ", diag.severity)?;
            if !diag.subject.is_empty() {
                write!(f, "{} ", diag.subject)?;
            }
            write!(f, "{}", diag.body)?;
            current = diag.child.as_deref();
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

macro_rules! impl_from_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Diagnostic {
                fn from(err: $ty) -> Self {
                    Diagnostic::error(err.finding_kind(), err.to_string())
                }
            }
        )*
    };
}

impl_from_error!(
    crate::quantity::QuantityError,
    crate::device::IdentError,
    crate::series::SeriesError,
    crate::catalog::CatalogError,
    crate::component::ComponentError,
    crate::motif::MotifError,
    crate::bom::BomError,
    crate::inventory::InventoryError,
    crate::guideline::GuidelineError,
    crate::config::ConfigError,
);

impl From<crate::quantity::ParseError> for Diagnostic {
    fn from(err: crate::quantity::ParseError) -> Self {
        Diagnostic::error(FindingKind::Parse, err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct WithDiagnostics<T> {
    pub diagnostics: Diagnostics,
    pub output: Option<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic>,
}

impl Deref for Diagnostics {
    type Target = Vec<Diagnostic>;
    fn deref(&self) -> &Self::Target {
        &self.diagnostics
    }
}

impl DerefMut for Diagnostics {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.diagnostics
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

impl<T> Default for WithDiagnostics<T> {
    fn default() -> Self {
        Self {
            diagnostics: Diagnostics::default(),
            output: None,
        }
    }
}

impl<T> WithDiagnostics<T> {
    pub fn success(output: T) -> Self {
        Self {
            diagnostics: Diagnostics::default(),
            output: Some(output),
        }
    }

    pub fn new(output: T, diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            output: Some(output),
        }
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, diagnostics: I) {
        self.diagnostics.extend(diagnostics);
    }

    /// Return `true` if an output was produced **and** no error-level diagnostics
    /// were recorded.
    pub fn is_success(&self) -> bool {
        self.output.is_some() && !self.diagnostics.has_errors()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WithDiagnostics<U> {
        WithDiagnostics {
            diagnostics: self.diagnostics,
            output: self.output.map(f),
        }
    }

    pub fn output_result(self) -> Result<T, Diagnostics> {
        self.into()
    }

    pub fn unpack(self) -> (Option<T>, Diagnostics) {
        (self.output, self.diagnostics)
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_none() && self.diagnostics.is_empty()
    }
}

impl Diagnostics {
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diag| matches!(diag.severity, Severity::Error))
            .cloned()
            .collect()
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diag| matches!(diag.severity, Severity::Warning))
            .cloned()
            .collect()
    }

    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |diag| diag.kind == kind)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|diag| diag.is_error())
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Diagnostics { diagnostics }
    }
}

impl<T> From<WithDiagnostics<T>> for Result<T, Diagnostics> {
    fn from(eval: WithDiagnostics<T>) -> Self {
        match eval.output {
            Some(output) if !eval.diagnostics.has_errors() => Ok(output),
            _ => Err(eval.diagnostics),
        }
    }
}

impl<T, D: Into<Diagnostic>> From<D> for WithDiagnostics<T> {
    fn from(diagnostic: D) -> Self {
        WithDiagnostics {
            diagnostics: vec![diagnostic.into()].into(),
            output: None,
        }
    }
}
