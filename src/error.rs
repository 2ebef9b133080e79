//! Reporte de diagnósticos.
//!
//! Todo error de usuario se origina en alguna fase del front end y
//! está asociado a una ubicación. Este módulo dispone esos errores en
//! un reporte legible que cita la línea original y subraya el rango
//! del problema.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Debug, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

pub struct Diagnostics {
    kind: &'static str,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, errors } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let location = error.location();
            writeln!(fmt, " --> {}", location)?;

            let (start, end) = (location.start(), location.end());
            let line_number = start.line();
            let digits = line_number.to_string().chars().count();

            writeln!(fmt, "{:digits$} |", "", digits = digits)?;
            let line_length = location.source().with_line(line_number, |line| {
                writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
                    .map(|()| line.chars().count() as u32)
            })?;

            // Los rangos que cruzan líneas se subrayan hasta el final de la primera
            let from = start.column();
            let to = if end.line() == line_number {
                end.column().max(from + 1)
            } else {
                (line_length + 1).max(from + 1)
            };

            let skip = (from - 1) as usize;
            let highlight = (to - from) as usize;

            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )?;

            writeln!(fmt)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(
            fmt,
            "Build failed with {} {}",
            errors.len(),
            error_or_errors
        )
    }
}

impl Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, fmt)
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, source};

    #[test]
    fn report_quotes_line_and_underlines_token() {
        let (start, stream) = source::consume("x = 1\ny = \"oops\n".as_bytes(), "bad.py");
        let error = Lexer::new(start, stream).tokenize().unwrap_err();

        let report = Diagnostics::from(error).kind("Lexical error").to_string();
        assert!(report.starts_with("Lexical error: Unterminated string literal\n"));
        assert!(report.contains(" --> bad.py:2:5"));
        assert!(report.contains("2 | y = \"oops"));
        assert!(report.contains("  |     ^"));
        assert!(report.ends_with("Build failed with 1 error\n"));
    }

    #[test]
    fn empty_report() {
        let report = Diagnostics::default().to_string();
        assert_eq!(report, "No errors were reported\n");
    }
}
