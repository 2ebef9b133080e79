//! Compilador de un subconjunto restringido de Python hacia C.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST por medio de análisis sintáctico en [`parse`].
//! El árbol sintáctico es procesado por análisis semántico en
//! [`semantic`], de lo cual se genera una representación intermedia
//! tipada descrita en [`ir`], con lo cual concluyen las fases
//! delanteras del compilador. Cualquier error de estas fases se
//! reporta por medio de [`error::Diagnostics`].
//!
//! # Back end
//! En esta sección el compilador deja de ser agnóstico a la plataforma
//! objetivo. Los descriptores de [`platform`] definen cabeceras, punto
//! de entrada y builtins disponibles, y [`codegen`] emite a partir de
//! ellos una única unidad de traducción C. La compilación de ese código
//! a un ejecutable o imagen de ROM se delega a la toolchain de la
//! plataforma en [`toolchain`].

#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod platform;
pub mod semantic;
pub mod source;
pub mod toolchain;

use std::io::BufRead;

use thiserror::Error;

use crate::{
    codegen::InternalError,
    error::Diagnostics,
    lex::{Lexer, LexerError, Token},
    parse::ParserError,
    platform::Platform,
    semantic::SemanticError,
    source::Located,
};

/// Error de alguna fase de compilación.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] Located<LexerError>),

    #[error(transparent)]
    Parse(#[from] Located<ParserError>),

    #[error(transparent)]
    Resolve(#[from] Located<SemanticError>),

    #[error("Internal compiler error")]
    Internal(#[from] InternalError),
}

impl CompileError {
    /// Dispone el error como diagnóstico para el usuario. Los errores
    /// internos no son atribuibles al programa fuente.
    pub fn diagnostics(self) -> Result<Diagnostics, InternalError> {
        let diagnostics = match self {
            CompileError::Lex(error) => Diagnostics::from(error).kind("Lexical error"),
            CompileError::Parse(error) => Diagnostics::from(error).kind("Syntax error"),
            CompileError::Resolve(error) => Diagnostics::from(error).kind("Semantic error"),
            CompileError::Internal(error) => return Err(error),
        };

        Ok(diagnostics)
    }
}

/// Resultado intermedio de una fase, para inspección.
pub enum Trace<'a> {
    Tokens(&'a [Located<Token>]),
    Ast(&'a parse::Module),
}

/// Compila un archivo fuente completo hacia C.
pub fn compile<R: BufRead>(
    reader: R,
    name: &str,
    platform: &'static Platform,
) -> Result<String, CompileError> {
    compile_traced(reader, name, platform, |_| ())
}

/// Compila código fuente ya en memoria.
pub fn compile_str(
    text: &str,
    name: &str,
    platform: &'static Platform,
) -> Result<String, CompileError> {
    compile(text.as_bytes(), name, platform)
}

/// Igual que [`compile()`], pero expone el resultado de las fases
/// delanteras a `trace` conforme se producen.
pub fn compile_traced<R, F>(
    reader: R,
    name: &str,
    platform: &'static Platform,
    mut trace: F,
) -> Result<String, CompileError>
where
    R: BufRead,
    F: FnMut(Trace<'_>),
{
    let (start, stream) = source::consume(reader, name);

    let tokens = Lexer::new(start.clone(), stream).tokenize()?;
    trace(Trace::Tokens(&tokens));

    let ast = parse::parse(tokens.iter(), start)?;
    trace(Trace::Ast(&ast));

    let program = ast.resolve(platform)?;
    Ok(codegen::emit(&program, platform)?)
}
