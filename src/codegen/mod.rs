//! Generación de código C.
//!
//! El programa tipado se traduce a una única unidad de traducción C99.
//! La disposición es fija: comentario de cabecera, `#include` de la
//! plataforma, funciones auxiliares de runtime que el programa utilice,
//! variables de módulo, prototipos, definiciones de funciones y por
//! último el punto de entrada de la plataforma.
//!
//! Ningún nombre del programa fuente llega sin prefijo al código
//! generado, por lo que nunca puede colisionar con identificadores de C,
//! de la plataforma o del propio generador.

use std::fmt::{self, Write};

use thiserror::Error;

use crate::{
    ir::{Function, Helpers, Program, Type},
    lex::Identifier,
    platform::{self, Platform, UnboundPlaceholder},
};

mod body;

use body::Emitter;

/// Una invariante de generación se ha violado. Nunca es atribuible
/// al programa fuente.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("Formatting failed")]
    Fmt(#[from] fmt::Error),

    #[error(transparent)]
    Template(#[from] UnboundPlaceholder),

    #[error("Type `{0}` has no C representation")]
    Unrepresentable(Type),
}

const FLOOR_DIV_HELPER: &str = "\
static int32_t pyc_floordiv(int32_t a, int32_t b)
{
\tint32_t q = a / b;
\tif ((a % b != 0) && ((a < 0) != (b < 0)))
\t{
\t\t--q;
\t}
\treturn q;
}
";

const MODULO_HELPER: &str = "\
static int32_t pyc_mod(int32_t a, int32_t b)
{
\tint32_t r = a % b;
\tif ((r != 0) && ((r < 0) != (b < 0)))
\t{
\t\tr += b;
\t}
\treturn r;
}
";

/// Genera la unidad de traducción completa.
pub fn emit(program: &Program, platform: &Platform) -> Result<String, InternalError> {
    let mut unit = String::new();

    writeln!(
        unit,
        "/* Generated by pyc {} for platform `{}`, do not edit */",
        env!("CARGO_PKG_VERSION"),
        platform.id
    )?;

    writeln!(unit)?;
    for include in platform.includes {
        writeln!(unit, "#include <{}>", include)?;
    }

    writeln!(unit)?;
    if program.helpers.contains(Helpers::FLOOR_DIV) {
        writeln!(unit, "{}", FLOOR_DIV_HELPER)?;
    }

    if program.helpers.contains(Helpers::MODULO) {
        writeln!(unit, "{}", MODULO_HELPER)?;
    }

    for global in &program.globals {
        let name = global_name(&global.name);
        writeln!(unit, "static {} = {};", declaration(&global.typ, &name)?, zero(&global.typ))?;
    }

    if !program.globals.is_empty() {
        writeln!(unit)?;
    }

    for function in &program.functions {
        writeln!(unit, "{};", signature(function)?)?;
    }

    if !program.functions.is_empty() {
        writeln!(unit)?;
    }

    for function in &program.functions {
        writeln!(unit, "{}", definition(function, platform)?)?;
    }

    unit.push_str(&entry(program, platform)?);
    Ok(unit)
}

fn definition(function: &Function, platform: &Platform) -> Result<String, InternalError> {
    let mut emitter = Emitter::new(platform);

    for local in &function.locals {
        let name = local_name(&local.name);
        emit!(emitter, "{} = {};", declaration(&local.typ, &name)?, zero(&local.typ))?;
    }

    let variables = function.parameters.iter().chain(&function.locals);
    for unread in variables.filter(|variable| !variable.read) {
        emit!(emitter, "(void) {};", local_name(&unread.name))?;
    }

    emitter.block(&function.body)?;
    Ok(format!("{}\n{{\n{}}}\n", signature(function)?, emitter.finish()))
}

fn entry(program: &Program, platform: &Platform) -> Result<String, InternalError> {
    let mut emitter = Emitter::new(platform);

    for unread in program.globals.iter().filter(|global| !global.read) {
        emit!(emitter, "(void) {};", global_name(&unread.name))?;
    }

    emitter.block(&program.body)?;

    // Puede requerir temporales, que quedan al final de las sentencias
    let completion = match &program.completion {
        Some(completion) => emitter.expr(completion)?,
        None => String::from("0"),
    };

    let statements = emitter.finish();
    let entry = platform::expand(platform.entry, |placeholder| match placeholder {
        "statements" => Some(statements.as_str()),
        "completion" => Some(completion.as_str()),
        _ => None,
    })?;

    Ok(entry)
}

fn signature(function: &Function) -> Result<String, InternalError> {
    let parameters = if function.parameters.is_empty() {
        String::from("void")
    } else {
        let mut declarations = Vec::with_capacity(function.parameters.len());
        for parameter in &function.parameters {
            declarations.push(declaration(&parameter.typ, &local_name(&parameter.name))?);
        }

        declarations.join(", ")
    };

    let name = format!("{}({})", function_name(&function.name), parameters);
    declaration(&function.returns, &name)
}

/// Declarador de C para un nombre de cierto tipo.
fn declaration(typ: &Type, name: &str) -> Result<String, InternalError> {
    let declaration = match typ {
        Type::Int => format!("int32_t {}", name),
        Type::Bool => format!("_Bool {}", name),
        Type::Str => format!("const char *{}", name),
        Type::Void => format!("void {}", name),
        Type::Function(_) => return Err(InternalError::Unrepresentable(typ.clone())),
    };

    Ok(declaration)
}

fn zero(typ: &Type) -> &'static str {
    match typ {
        Type::Str => "\"\"",
        _ => "0",
    }
}

fn function_name(name: &Identifier) -> String {
    format!("user_{}", name)
}

fn global_name(name: &Identifier) -> String {
    format!("global_{}", name)
}

fn local_name(name: &Identifier) -> String {
    format!("local_{}", name)
}

/// Literal de cadena de C.
///
/// Los bytes no imprimibles se escriben como escapes octales de tres
/// dígitos, los cuales nunca absorben caracteres siguientes. `?` se
/// escapa para evitar trigrafos.
fn string_literal(text: &str) -> String {
    let mut literal = String::with_capacity(text.len() + 2);
    literal.push('"');

    for byte in text.bytes() {
        match byte {
            b'\n' => literal.push_str("\\n"),
            b'"' => literal.push_str("\\\""),
            b'\\' => literal.push_str("\\\\"),
            b'?' => literal.push_str("\\?"),
            b' '..=b'~' => literal.push(byte as char),
            _ => literal.push_str(&format!("\\{:03o}", byte)),
        }
    }

    literal.push('"');
    literal
}
