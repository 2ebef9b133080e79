//! Emisión de sentencias y expresiones.
//!
//! C no especifica el orden de evaluación de operandos ni de
//! argumentos. Para conservar la evaluación de izquierda a derecha del
//! programa fuente, todo operando con alguna llamada se guarda en un
//! temporal si algún operando posterior también contiene llamadas. Las
//! llamadas son el único efecto observable de una expresión.

use std::{fmt::Write, mem};

use super::{
    declaration, function_name, global_name, local_name, string_literal, InternalError,
};

use crate::{
    ir::{Access, Callee, Expr, ExprKind, Statement, Type},
    parse::BinOp,
    platform::{self, Platform},
};

pub struct Emitter<'a> {
    platform: &'a Platform,
    pub(super) output: String,
    pub(super) depth: usize,
    temporaries: u32,
}

impl<'a> Emitter<'a> {
    /// Emisor para el cuerpo de una función, con un nivel de indentación.
    pub fn new(platform: &'a Platform) -> Self {
        Emitter {
            platform,
            output: String::new(),
            depth: 1,
            temporaries: 0,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    pub fn block(&mut self, body: &[Statement]) -> Result<(), InternalError> {
        for statement in body {
            self.statement(statement)?;
        }

        Ok(())
    }

    /// Bloque entre llaves, un nivel más adentro.
    fn nested(&mut self, body: &[Statement]) -> Result<(), InternalError> {
        emit!(self, "{{")?;

        self.depth += 1;
        self.block(body)?;
        self.depth -= 1;

        emit!(self, "}}")?;
        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), InternalError> {
        match statement {
            Statement::Assign { target, value } => {
                let value = self.bare(value)?;
                emit!(self, "{} = {};", access(target), value)?;
            }

            Statement::Return(None) => emit!(self, "return;")?,
            Statement::Return(Some(value)) => {
                let value = self.bare(value)?;
                emit!(self, "return {};", value)?;
            }

            Statement::If {
                condition,
                body,
                orelse,
            } => {
                let condition = self.bare(condition)?;
                emit!(self, "if ({})", condition)?;
                self.nested(body)?;

                if !orelse.is_empty() {
                    emit!(self, "else")?;
                    self.nested(orelse)?;
                }
            }

            Statement::While { condition, body } => {
                // Los temporales de la condición deben recalcularse en cada iteración
                self.depth += 1;
                let (setup, condition) = self.capture(|this| this.bare(condition))?;
                self.depth -= 1;

                if setup.is_empty() {
                    emit!(self, "while ({})", condition)?;
                    self.nested(body)?;
                } else {
                    emit!(self, "while (1)")?;
                    emit!(self, "{{")?;

                    self.output.push_str(&setup);
                    self.depth += 1;

                    emit!(self, "if (!({}))", condition)?;
                    emit!(self, "{{")?;
                    emit!(self, "\tbreak;")?;
                    emit!(self, "}}")?;

                    self.block(body)?;
                    self.depth -= 1;

                    emit!(self, "}}")?;
                }
            }

            Statement::Break => emit!(self, "break;")?,
            Statement::Continue => emit!(self, "continue;")?,

            Statement::Expr(expr) => {
                let expr = self.bare(expr)?;
                emit!(self, "{};", expr)?;
            }
        }

        Ok(())
    }

    /// Traduce una expresión. Las sentencias que esta requiera de
    /// antemano se emiten en la posición actual.
    pub fn expr(&mut self, expr: &Expr) -> Result<String, InternalError> {
        self.render(expr, true)
    }

    /// Expresión sin paréntesis externos, para posiciones que ya la
    /// delimitan. Algunos compiladores advierten sobre `if ((a == b))`.
    fn bare(&mut self, expr: &Expr) -> Result<String, InternalError> {
        self.render(expr, false)
    }

    fn render(&mut self, expr: &Expr, wrapped: bool) -> Result<String, InternalError> {
        let parenthesize = |text: String| {
            if wrapped {
                format!("({})", text)
            } else {
                text
            }
        };

        let text = match &expr.kind {
            // `-2147483648` en C es la negación de una constante que no cabe en `int`
            ExprKind::Integer(i32::MIN) => String::from("INT32_MIN"),
            ExprKind::Integer(integer) => integer.to_string(),
            ExprKind::Bool(true) => String::from("1"),
            ExprKind::Bool(false) => String::from("0"),
            ExprKind::Str(string) => string_literal(string),
            ExprKind::Read(target) => access(target),

            ExprKind::Call { target, arguments } => {
                let arguments = self.operands(arguments.iter())?;
                match target {
                    Callee::User(name) => {
                        format!("{}({})", function_name(name), arguments.join(", "))
                    }

                    Callee::Builtin(builtin) => {
                        let expansion = platform::expand_builtin(builtin, &arguments)?;
                        if builtin.returns == Type::Void {
                            expansion
                        } else {
                            format!("({})", expansion)
                        }
                    }
                }
            }

            ExprKind::Negate(operand) => parenthesize(format!("-{}", self.expr(operand)?)),
            ExprKind::Not(operand) => parenthesize(format!("!{}", self.expr(operand)?)),

            ExprKind::Binary(lhs, operator @ (BinOp::And | BinOp::Or), rhs) if rhs.has_call() => {
                return self.short_circuit(lhs, *operator, rhs);
            }

            ExprKind::Binary(lhs, operator, rhs) => {
                let mut operands = self.operands([&**lhs, &**rhs].into_iter())?;

                // `_Bool` contra entero: el `+` unario promueve a `int`. Un cast
                // no basta, `-Wbool-compare` lo atraviesa en `(a < b) == 2`
                if operator.is_comparison() && lhs.typ != rhs.typ {
                    for (text, operand) in operands.iter_mut().zip([&**lhs, &**rhs]) {
                        if operand.typ == Type::Bool {
                            text.insert(0, '+');
                        }
                    }
                }

                let (lhs, rhs) = (&operands[0], &operands[1]);

                match operator {
                    BinOp::FloorDiv => format!("pyc_floordiv({}, {})", lhs, rhs),
                    BinOp::Mod => format!("pyc_mod({}, {})", lhs, rhs),
                    operator => {
                        let operator = c_operator(*operator);
                        parenthesize(format!("{} {} {}", lhs, operator, rhs))
                    }
                }
            }
        };

        Ok(text)
    }

    /// Traduce operandos en orden, guardando en temporales los que
    /// contienen llamadas si otro operando posterior también las tiene.
    fn operands<'e, I>(&mut self, operands: I) -> Result<Vec<String>, InternalError>
    where
        I: Iterator<Item = &'e Expr> + Clone,
    {
        let mut texts = Vec::new();
        let mut rest = operands;

        while let Some(operand) = rest.next() {
            let text = self.expr(operand)?;
            let later_call = rest.clone().any(Expr::has_call);

            if operand.has_call() && later_call {
                texts.push(self.spill(&operand.typ, text)?);
            } else {
                texts.push(text);
            }
        }

        Ok(texts)
    }

    /// `a and f()` se reduce a un `if` para no evaluar `f()` de más.
    fn short_circuit(
        &mut self,
        lhs: &Expr,
        operator: BinOp,
        rhs: &Expr,
    ) -> Result<String, InternalError> {
        let lhs = self.expr(lhs)?;
        let result = self.spill(&Type::Bool, lhs)?;

        match operator {
            BinOp::And => emit!(self, "if ({})", result)?,
            _ => emit!(self, "if (!{})", result)?,
        }

        emit!(self, "{{")?;
        self.depth += 1;

        let rhs = self.bare(rhs)?;
        emit!(self, "{} = {};", result, rhs)?;

        self.depth -= 1;
        emit!(self, "}}")?;

        Ok(result)
    }

    fn spill(&mut self, typ: &Type, text: String) -> Result<String, InternalError> {
        let temporary = format!("tmp_{}", self.temporaries);
        self.temporaries += 1;

        emit!(self, "{} = {};", declaration(typ, &temporary)?, text)?;
        Ok(temporary)
    }

    /// Ejecuta `emit` sobre una salida vacía y retorna lo emitido junto
    /// con el resultado.
    fn capture<T, F>(&mut self, emit: F) -> Result<(String, T), InternalError>
    where
        F: FnOnce(&mut Self) -> Result<T, InternalError>,
    {
        let outer = mem::take(&mut self.output);
        let result = emit(self);
        let captured = mem::replace(&mut self.output, outer);

        Ok((captured, result?))
    }
}

fn access(target: &Access) -> String {
    match target {
        Access::Local(name) => local_name(name),
        Access::Global(name) => global_name(name),
    }
}

fn c_operator(operator: BinOp) -> &'static str {
    match operator {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::FloorDiv => "/",
        BinOp::Mod => "%",
        BinOp::Equal => "==",
        BinOp::NotEqual => "!=",
        BinOp::Less => "<",
        BinOp::LessOrEqual => "<=",
        BinOp::Greater => ">",
        BinOp::GreaterOrEqual => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}
