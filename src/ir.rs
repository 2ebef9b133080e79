//! Representación intermedia tipada.
//!
//! El resolvedor semántico produce un [`Program`] en el que cada nombre
//! ya está clasificado (local, global, función de usuario o builtin de
//! plataforma) y cada expresión lleva su tipo. La generación de código
//! opera exclusivamente sobre esta representación.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use bitflags::bitflags;

use crate::{lex::Identifier, parse::BinOp, platform::Builtin};

/// Universo cerrado de tipos del lenguaje.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    Str,
    Void,
    Function(Box<Signature>),
}

impl Type {
    /// Enteros y booleanos admiten aritmética y comparaciones.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Bool)
    }

    /// Determina si un valor de tipo `found` puede ocupar una posición
    /// que espera `self`. Un `bool` se acepta donde se espera un `int`,
    /// nunca al revés.
    pub fn accepts(&self, found: &Type) -> bool {
        self == found || (*self == Type::Int && *found == Type::Bool)
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => fmt.write_str("int"),
            Type::Bool => fmt.write_str("bool"),
            Type::Str => fmt.write_str("str"),
            Type::Void => fmt.write_str("None"),
            Type::Function(signature) => {
                fmt.write_str("(")?;
                for (i, parameter) in signature.parameters.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(", ")?;
                    }

                    write!(fmt, "{}", parameter)?;
                }

                write!(fmt, ") -> {}", signature.returns)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Vec<Type>,
    pub returns: Type,
}

bitflags! {
    /// Funciones auxiliares de runtime que el programa requiere.
    pub struct Helpers: u32 {
        const FLOOR_DIV = 1 << 0;
        const MODULO    = 1 << 1;
    }
}

#[derive(Debug)]
pub struct Program {
    /// Variables de módulo en orden de primera asignación.
    pub globals: Vec<Variable>,

    /// Funciones de usuario en orden de definición.
    pub functions: Vec<Function>,

    /// Sentencias de nivel superior.
    pub body: Vec<Statement>,

    /// Valor de completitud; `None` equivale a cero.
    pub completion: Option<Expr>,

    pub helpers: Helpers,
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: Identifier,
    pub typ: Type,

    /// Si el programa lee la variable en algún punto.
    pub read: bool,
}

#[derive(Debug)]
pub struct Function {
    pub name: Identifier,
    pub parameters: Vec<Variable>,
    pub returns: Type,

    /// Locales que no son parámetros, en orden de aparición.
    pub locals: Vec<Variable>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub enum Statement {
    Assign {
        target: Access,
        value: Expr,
    },

    Return(Option<Expr>),

    If {
        condition: Expr,
        body: Vec<Statement>,
        orelse: Vec<Statement>,
    },

    While {
        condition: Expr,
        body: Vec<Statement>,
    },

    Break,
    Continue,

    /// Llamada evaluada por sus efectos.
    Expr(Expr),
}

#[derive(Debug)]
pub struct Expr {
    pub typ: Type,
    pub kind: ExprKind,
    calls: bool,
}

#[derive(Debug)]
pub enum ExprKind {
    Integer(i32),
    Bool(bool),
    Str(Rc<str>),
    Read(Access),

    Call {
        target: Callee,
        arguments: Vec<Expr>,
    },

    Negate(Box<Expr>),
    Not(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

impl Expr {
    /// Construye un nodo. Solo se inspeccionan los hijos inmediatos, que
    /// ya conocen si contienen llamadas.
    pub fn new(typ: Type, kind: ExprKind) -> Self {
        let calls = match &kind {
            ExprKind::Integer(_) | ExprKind::Bool(_) | ExprKind::Str(_) | ExprKind::Read(_) => {
                false
            }

            ExprKind::Call { .. } => true,
            ExprKind::Negate(operand) | ExprKind::Not(operand) => operand.calls,
            ExprKind::Binary(lhs, _, rhs) => lhs.calls || rhs.calls,
        };

        Expr { typ, kind, calls }
    }

    /// Determina si evaluar esta expresión implica alguna llamada.
    pub fn has_call(&self) -> bool {
        self.calls
    }

    /// Determina si la expresión es una constante distinta de cero.
    pub fn is_constant_true(&self) -> bool {
        match self.kind {
            ExprKind::Bool(value) => value,
            ExprKind::Integer(value) => value != 0,
            _ => false,
        }
    }
}

/// Destino de una lectura o escritura.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Local(Identifier),
    Global(Identifier),
}

#[derive(Clone, Debug)]
pub enum Callee {
    User(Identifier),
    Builtin(&'static Builtin),
}

/// Determina si la ejecución de un bloque termina siempre en `return`.
///
/// Un `while` con condición constante verdadera y sin `break` propio
/// nunca cae al final del bloque.
pub fn always_returns(body: &[Statement]) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Return(_) => true,
        Statement::If { body, orelse, .. } => always_returns(body) && always_returns(orelse),
        Statement::While { condition, body } => condition.is_constant_true() && !breaks(body),
        _ => false,
    })
}

/// Busca un `break` que afecte al ciclo que encierra a `body`.
fn breaks(body: &[Statement]) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Break => true,
        Statement::If { body, orelse, .. } => breaks(body) || breaks(orelse),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i32) -> Expr {
        Expr::new(Type::Int, ExprKind::Integer(value))
    }

    #[test]
    fn bool_is_accepted_as_int() {
        assert!(Type::Int.accepts(&Type::Bool));
        assert!(!Type::Bool.accepts(&Type::Int));
        assert!(!Type::Str.accepts(&Type::Int));
        assert!(Type::Str.accepts(&Type::Str));
    }

    #[test]
    fn signature_display() {
        let typ = Type::Function(Box::new(Signature {
            parameters: vec![Type::Int, Type::Str],
            returns: Type::Void,
        }));

        assert_eq!(typ.to_string(), "(int, str) -> None");
    }

    #[test]
    fn return_analysis() {
        let returns = || Statement::Return(Some(int(1)));

        assert!(always_returns(&[returns()]));
        assert!(!always_returns(&[]));

        let partial = Statement::If {
            condition: int(1),
            body: vec![returns()],
            orelse: vec![],
        };
        assert!(!always_returns(&[partial]));

        let forever = Statement::While {
            condition: int(1),
            body: vec![Statement::Continue],
        };
        assert!(always_returns(&[forever]));

        let escapes = Statement::While {
            condition: int(1),
            body: vec![Statement::If {
                condition: int(0),
                body: vec![Statement::Break],
                orelse: vec![],
            }],
        };
        assert!(!always_returns(&[escapes]));
    }

    #[test]
    fn call_detection() {
        let negated = Expr::new(Type::Int, ExprKind::Negate(Box::new(int(3))));

        assert!(!negated.has_call());

        let call = ExprKind::Call {
            target: Callee::User(Identifier::from("f")),
            arguments: vec![],
        };

        let call = Box::new(Expr::new(Type::Int, call));
        let sum = Expr::new(Type::Int, ExprKind::Binary(Box::new(int(1)), BinOp::Add, call));
        assert!(sum.has_call());

        let outer = Expr::new(Type::Bool, ExprKind::Not(Box::new(sum)));
        assert!(outer.has_call());
    }
}
