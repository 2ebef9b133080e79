//! Análisis sintáctico.
//!
//! El parser consume la secuencia de tokens producida por
//! [`crate::lex`] y construye un [`Module`]. Es un parser de descenso
//! recursivo sin retroceso: una sola pasada con un token de lookahead.
//! Las expresiones se analizan por escalada de precedencia.
//!
//! Se acepta únicamente una gramática explícita. Todo constructo del
//! lenguaje huésped fuera de ella se rechaza con
//! [`ParserError::Unsupported`], lo cual produce diagnósticos más
//! precisos que un simple token inesperado.

use std::{
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
};
use thiserror::Error;

use crate::{
    lex::{Identifier, Keyword, Token, MAX_LITERAL},
    source::{Located, Location},
};

/// Raíz del árbol: sentencias de nivel superior en orden.
#[derive(Debug)]
pub struct Module {
    pub body: Vec<Located<Statement>>,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Located<Identifier>,
    pub parameters: Vec<Parameter>,
    pub returns: Option<Located<TypeName>>,
    pub body: Vec<Located<Statement>>,
}

#[derive(Debug)]
pub struct Parameter {
    pub name: Located<Identifier>,
    pub annotation: Option<Located<TypeName>>,
}

/// Nombres de tipo que pueden aparecer en anotaciones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeName {
    Int,
    Bool,
    Str,
    None,
}

#[derive(Debug)]
pub enum Statement {
    Def(FunctionDef),

    /// Asignación simple, anotada o aumentada. Las asignaciones
    /// aumentadas llegan aquí ya expandidas a `x = x op e`.
    Assign {
        target: Located<Identifier>,
        annotation: Option<Located<TypeName>>,
        value: Located<Expr>,
    },

    Return(Option<Located<Expr>>),

    /// `elif` se representa como un `If` anidado en `orelse`.
    If {
        condition: Located<Expr>,
        body: Vec<Located<Statement>>,
        orelse: Vec<Located<Statement>>,
    },

    While {
        condition: Located<Expr>,
        body: Vec<Located<Statement>>,
    },

    /// Sentencia de expresión, siempre una llamada.
    Expr(Located<Expr>),

    Pass,
    Break,
    Continue,
}

#[derive(Debug)]
pub enum Expr {
    Integer(i32),
    True,
    False,
    Str(Rc<str>),
    Name(Identifier),

    Call {
        callee: Located<Identifier>,
        arguments: Vec<Located<Expr>>,
    },

    Unary(UnaryOp, Box<Located<Expr>>),
    Binary(Box<Located<Expr>>, BinOp, Box<Located<Expr>>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl BinOp {
    /// Determina si el operador es una comparación.
    pub fn is_comparison(self) -> bool {
        use BinOp::*;
        matches!(
            self,
            Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual
        )
    }

    /// Determina si el operador es una conjunción o disyunción lógica.
    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOp::*;

        let symbol = match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            FloorDiv => "//",
            Mod => "%",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            And => "and",
            Or => "or",
        };

        fmt.write_str(symbol)
    }
}

impl Display for UnaryOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Negate => fmt.write_str("-"),
            UnaryOp::Not => fmt.write_str("not"),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected an expression, found {0}")]
    ExpectedExpr(Token),

    #[error("Expected identifier, found {0}")]
    ExpectedId(Token),

    #[error("Expected a statement, found {0}")]
    ExpectedStatement(Token),

    #[error("Expected any of `int`, `bool`, `str`, `None`, found {0}")]
    ExpectedType(Token),

    #[error("Expected an indented block, found {0}")]
    ExpectedBlock(Token),

    #[error("Unsupported construct: {0}")]
    Unsupported(&'static str),

    #[error("Unknown type `{0}`, expected any of `int`, `bool`, `str`, `None`")]
    UnknownType(Identifier),

    #[error("Expression is nested too deeply (limit is {0} levels)")]
    TooDeep(usize),

    #[error("Expression has too many operators (limit is {0})")]
    TooLarge(usize),

    #[error("Integer literal {0} is only valid when negated")]
    IntOverflow(u32),
}

/// Construye un [`Module`] a partir de una secuencia de tokens.
///
/// `start` es la ubicación de inicio del archivo, que se utiliza
/// para errores que ocurren antes del primer token.
pub fn parse<'a, I>(tokens: I, start: Location) -> Result<Module, Located<ParserError>>
where
    I: Iterator<Item = &'a Located<Token>>,
{
    let mut parser = Parser {
        tokens: tokens.peekable(),
        last_known: start,
        nesting: 0,
        operators: 0,
    };

    parser.module()
}

struct Parser<I: Iterator> {
    tokens: Peekable<I>,
    last_known: Location,
    nesting: usize,
    operators: usize,
}

type Parse<T> = Result<T, Located<ParserError>>;

const OR: u32 = 1;
const AND: u32 = 2;
const NOT: u32 = 3;
const COMPARISON: u32 = 4;
const NEGATE: u32 = 7;

/// Anidamiento máximo de paréntesis, llamadas y operadores unarios.
pub const MAX_DEPTH: usize = 200;

/// Operadores por sentencia simple o condición. Junto con [`MAX_DEPTH`] acota
/// la profundidad de los árboles que las fases posteriores recorren
/// recursivamente.
pub const MAX_OPERATORS: usize = 500;

impl<'a, I: Iterator<Item = &'a Located<Token>>> Parser<I> {
    fn module(&mut self) -> Parse<Module> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Token::Eof => break Ok(Module { body }),
                Token::Newline => {
                    self.next();
                }

                _ => body.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> Parse<Located<Statement>> {
        match self.peek() {
            Token::Keyword(Keyword::Def) => self.def(),
            Token::Keyword(Keyword::If) => self.if_statement(),
            Token::Keyword(Keyword::While) => self.while_statement(),
            Token::At => self.unsupported_next("decorators"),

            _ => {
                let statement = self.simple_statement()?;
                self.expect(Token::Newline)?;

                Ok(statement)
            }
        }
    }

    fn def(&mut self) -> Parse<Located<Statement>> {
        self.keyword(Keyword::Def)?;
        let start = self.last_known.clone();

        let name = self.id()?;
        self.expect(Token::OpenParen)?;
        let parameters = self.comma_separated(Token::CloseParen, Parser::parameter)?;

        let returns = match self.peek() {
            Token::Arrow => {
                self.next();
                Some(self.typ()?)
            }

            _ => None,
        };

        self.expect(Token::Colon)?;
        let location = Location::span(start, &self.last_known);
        let body = self.block()?;

        let def = FunctionDef {
            name,
            parameters,
            returns,
            body,
        };

        Ok(Located::at(Statement::Def(def), location))
    }

    fn parameter(&mut self) -> Parse<Parameter> {
        match self.peek() {
            Token::Times | Token::Power => return self.unsupported_next("variadic parameters"),
            _ => (),
        }

        let name = self.id()?;
        let annotation = match self.peek() {
            Token::Colon => {
                self.next();
                Some(self.typ()?)
            }

            _ => None,
        };

        match self.peek() {
            Token::Assign => self.unsupported_next("default parameter values"),
            _ => Ok(Parameter { name, annotation }),
        }
    }

    fn if_statement(&mut self) -> Parse<Located<Statement>> {
        // Consume tanto `if` como `elif`
        self.next();
        self.operators = 0;
        let start = self.last_known.clone();

        let condition = self.expr()?;
        self.expect(Token::Colon)?;
        let location = Location::span(start, &self.last_known);

        let body = self.block()?;
        let orelse = match self.peek() {
            Token::Keyword(Keyword::Elif) => vec![self.if_statement()?],
            Token::Keyword(Keyword::Else) => {
                self.next();
                self.expect(Token::Colon)?;
                self.block()?
            }

            _ => Vec::new(),
        };

        let statement = Statement::If {
            condition,
            body,
            orelse,
        };

        Ok(Located::at(statement, location))
    }

    fn while_statement(&mut self) -> Parse<Located<Statement>> {
        self.keyword(Keyword::While)?;
        self.operators = 0;
        let start = self.last_known.clone();

        let condition = self.expr()?;
        self.expect(Token::Colon)?;
        let location = Location::span(start, &self.last_known);

        let body = self.block()?;
        if let Token::Keyword(Keyword::Else) = self.peek() {
            return self.unsupported_next("`else` clauses on loops");
        }

        Ok(Located::at(Statement::While { condition, body }, location))
    }

    /// Bloque indentado, o una única sentencia simple en la misma línea.
    fn block(&mut self) -> Parse<Vec<Located<Statement>>> {
        if self.peek() != Token::Newline {
            let statement = self.simple_statement()?;
            self.expect(Token::Newline)?;

            return Ok(vec![statement]);
        }

        self.next();
        let (location, token) = self.next().split();
        if token != Token::Indent {
            return Err(Located::at(ParserError::ExpectedBlock(token), location));
        }

        let mut body = Vec::new();
        while !matches!(self.peek(), Token::Dedent | Token::Eof) {
            body.push(self.statement()?);
        }

        self.expect(Token::Dedent)?;
        Ok(body)
    }

    fn simple_statement(&mut self) -> Parse<Located<Statement>> {
        self.operators = 0;
        let (start, token) = self.next().split();

        let statement = match token {
            Token::Keyword(Keyword::Pass) => Statement::Pass,
            Token::Keyword(Keyword::Break) => Statement::Break,
            Token::Keyword(Keyword::Continue) => Statement::Continue,

            Token::Keyword(Keyword::Return) => match self.peek() {
                Token::Newline => Statement::Return(None),
                _ => Statement::Return(Some(self.expr()?)),
            },

            Token::Id(name) => {
                let name = Located::at(name, start.clone());
                match self.peek() {
                    Token::Assign
                    | Token::Colon
                    | Token::PlusAssign
                    | Token::MinusAssign
                    | Token::TimesAssign
                    | Token::FloorDivAssign
                    | Token::ModuloAssign => self.assignment(name)?,

                    Token::Comma => return self.unsupported_next("multiple assignment targets"),

                    _ => {
                        let expr = self.name_or_call(name)?;
                        let expr = self.postfix(expr)?;

                        let next = self.peek();
                        match expr.val() {
                            Expr::Call { .. } if next == Token::Newline => Statement::Expr(expr),

                            _ if next == Token::Newline || binary_operator(&next).is_some() => {
                                let error = ParserError::Unsupported(
                                    "expression statements other than calls",
                                );

                                return Err(Located::at(error, start));
                            }

                            _ => {
                                let (location, found) = self.next().split();
                                let error = ParserError::UnexpectedToken(Token::Newline, found);
                                return Err(Located::at(error, location));
                            }
                        }
                    }
                }
            }

            Token::Keyword(keyword) if unsupported_keyword(keyword).is_some() => {
                let what = unsupported_keyword(keyword).unwrap_or("this keyword");
                return Err(Located::at(ParserError::Unsupported(what), start));
            }

            Token::IntLiteral(_)
            | Token::StrLiteral(_)
            | Token::OpenParen
            | Token::Minus
            | Token::Keyword(Keyword::True | Keyword::False | Keyword::Not) => {
                let error = ParserError::Unsupported("expression statements other than calls");
                return Err(Located::at(error, start));
            }

            found => return Err(Located::at(ParserError::ExpectedStatement(found), start)),
        };

        let location = Location::span(start, &self.last_known);
        Ok(Located::at(statement, location))
    }

    fn assignment(&mut self, target: Located<Identifier>) -> Parse<Statement> {
        let annotation = match self.peek() {
            Token::Colon => {
                self.next();
                let annotation = self.typ()?;
                self.expect(Token::Assign)?;

                Some(annotation)
            }

            _ => None,
        };

        let operator = match annotation {
            Some(_) => None,
            None => {
                let (location, token) = self.next().split();
                match token {
                    Token::Assign => None,
                    Token::PlusAssign => Some(BinOp::Add),
                    Token::MinusAssign => Some(BinOp::Sub),
                    Token::TimesAssign => Some(BinOp::Mul),
                    Token::FloorDivAssign => Some(BinOp::FloorDiv),
                    Token::ModuloAssign => Some(BinOp::Mod),

                    found => {
                        let error = ParserError::UnexpectedToken(Token::Assign, found);
                        return Err(Located::at(error, location));
                    }
                }
            }
        };

        let mut value = self.expr()?;
        if let Token::Assign = self.peek() {
            return self.unsupported_next("chained assignment");
        }

        // `x op= e` es equivalente a `x = x op e`
        if let Some(operator) = operator {
            let read = Located::at(Expr::Name(target.val().clone()), target.location().clone());
            let location = Location::span(target.location().clone(), value.location());

            value = Located::at(
                Expr::Binary(Box::new(read), operator, Box::new(value)),
                location,
            );
        }

        Ok(Statement::Assign {
            target,
            annotation,
            value,
        })
    }

    fn typ(&mut self) -> Parse<Located<TypeName>> {
        let (location, token) = self.next().split();
        let typ = match token {
            Token::Keyword(Keyword::None) => TypeName::None,
            Token::Id(id) => match id.as_ref() {
                "int" => TypeName::Int,
                "bool" => TypeName::Bool,
                "str" => TypeName::Str,
                _ => return Err(Located::at(ParserError::UnknownType(id), location)),
            },

            found => return Err(Located::at(ParserError::ExpectedType(found), location)),
        };

        Ok(Located::at(typ, location))
    }

    fn expr(&mut self) -> Parse<Located<Expr>> {
        self.nested(|parser| parser.binary(OR))
    }

    /// Cuenta un operador recién consumido. `1 + 1 + ...` crece hacia la
    /// izquierda sin recursión en el parser, por lo que el anidamiento no
    /// basta para acotarlo.
    fn operator(&mut self) -> Parse<()> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            let error = ParserError::TooLarge(MAX_OPERATORS);
            return Err(Located::at(error, self.last_known.clone()));
        }

        Ok(())
    }

    /// Aplica `rule` un nivel de anidamiento más adentro.
    fn nested<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        if self.nesting >= MAX_DEPTH {
            self.next();
            let error = ParserError::TooDeep(MAX_DEPTH);
            return Err(Located::at(error, self.last_known.clone()));
        }

        self.nesting += 1;
        let result = rule(self);
        self.nesting -= 1;

        result
    }

    /// Escalada de precedencia para operadores binarios.
    fn binary(&mut self, min_precedence: u32) -> Parse<Located<Expr>> {
        let mut lhs = self.unary(min_precedence)?;

        loop {
            let token = self.peek();
            let (operator, precedence) = match binary_operator(&token) {
                Some(operator) => operator,
                None => {
                    let what = match token {
                        Token::Slash => "true division, use `//`",
                        Token::Power => "exponentiation",
                        Token::At => "matrix multiplication",
                        Token::Keyword(Keyword::Is | Keyword::In | Keyword::Not) => {
                            "identity and membership tests"
                        }

                        _ => break Ok(lhs),
                    };

                    break self.unsupported_next(what);
                }
            };

            if precedence < min_precedence {
                break Ok(lhs);
            }

            self.next();
            self.operator()?;
            let rhs = self.binary(precedence + 1)?;

            if precedence == COMPARISON {
                let chained = binary_operator(&self.peek())
                    .map_or(false, |(_, precedence)| precedence == COMPARISON);

                if chained {
                    break self.unsupported_next("chained comparisons");
                }
            }

            let location = Location::span(lhs.location().clone(), rhs.location());
            lhs = Located::at(Expr::Binary(Box::new(lhs), operator, Box::new(rhs)), location);
        }
    }

    fn unary(&mut self, min_precedence: u32) -> Parse<Located<Expr>> {
        let operator = match self.peek() {
            Token::Keyword(Keyword::Not) if min_precedence <= NOT => (UnaryOp::Not, NOT),
            Token::Minus => (UnaryOp::Negate, NEGATE),
            _ => {
                let atom = self.atom()?;
                return self.postfix(atom);
            }
        };

        let (operator, precedence) = operator;
        self.next();
        self.operator()?;

        let start = self.last_known.clone();

        // `i32::MIN` no tiene literal positivo propio
        if operator == UnaryOp::Negate && self.peek() == Token::IntLiteral(MAX_LITERAL) {
            self.next();
            let location = Location::span(start, &self.last_known);
            let atom = Located::at(Expr::Integer(i32::MIN), location);

            return self.postfix(atom);
        }

        let operand = self.nested(|parser| parser.binary(precedence))?;
        let location = Location::span(start, operand.location());

        Ok(Located::at(Expr::Unary(operator, Box::new(operand)), location))
    }

    fn atom(&mut self) -> Parse<Located<Expr>> {
        let (location, token) = self.next().split();

        let expr = match token {
            Token::IntLiteral(integer) => match i32::try_from(integer) {
                Ok(integer) => Expr::Integer(integer),
                Err(_) => return Err(Located::at(ParserError::IntOverflow(integer), location)),
            },
            Token::StrLiteral(string) => Expr::Str(string),
            Token::Keyword(Keyword::True) => Expr::True,
            Token::Keyword(Keyword::False) => Expr::False,
            Token::Id(name) => return self.name_or_call(Located::at(name, location)),

            Token::OpenParen => {
                if self.peek() == Token::CloseParen {
                    return self.unsupported_next("tuples");
                }

                let inner = self.expr()?.into_inner();
                if self.peek() == Token::Comma {
                    return self.unsupported_next("tuples");
                }

                self.expect(Token::CloseParen)?;
                let location = Location::span(location, &self.last_known);

                return Ok(Located::at(inner, location));
            }

            Token::OpenSquare => {
                return Err(Located::at(ParserError::Unsupported("list literals"), location))
            }

            Token::OpenCurly => {
                let error = ParserError::Unsupported("dict and set literals");
                return Err(Located::at(error, location));
            }

            Token::Keyword(keyword) if unsupported_keyword(keyword).is_some() => {
                let what = unsupported_keyword(keyword).unwrap_or("this keyword");
                return Err(Located::at(ParserError::Unsupported(what), location));
            }

            found => return Err(Located::at(ParserError::ExpectedExpr(found), location)),
        };

        Ok(Located::at(expr, location))
    }

    fn name_or_call(&mut self, name: Located<Identifier>) -> Parse<Located<Expr>> {
        if self.peek() != Token::OpenParen {
            let (location, name) = name.split();
            return Ok(Located::at(Expr::Name(name), location));
        }

        self.next();
        let arguments = self.comma_separated(Token::CloseParen, Parser::argument)?;
        let location = Location::span(name.location().clone(), &self.last_known);

        let call = Expr::Call {
            callee: name,
            arguments,
        };

        Ok(Located::at(call, location))
    }

    fn argument(&mut self) -> Parse<Located<Expr>> {
        let argument = self.expr()?;
        match self.peek() {
            Token::Assign => self.unsupported_next("keyword arguments"),
            _ => Ok(argument),
        }
    }

    /// Rechaza operaciones postfijas sobre una expresión ya completa.
    fn postfix(&mut self, expr: Located<Expr>) -> Parse<Located<Expr>> {
        match self.peek() {
            Token::Period => self.unsupported_next("attribute access"),
            Token::OpenSquare => self.unsupported_next("subscripts"),
            Token::OpenParen => self.unsupported_next("calls on non-name expressions"),
            _ => Ok(expr),
        }
    }

    /// Secuencia de elementos separados por comas, con coma final
    /// opcional, que termina en `close` (el cual se consume).
    fn comma_separated<T, F>(&mut self, close: Token, mut rule: F) -> Parse<Vec<T>>
    where
        F: FnMut(&mut Self) -> Parse<T>,
    {
        let mut items = Vec::new();
        loop {
            if self.peek() == close {
                self.next();
                break Ok(items);
            }

            items.push(rule(self)?);

            let (location, token) = self.next().split();
            if token == close {
                break Ok(items);
            } else if token != Token::Comma {
                break Err(Located::at(
                    ParserError::UnexpectedToken(close, token),
                    location,
                ));
            }
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let (location, token) = self.next().split();
        match token {
            Token::Id(id) => Ok(Located::at(id, location)),
            found => Err(Located::at(ParserError::ExpectedId(found), location)),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        let (location, found) = self.next().split();
        if found == token {
            Ok(())
        } else {
            Err(Located::at(ParserError::UnexpectedToken(token, found), location))
        }
    }

    /// Falla con [`ParserError::Unsupported`] en la ubicación del siguiente token.
    fn unsupported_next<T>(&mut self, what: &'static str) -> Parse<T> {
        self.next();
        Err(Located::at(
            ParserError::Unsupported(what),
            self.last_known.clone(),
        ))
    }

    fn peek(&mut self) -> Token {
        self.tokens
            .peek()
            .map_or(Token::Eof, |token| token.val().clone())
    }

    fn next(&mut self) -> Located<Token> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                token.clone()
            }

            None => Located::at(Token::Eof, self.last_known.clone()),
        }
    }
}

/// Operador binario y su precedencia, si el token es uno.
fn binary_operator(token: &Token) -> Option<(BinOp, u32)> {
    let operator = match token {
        Token::Keyword(Keyword::Or) => (BinOp::Or, OR),
        Token::Keyword(Keyword::And) => (BinOp::And, AND),
        Token::Equal => (BinOp::Equal, COMPARISON),
        Token::NotEqual => (BinOp::NotEqual, COMPARISON),
        Token::Less => (BinOp::Less, COMPARISON),
        Token::LessOrEqual => (BinOp::LessOrEqual, COMPARISON),
        Token::Greater => (BinOp::Greater, COMPARISON),
        Token::GreaterOrEqual => (BinOp::GreaterOrEqual, COMPARISON),
        Token::Plus => (BinOp::Add, 5),
        Token::Minus => (BinOp::Sub, 5),
        Token::Times => (BinOp::Mul, 6),
        Token::FloorDiv => (BinOp::FloorDiv, 6),
        Token::Percent => (BinOp::Mod, 6),
        _ => return None,
    };

    Some(operator)
}

/// Palabras clave reconocidas que inician constructos fuera del lenguaje.
fn unsupported_keyword(keyword: Keyword) -> Option<&'static str> {
    use Keyword::*;

    let what = match keyword {
        Class => "class definitions",
        Import | From => "imports",
        For => "`for` loops",
        Try | Except | Finally => "exception handling",
        Raise => "`raise` statements",
        With => "`with` statements",
        Lambda => "lambda expressions",
        Yield => "generators",
        Global | Nonlocal => "`global` and `nonlocal` declarations",
        Del => "`del` statements",
        Assert => "assertions",
        Async | Await => "asynchronous code",
        None => "`None` values",
        Is | In => "identity and membership tests",
        _ => return Option::None,
    };

    Some(what)
}
