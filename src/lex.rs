//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido esta asociado a una ubicación en el código fuente original,
//! lo cual permite rastrear errores en tanto los mismos como constructos
//! más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de lo
//! que son y no incluyen lexemas. Los identificadores sí incluyen su lexema
//! original. Las constantes literales se resuelven a sus valores en vez de
//! preservar sus lexemas.
//!
//! # Indentación
//! Los bloques del lenguaje se delimitan por indentación. El lexer mantiene
//! una pila de anchos de indentación y sintetiza tokens [`Token::Indent`] y
//! [`Token::Dedent`] que el parser trata como llaves explícitas. El ancho de
//! una línea es la columna (base cero) de su primer carácter significativo,
//! donde un tabulador avanza hasta el siguiente múltiplo de
//! [`TAB_STOP`](crate::source::TAB_STOP). Las líneas vacías o de solo
//! comentario no producen tokens, y dentro de paréntesis se ignoran tanto
//! saltos de línea como indentación.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores son sensibles a mayúsculas.
//! - Se reconocen todas las palabras clave del lenguaje huésped, incluso las
//!   que no se soportan, para que el parser pueda rechazarlas con precisión.
//! - Las constantes enteras son decimales y no negativas.
//! - Las cadenas solo admiten los escapes `\n`, `\\`, `\"` y `\'`.
//!
//! # Errores
//! El primer error léxico detiene el análisis. Luego de un error o de
//! [`Token::Eof`], el lexer no produce más elementos.

use crate::source::{InputStream, Located, Location};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Mayor constante entera que se puede escribir. Solo es un `int` válido
/// bajo negación, como `-2147483648`.
pub const MAX_LITERAL: u32 = 1 << 31;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", MAX_LITERAL)]
    IntOverflow,

    /// Constante de punto flotante.
    #[error("Floating point literals are not supported")]
    FloatLiteral,

    /// Una cadena no se cerró antes del final de su línea.
    #[error("Unterminated string literal")]
    UnterminatedString,

    /// Secuencia de escape fuera del conjunto soportado.
    #[error("Invalid escape sequence `\\{0}`")]
    BadEscape(char),

    /// Prefijos de cadena, como en f-strings o literales de bytes.
    #[error("String prefixes such as `{0}\"...\"` are not supported")]
    StringPrefix(String),

    /// Una línea reduce su indentación a un nivel que nunca se abrió.
    #[error("Unindent does not match any outer indentation level")]
    BadDedent,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_ref())
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(u32),

    /// Literal de cadena, ya sin escapes.
    StrLiteral(Rc<str>),

    /// Fin de una línea lógica.
    Newline,

    /// Apertura de bloque.
    Indent,

    /// Cierre de bloque.
    Dedent,

    /// Fin del archivo, siempre es el último token.
    Eof,

    /// `=`
    Assign,

    /// `+=`
    PlusAssign,

    /// `-=`
    MinusAssign,

    /// `*=`
    TimesAssign,

    /// `//=`
    FloorDivAssign,

    /// `%=`
    ModuloAssign,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `**`
    Power,

    /// `/`
    Slash,

    /// `//`
    FloorDiv,

    /// `%`
    Percent,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `->`
    Arrow,

    /// `,`
    Comma,

    /// `:`
    Colon,

    /// `.`
    Period,

    /// `@`
    At,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        let punctuation = match self {
            Id(id) => return write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => return write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => return write!(fmt, "literal `{}`", integer),
            StrLiteral(_) => return fmt.write_str("string literal"),
            Newline => return fmt.write_str("end of line"),
            Indent => return fmt.write_str("indentation"),
            Dedent => return fmt.write_str("end of block"),
            Eof => return fmt.write_str("end of file"),

            Assign => "=",
            PlusAssign => "+=",
            MinusAssign => "-=",
            TimesAssign => "*=",
            FloorDivAssign => "//=",
            ModuloAssign => "%=",
            Plus => "+",
            Minus => "-",
            Times => "*",
            Power => "**",
            Slash => "/",
            FloorDiv => "//",
            Percent => "%",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Arrow => "->",
            Comma => ",",
            Colon => ":",
            Period => ".",
            At => "@",
            OpenParen => "(",
            CloseParen => ")",
            OpenSquare => "[",
            CloseSquare => "]",
            OpenCurly => "{",
            CloseCurly => "}",
        };

        write!(fmt, "`{}`", punctuation)
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("False",    Keyword::False),
    ("None",     Keyword::None),
    ("True",     Keyword::True),
    ("and",      Keyword::And),
    ("as",       Keyword::As),
    ("assert",   Keyword::Assert),
    ("async",    Keyword::Async),
    ("await",    Keyword::Await),
    ("break",    Keyword::Break),
    ("class",    Keyword::Class),
    ("continue", Keyword::Continue),
    ("def",      Keyword::Def),
    ("del",      Keyword::Del),
    ("elif",     Keyword::Elif),
    ("else",     Keyword::Else),
    ("except",   Keyword::Except),
    ("finally",  Keyword::Finally),
    ("for",      Keyword::For),
    ("from",     Keyword::From),
    ("global",   Keyword::Global),
    ("if",       Keyword::If),
    ("import",   Keyword::Import),
    ("in",       Keyword::In),
    ("is",       Keyword::Is),
    ("lambda",   Keyword::Lambda),
    ("nonlocal", Keyword::Nonlocal),
    ("not",      Keyword::Not),
    ("or",       Keyword::Or),
    ("pass",     Keyword::Pass),
    ("raise",    Keyword::Raise),
    ("return",   Keyword::Return),
    ("try",      Keyword::Try),
    ("while",    Keyword::While),
    ("with",     Keyword::With),
    ("yield",    Keyword::Yield),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map_or("?", |&(name, _)| name);

        fmt.write_str(name)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: Peekable<S>,
    state: State,
    start: Location,
    last: Location,
    indents: Vec<u32>,
    pending_dedents: u32,
    parens: u32,
    line_has_tokens: bool,
}

/// Posibles estados del lexer.
enum State {
    /// Inicio de línea lógica, antes de medir su indentación.
    LineStart,

    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado terminal, luego de [`Token::Eof`] o de un error.
    Stopped,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`,
    /// sin consumirlo.
    Comment,

    /// Primer carácter de un operador que puede extenderse.
    ///
    /// Incluye el token que corresponde si el operador no se extiende,
    /// o `None` si el carácter no es válido por sí solo.
    Operator(char, Option<Token>),

    /// Se encontró `//`, que puede continuar como `//=`.
    DoubleSlash,

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(u32),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),

    /// Cuerpo de una cadena.
    Str {
        quote: char,
        text: String,
        escaped: bool,
    },
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let last = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::LineStart,
            start,
            last,
            indents: vec![0],
            pending_dedents: 0,
            parens: 0,
            line_has_tokens: false,
        }
    }

    /// Reduce la entrada a una secuencia completa de tokens, terminada
    /// por [`Token::Eof`], o al primer error encontrado.
    pub fn tokenize(self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        self.collect()
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Located<Token>>, Located<LexerError>> {
        use {State::*, Token::*};

        if let Stopped = self.state {
            return Ok(None);
        } else if self.pending_dedents > 0 {
            self.pending_dedents -= 1;
            return Ok(Some(Located::at(Dedent, self.start.clone())));
        }

        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let (next_char, here) = match self.source.peek() {
                None => (None, self.last.clone()),
                Some(Ok((c, location))) => (Some(*c), location.clone()),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => {
                        return Err(Located::at(LexerError::Input(error), self.last.clone()))
                    }

                    _ => continue,
                },
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start | LineStart = self.state {
                self.start = here.clone();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Stopped, _) => return Ok(None),

                // Fin de entrada: cierre de línea, de bloques y finalmente EOF
                (Start, None) | (LineStart, None) => {
                    let token = if self.line_has_tokens {
                        Newline
                    } else if self.indents.len() > 1 {
                        self.indents.pop();
                        Dedent
                    } else {
                        Eof
                    };

                    return Ok(Some(Located::at(token, here)));
                }

                // Líneas vacías y espacio de indentación
                (LineStart, Some(' ' | '\t' | '\x0c' | '\r' | '\n')) => (),
                (LineStart, Some('#')) => self.state = Comment,

                // Primer carácter significativo de la línea, no se consume
                (LineStart, Some(_)) => {
                    self.state = Start;

                    let width = here.start().column() - 1;
                    let current = self.indents.last().copied().unwrap_or(0);

                    if width > current {
                        self.indents.push(width);
                        return Ok(Some(Located::at(Indent, here)));
                    } else if width < current {
                        let mut dedents = 0;
                        while self.indents.last().map_or(false, |&top| top > width) {
                            self.indents.pop();
                            dedents += 1;
                        }

                        if self.indents.last().copied().unwrap_or(0) != width {
                            return Err(Located::at(LexerError::BadDedent, here));
                        }

                        self.pending_dedents = dedents - 1;
                        return Ok(Some(Located::at(Dedent, here)));
                    }

                    continue;
                }

                // Fin de línea física
                (Start, Some('\n')) if self.parens > 0 => (),
                (Start, Some('\n')) if self.line_has_tokens => self.state = Complete(Newline),
                (Start, Some('\n')) => self.state = LineStart,

                // Espacios en blanco y comentarios
                (Start, Some(' ' | '\t' | '\x0c' | '\r')) => (),
                (Start, Some('#')) => self.state = Comment,

                // Agrupadores, dentro de los cuales se unen líneas
                (Start, Some(c @ ('(' | '[' | '{'))) => {
                    self.parens += 1;
                    self.state = Complete(match c {
                        '(' => OpenParen,
                        '[' => OpenSquare,
                        _ => OpenCurly,
                    });
                }

                (Start, Some(c @ (')' | ']' | '}'))) => {
                    self.parens = self.parens.saturating_sub(1);
                    self.state = Complete(match c {
                        ')' => CloseParen,
                        ']' => CloseSquare,
                        _ => CloseCurly,
                    });
                }

                // Tokens triviales
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(':')) => self.state = Complete(Colon),
                (Start, Some('.')) => self.state = Complete(Period),
                (Start, Some('@')) => self.state = Complete(At),

                // Operadores que pueden extenderse con un segundo carácter
                (Start, Some('=')) => self.state = Operator('=', Some(Assign)),
                (Start, Some('!')) => self.state = Operator('!', None),
                (Start, Some('<')) => self.state = Operator('<', Some(Less)),
                (Start, Some('>')) => self.state = Operator('>', Some(Greater)),
                (Start, Some('+')) => self.state = Operator('+', Some(Plus)),
                (Start, Some('-')) => self.state = Operator('-', Some(Minus)),
                (Start, Some('*')) => self.state = Operator('*', Some(Times)),
                (Start, Some('/')) => self.state = Operator('/', Some(Slash)),
                (Start, Some('%')) => self.state = Operator('%', Some(Percent)),

                // Cadenas
                (Start, Some(quote @ ('"' | '\''))) => {
                    self.state = Str {
                        quote,
                        text: String::new(),
                        escaped: false,
                    }
                }

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el entero, ya que esta lógica ya está implementada
                // en el respectivo caso para un estado de constante
                // entera para el cual el siguiente carácter es un
                // dígito. Por tanto, la constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                (Start, Some(c)) => return Err(Located::at(LexerError::BadChar(c), here)),

                // Emisión retardada de tokens cualesquiera
                (Complete(token), _) => break std::mem::replace(token, Eof),

                // Los comentarios descartan el resto de la línea
                (Comment, Some('\n') | None) => {
                    self.state = Start;
                    continue;
                }

                (Comment, Some(_)) => (),

                // Operadores de dos caracteres
                (Operator(first, single), next) => match (*first, next) {
                    ('=', Some('=')) => self.state = Complete(Equal),
                    ('!', Some('=')) => self.state = Complete(NotEqual),
                    ('<', Some('=')) => self.state = Complete(LessOrEqual),
                    ('>', Some('=')) => self.state = Complete(GreaterOrEqual),
                    ('+', Some('=')) => self.state = Complete(PlusAssign),
                    ('-', Some('=')) => self.state = Complete(MinusAssign),
                    ('-', Some('>')) => self.state = Complete(Arrow),
                    ('*', Some('=')) => self.state = Complete(TimesAssign),
                    ('*', Some('*')) => self.state = Complete(Power),
                    ('%', Some('=')) => self.state = Complete(ModuloAssign),
                    ('/', Some('/')) => self.state = DoubleSlash,

                    _ => match single.take() {
                        Some(token) => break token,
                        None => return Err(Located::at(LexerError::Expected('='), here)),
                    },
                },

                (DoubleSlash, Some('=')) => self.state = Complete(FloorDivAssign),
                (DoubleSlash, _) => break FloorDiv,

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = digit as u32 - '0' as u32;

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                        .filter(|&n| n <= MAX_LITERAL)
                    {
                        Some(result) => *accumulated = result,
                        None => {
                            let location = Location::span(self.start.clone(), &here);
                            return Err(Located::at(LexerError::IntOverflow, location));
                        }
                    }
                }

                (Integer(_), Some('.')) => {
                    return Err(Located::at(LexerError::FloatLiteral, here));
                }

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer(integer), _) => break IntLiteral(*integer),

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => word.push(c),

                (Word(word), Some('"' | '\'')) => {
                    let prefix = std::mem::take(word);
                    let location = Location::span(self.start.clone(), &here);
                    return Err(Located::at(LexerError::StringPrefix(prefix), location));
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = self::Keyword::from_str(word) {
                        break Keyword(keyword);
                    } else {
                        break Id(Identifier(Rc::from(std::mem::take(word).as_str())));
                    }
                }

                // Las cadenas no pueden cruzar líneas
                (Str { .. }, Some('\n') | None) => {
                    return Err(Located::at(
                        LexerError::UnterminatedString,
                        self.start.clone(),
                    ));
                }

                (Str { quote, text, escaped }, Some(c)) => {
                    if *escaped {
                        *escaped = false;
                        match c {
                            'n' => text.push('\n'),
                            '\\' | '"' | '\'' => text.push(c),
                            _ => return Err(Located::at(LexerError::BadEscape(c), here)),
                        }
                    } else if c == '\\' {
                        *escaped = true;
                    } else if c == *quote {
                        let literal = Rc::from(std::mem::take(text).as_str());
                        self.state = Complete(StrLiteral(literal));
                    } else {
                        text.push(c);
                    }
                }
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(Ok((_, location))) = self.source.next() {
                self.last = location;
            }
        };

        let location = Location::span(self.start.clone(), &self.last);
        Ok(Some(Located::at(token, location)))
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some(token)) => {
                self.state = match token.as_ref() {
                    Token::Newline => State::LineStart,
                    Token::Eof => State::Stopped,
                    _ => State::Start,
                };

                match token.as_ref() {
                    Token::Newline => self.line_has_tokens = false,
                    Token::Indent | Token::Dedent | Token::Eof => (),
                    _ => self.line_has_tokens = true,
                }

                Some(Ok(token))
            }

            Err(error) => {
                self.state = State::Stopped;
                Some(Err(error))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::{Identifier, Keyword as Kw, Lexer, LexerError, MAX_LITERAL, Token::{self, *}};
    use crate::source::{self, Located};
    use std::rc::Rc;

    fn lex(text: &str) -> Result<Vec<Token>, Located<LexerError>> {
        let (start, stream) = source::consume(text.as_bytes(), "test.py");
        let tokens = Lexer::new(start, stream).tokenize()?;

        Ok(tokens.into_iter().map(Located::into_inner).collect())
    }

    fn id(name: &str) -> Token {
        Id(Identifier::from(name))
    }

    #[test]
    fn simple_statement() {
        assert_eq!(
            lex("x = 42\n").unwrap(),
            vec![id("x"), Assign, IntLiteral(42), Newline, Eof]
        );
    }

    #[test]
    fn empty_source_is_just_eof() {
        assert_eq!(lex("").unwrap(), vec![Eof]);
        assert_eq!(lex("\n\n   \n# nothing here\n").unwrap(), vec![Eof]);
    }

    #[test]
    fn keywords_vs_identifiers() {
        assert_eq!(
            lex("def define return returned True true").unwrap(),
            vec![
                Keyword(Kw::Def),
                id("define"),
                Keyword(Kw::Return),
                id("returned"),
                Keyword(Kw::True),
                id("true"),
                Newline,
                Eof,
            ]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            lex("+ - * ** / // % == != < <= > >= -> = += -= *= //= %=").unwrap(),
            vec![
                Plus, Minus, Times, Power, Slash, FloorDiv, Percent, Equal, NotEqual, Less,
                LessOrEqual, Greater, GreaterOrEqual, Arrow, Assign, PlusAssign, MinusAssign,
                TimesAssign, FloorDivAssign, ModuloAssign, Newline, Eof,
            ]
        );
    }

    #[test]
    fn indentation_produces_block_tokens() {
        let source = "def f():\n    if x:\n        return 1\n    return 2\ny = 3\n";
        assert_eq!(
            lex(source).unwrap(),
            vec![
                Keyword(Kw::Def),
                id("f"),
                OpenParen,
                CloseParen,
                Colon,
                Newline,
                Indent,
                Keyword(Kw::If),
                id("x"),
                Colon,
                Newline,
                Indent,
                Keyword(Kw::Return),
                IntLiteral(1),
                Newline,
                Dedent,
                Keyword(Kw::Return),
                IntLiteral(2),
                Newline,
                Dedent,
                id("y"),
                Assign,
                IntLiteral(3),
                Newline,
                Eof,
            ]
        );
    }

    #[test]
    fn multiple_dedents_and_dedents_at_eof() {
        let tokens = lex("if a:\n  if b:\n    c()\nd()\nif e:\n  f()").unwrap();
        let dedents = tokens.iter().filter(|token| **token == Dedent).count();
        assert_eq!(dedents, 3);
        assert_eq!(&tokens[tokens.len() - 3..], &[Newline, Dedent, Eof]);
    }

    #[test]
    fn blank_and_comment_lines_do_not_affect_blocks() {
        let source = "while x:\n\n        # deeply indented comment\n    y()\n";
        assert_eq!(
            lex(source).unwrap(),
            vec![
                Keyword(Kw::While),
                id("x"),
                Colon,
                Newline,
                Indent,
                id("y"),
                OpenParen,
                CloseParen,
                Newline,
                Dedent,
                Eof,
            ]
        );
    }

    #[test]
    fn tabs_indent_to_the_next_tab_stop() {
        let tokens = lex("if x:\n\ty()\n    z()\n").unwrap();
        assert_eq!(tokens.iter().filter(|token| **token == Indent).count(), 1);
        assert_eq!(tokens.iter().filter(|token| **token == Dedent).count(), 1);
    }

    #[test]
    fn inconsistent_dedent_is_an_error() {
        let error = lex("if x:\n    y()\n  z()\n").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::BadDedent));
        assert_eq!(error.location().start().line(), 3);
        assert_eq!(error.location().start().column(), 3);
    }

    #[test]
    fn parentheses_join_lines() {
        assert_eq!(
            lex("f(1,\n      2)\n").unwrap(),
            vec![
                id("f"),
                OpenParen,
                IntLiteral(1),
                Comma,
                IntLiteral(2),
                CloseParen,
                Newline,
                Eof,
            ]
        );
    }

    #[test]
    fn comments_end_at_newline() {
        assert_eq!(
            lex("x = 1 # set x\n").unwrap(),
            vec![id("x"), Assign, IntLiteral(1), Newline, Eof]
        );
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(
            lex(r#"s = "a\"b\\c\n" + 'it\'s'"#).unwrap(),
            vec![
                id("s"),
                Assign,
                StrLiteral(Rc::from("a\"b\\c\n")),
                Plus,
                StrLiteral(Rc::from("it's")),
                Newline,
                Eof,
            ]
        );
    }

    #[test]
    fn string_errors() {
        let error = lex("s = \"abc\n").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::UnterminatedString));
        assert_eq!(error.location().start().column(), 5);

        let error = lex(r#"s = "\t""#).unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::BadEscape('t')));

        let error = lex(r#"s = f"{x}""#).unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::StringPrefix(prefix) if prefix == "f"));
    }

    #[test]
    fn integer_errors() {
        assert_eq!(lex("2147483647").unwrap()[0], IntLiteral(i32::MAX as u32));
        assert_eq!(lex("2147483648").unwrap()[0], IntLiteral(MAX_LITERAL));

        let error = lex("x = 2147483649").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::IntOverflow));

        let error = lex("x = 99999999999").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::IntOverflow));

        let error = lex("x = 1.5").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::FloatLiteral));
    }

    #[test]
    fn bad_characters() {
        let error = lex("x = $").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::BadChar('$')));

        let error = lex("x ! y").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::Expected('=')));
    }

    #[test]
    fn token_locations() {
        let (start, stream) = source::consume("x = foo\n".as_bytes(), "test.py");
        let tokens = Lexer::new(start, stream).tokenize().unwrap();

        assert_eq!(tokens[2].location().to_string(), "test.py:[1:5-1:7]");
        assert_eq!(tokens[0].location().to_string(), "test.py:1:1");
    }

    #[test]
    fn lexer_is_fused_after_eof() {
        let (start, stream) = source::consume("x".as_bytes(), "test.py");
        let mut lexer = Lexer::new(start, stream);

        let tokens: Vec<_> = lexer.by_ref().collect();
        assert_eq!(tokens.len(), 3);
        assert!(lexer.next().is_none());
    }
}
