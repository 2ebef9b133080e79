//! Análisis semántico.
//!
//! Esta fase recorre el [`parse::Module`] en orden de fuente, resuelve
//! cada nombre contra su ámbito, verifica tipos y produce un
//! [`ir::Program`]. No genera código.
//!
//! # Ámbitos
//! Existe un ámbito de módulo que persiste durante toda la compilación y
//! un ámbito por función, encadenado al de módulo, que se descarta al
//! terminar de resolver esa función. Como en el lenguaje huésped, un
//! nombre asignado en cualquier punto del cuerpo de una función es local
//! a ella. Las llamadas se resuelven finalmente contra los builtins de la
//! plataforma activa.
//!
//! # Tipos de retorno
//! Las funciones se declaran todas antes de resolver cualquier cuerpo. El
//! tipo de retorno de una función sin anotación es `None` si su cuerpo
//! no contiene `return <expr>`, y en otro caso queda pendiente hasta que
//! se resuelve el primer `return <expr>`. Llamar a una función cuyo tipo
//! de retorno sigue pendiente es un error.

use std::{collections::HashMap, rc::Rc};

use thiserror::Error;

use crate::{
    ir::{self, Access, Callee, Expr, ExprKind, Helpers, Signature, Type, Variable},
    lex::Identifier,
    parse::{self, BinOp, TypeName, UnaryOp},
    platform::{self, Platform},
    source::{Located, Location},
};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Name `{0}` is not defined")]
    Undefined(Identifier),

    #[error("Local variable `{0}` is read before its first assignment")]
    ReadBeforeAssignment(Identifier),

    #[error("Unknown function `{0}`")]
    UnknownFunction(Identifier),

    #[error("`{name}` is a builtin of platform `{provider}`, it is not available on `{active}`")]
    UnavailableBuiltin {
        name: Identifier,
        provider: &'static str,
        active: &'static str,
    },

    #[error("`{name}` takes {expected} argument(s), but {found} were given")]
    ArgumentCount {
        name: Identifier,
        expected: usize,
        found: usize,
    },

    #[error("Type mismatch: expected `{0}`, found `{1}`")]
    ExpectedType(Type, Type),

    #[error("Cannot assign a value of type `{found}` to `{name}`, which has type `{expected}`")]
    AssignmentType {
        name: Identifier,
        expected: Type,
        found: Type,
    },

    #[error("Operator `{0}` does not accept operands of type `{1}`")]
    UnsupportedOperand(String, Type),

    #[error("`{0}` does not return a value")]
    VoidValue(Identifier),

    #[error("`{0}` cannot have type `None`")]
    VoidVariable(Identifier),

    #[error("`{0}` is a function of type `{1}`, not a value")]
    NotAValue(Identifier, Type),

    #[error("`{0}` is a variable, not a function")]
    NotCallable(Identifier),

    #[error("Redefinition of `{0}`")]
    Redefinition(Identifier),

    #[error("Parameter `{0}` requires a type annotation")]
    MissingAnnotation(Identifier),

    #[error("Return type mismatch: expected `{0}`, found `{1}`")]
    ReturnType(Type, Type),

    #[error("Missing return value of type `{0}`")]
    MissingReturnValue(Type),

    #[error("Return type of `{0}` is not known at this point, annotate it with `-> type`")]
    PendingReturnType(Identifier),

    #[error("Return type `{found}` conflicts with `{expected}` from the first return at {first}")]
    ConflictingReturns {
        expected: Type,
        found: Type,
        first: Location,
    },

    #[error("Mixing `return` with and without a value, first return at {first}")]
    MixedReturns { first: Location },

    #[error("Function `{0}` may reach its end without returning a value")]
    MissingReturn(Identifier),

    #[error("`{0}` outside of a loop")]
    OutsideLoop(&'static str),

    #[error("Functions can only be defined at module level")]
    NestedFunction,

    #[error("Module has more than one top-level `return`, first at {first}")]
    MultipleCompletions { first: Location },

    #[error("Top-level `return` must be the last statement of the module")]
    CompletionNotLast,

    #[error("`return` outside of a function must be a top-level statement")]
    NestedCompletion,
}

/// Tabla de símbolos de un ámbito.
#[derive(Default)]
struct SymbolTable {
    symbols: HashMap<Identifier, Named>,

    /// Variables en orden de declaración.
    order: Vec<Identifier>,
}

enum Named {
    Var(Slot),
    Function(FunctionSymbol),
}

struct Slot {
    /// `None` mientras no se haya resuelto la primera asignación.
    typ: Option<Type>,
    read: bool,
    parameter: bool,
}

struct FunctionSymbol {
    parameters: Vec<Type>,

    /// `None` mientras el tipo de retorno esté pendiente.
    returns: Option<Type>,
}

impl SymbolTable {
    fn declare_var(&mut self, name: Identifier, slot: Slot) {
        self.order.push(name.clone());
        self.symbols.insert(name, Named::Var(slot));
    }

    fn variables(&self, parameters: bool) -> Vec<Variable> {
        self.order
            .iter()
            .filter_map(|name| match self.symbols.get(name) {
                Some(Named::Var(Slot {
                    typ: Some(typ),
                    read,
                    parameter,
                })) if *parameter == parameters => Some(Variable {
                    name: name.clone(),
                    typ: typ.clone(),
                    read: *read,
                }),

                _ => None,
            })
            .collect()
    }
}

/// Estado de la función que se está resolviendo.
struct FunctionScope {
    name: Identifier,
    table: SymbolTable,

    /// Tipo de retorno fijo desde el inicio, por anotación o porque
    /// el cuerpo no retorna valores.
    expected: Option<Type>,

    /// Primer `return` encontrado en funciones con retorno inferido.
    first_return: Option<(Option<Type>, Location)>,
}

struct Context<'a> {
    platform: &'static Platform,
    module: &'a mut SymbolTable,
    function: Option<FunctionScope>,
    helpers: Helpers,
    loops: u32,
    calls_main: bool,
}

impl parse::Module {
    /// Resuelve el módulo para una plataforma.
    pub fn resolve(&self, platform: &'static Platform) -> Semantic<ir::Program> {
        let mut module = SymbolTable::default();
        self.declare_functions(&mut module)?;
        let has_completion = self.check_completion()?;

        let mut context = Context {
            platform,
            module: &mut module,
            function: None,
            helpers: Helpers::empty(),
            loops: 0,
            calls_main: false,
        };

        let mut functions = Vec::new();
        let mut body = Vec::new();
        let mut completion = None;

        for statement in &self.body {
            match statement.val() {
                parse::Statement::Def(def) => functions.push(context.function(def)?),

                parse::Statement::Return(Some(value)) => {
                    let value_expr = context.value(value)?;
                    if !value_expr.typ.is_numeric() {
                        let error = SemanticError::ExpectedType(Type::Int, value_expr.typ);
                        return fail(error, value.location());
                    }

                    completion = Some(value_expr);
                }

                parse::Statement::Return(None) => (),

                _ => body.extend(context.statement(statement)?),
            }
        }

        let helpers = context.helpers;
        let calls_main = context.calls_main;

        // Sin `return` de nivel superior, `main()` se invoca implícitamente
        let main = Identifier::from("main");
        if let (false, false, Some(Named::Function(symbol))) =
            (has_completion, calls_main, module.symbols.get(&main))
        {
            if symbol.parameters.is_empty() {
                let call = |typ| {
                    let kind = ExprKind::Call {
                        target: Callee::User(main.clone()),
                        arguments: Vec::new(),
                    };

                    Expr::new(typ, kind)
                };

                match &symbol.returns {
                    Some(Type::Void) => body.push(ir::Statement::Expr(call(Type::Void))),
                    Some(typ) if typ.is_numeric() => completion = Some(call(typ.clone())),
                    _ => (),
                }
            }
        }

        Ok(ir::Program {
            globals: module.variables(false),
            functions,
            body,
            completion,
            helpers,
        })
    }

    /// Pasada de declaración: registra todas las firmas de funciones.
    fn declare_functions(&self, module: &mut SymbolTable) -> Semantic<()> {
        for statement in &self.body {
            if let parse::Statement::Def(def) = statement.val() {
                let parameters = parameter_types(def)?;
                let returns = declared_return(def);

                let name = def.name.val().clone();
                if module.symbols.contains_key(&name) {
                    return fail(SemanticError::Redefinition(name), def.name.location());
                }

                let symbol = FunctionSymbol {
                    parameters,
                    returns,
                };

                module.symbols.insert(name, Named::Function(symbol));
            }
        }

        Ok(())
    }

    /// Valida la convención de completitud. Retorna si hay un `return`
    /// de nivel superior.
    fn check_completion(&self) -> Semantic<bool> {
        let mut returns = self
            .body
            .iter()
            .filter(|statement| matches!(statement.val(), parse::Statement::Return(_)))
            .map(Located::location);

        let first = match returns.next() {
            Some(first) => first,
            None => return Ok(false),
        };

        if let Some(second) = returns.next() {
            let error = SemanticError::MultipleCompletions {
                first: first.clone(),
            };

            return fail(error, second);
        }

        match self.body.last().map(Located::val) {
            Some(parse::Statement::Return(_)) => Ok(true),
            _ => fail(SemanticError::CompletionNotLast, first),
        }
    }
}

impl Context<'_> {
    fn function(&mut self, def: &parse::FunctionDef) -> Semantic<ir::Function> {
        let name = def.name.val().clone();
        let types = parameter_types(def)?;

        let mut table = SymbolTable::default();
        for (parameter, typ) in def.parameters.iter().zip(types) {
            let parameter_name = parameter.name.val().clone();
            if table.symbols.contains_key(&parameter_name) {
                let error = SemanticError::Redefinition(parameter_name);
                return fail(error, parameter.name.location());
            }

            let slot = Slot {
                typ: Some(typ),
                read: false,
                parameter: true,
            };

            table.declare_var(parameter_name, slot);
        }

        // Todo nombre asignado en el cuerpo es local a la función
        let mut assigned = Vec::new();
        assigned_names(&def.body, &mut assigned);

        for local in assigned {
            if !table.symbols.contains_key(&local) {
                let slot = Slot {
                    typ: None,
                    read: false,
                    parameter: false,
                };

                table.declare_var(local, slot);
            }
        }

        self.function = Some(FunctionScope {
            name: name.clone(),
            table,
            expected: declared_return(def),
            first_return: None,
        });

        let body = self.block(&def.body);
        let scope = self.function.take();
        let body = body?;

        let (table, returns) = match scope {
            Some(scope) => {
                let inferred = scope.first_return.and_then(|(typ, _)| typ);
                let returns = scope.expected.or(inferred).unwrap_or(Type::Void);

                (scope.table, returns)
            }

            None => (SymbolTable::default(), Type::Void),
        };

        if returns != Type::Void && !ir::always_returns(&body) {
            return fail(SemanticError::MissingReturn(name), def.name.location());
        }

        Ok(ir::Function {
            name,
            parameters: table.variables(true),
            returns,
            locals: table.variables(false),
            body,
        })
    }

    fn block(&mut self, body: &[Located<parse::Statement>]) -> Semantic<Vec<ir::Statement>> {
        let mut statements = Vec::with_capacity(body.len());
        for statement in body {
            statements.extend(self.statement(statement)?);
        }

        Ok(statements)
    }

    fn statement(
        &mut self,
        statement: &Located<parse::Statement>,
    ) -> Semantic<Option<ir::Statement>> {
        let location = statement.location();
        let statement = match statement.val() {
            parse::Statement::Def(_) => return fail(SemanticError::NestedFunction, location),

            parse::Statement::Assign {
                target,
                annotation,
                value,
            } => self.assign(target, annotation.as_ref(), value)?,

            parse::Statement::Return(value) => self.return_statement(value.as_ref(), location)?,

            parse::Statement::If {
                condition,
                body,
                orelse,
            } => ir::Statement::If {
                condition: self.condition(condition)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },

            parse::Statement::While { condition, body } => {
                let condition = self.condition(condition)?;

                self.loops += 1;
                let body = self.block(body);
                self.loops -= 1;

                ir::Statement::While {
                    condition,
                    body: body?,
                }
            }

            parse::Statement::Expr(expr) => ir::Statement::Expr(self.expr(expr)?),

            parse::Statement::Pass => return Ok(None),
            parse::Statement::Break => self.in_loop("break", ir::Statement::Break, location)?,
            parse::Statement::Continue => {
                self.in_loop("continue", ir::Statement::Continue, location)?
            }
        };

        Ok(Some(statement))
    }

    fn in_loop(
        &self,
        keyword: &'static str,
        statement: ir::Statement,
        location: &Location,
    ) -> Semantic<ir::Statement> {
        if self.loops > 0 {
            Ok(statement)
        } else {
            fail(SemanticError::OutsideLoop(keyword), location)
        }
    }

    fn assign(
        &mut self,
        target: &Located<Identifier>,
        annotation: Option<&Located<TypeName>>,
        value: &Located<parse::Expr>,
    ) -> Semantic<ir::Statement> {
        let name = target.val();

        let declared = match annotation {
            None => None,
            Some(annotation) => match type_of(*annotation.val()) {
                Type::Void => {
                    let error = SemanticError::VoidVariable(name.clone());
                    return fail(error, annotation.location());
                }

                typ => Some((typ, annotation.location())),
            },
        };

        let value_expr = self.value(value)?;
        let mismatch = |expected: &Type, found: &Type| SemanticError::AssignmentType {
            name: name.clone(),
            expected: expected.clone(),
            found: found.clone(),
        };

        if let Some((declared, _)) = &declared {
            if !declared.accepts(&value_expr.typ) {
                return fail(mismatch(declared, &value_expr.typ), value.location());
            }
        }

        let (table, access) = match self.function.as_mut() {
            Some(function) => (&mut function.table, Access::Local(name.clone())),
            None => (&mut *self.module, Access::Global(name.clone())),
        };

        match table.symbols.get_mut(name) {
            Some(Named::Function(_)) => {
                return fail(SemanticError::Redefinition(name.clone()), target.location());
            }

            Some(Named::Var(slot)) => match slot.typ.clone() {
                None => {
                    let typ = declared.map_or_else(|| value_expr.typ.clone(), |(typ, _)| typ);
                    slot.typ = Some(typ);
                }

                Some(existing) => {
                    if let Some((declared, location)) = &declared {
                        if *declared != existing {
                            return fail(mismatch(&existing, declared), location);
                        }
                    }

                    if !existing.accepts(&value_expr.typ) {
                        return fail(mismatch(&existing, &value_expr.typ), value.location());
                    }
                }
            },

            None => {
                let typ = declared.map_or_else(|| value_expr.typ.clone(), |(typ, _)| typ);
                let slot = Slot {
                    typ: Some(typ),
                    read: false,
                    parameter: false,
                };

                table.declare_var(name.clone(), slot);
            }
        }

        Ok(ir::Statement::Assign {
            target: access,
            value: value_expr,
        })
    }

    fn return_statement(
        &mut self,
        value: Option<&Located<parse::Expr>>,
        location: &Location,
    ) -> Semantic<ir::Statement> {
        if self.function.is_none() {
            return fail(SemanticError::NestedCompletion, location);
        }

        let value_expr = match value {
            Some(value) => Some(self.value(value)?),
            None => None,
        };

        let found = value_expr.as_ref().map(|expr| &expr.typ);
        let value_location = value.map_or(location, Located::location);

        let function = match self.function.as_mut() {
            Some(function) => function,
            None => return fail(SemanticError::NestedCompletion, location),
        };

        match (&function.expected, found) {
            (Some(Type::Void), None) => (),
            (Some(Type::Void), Some(found)) => {
                let error = SemanticError::ReturnType(Type::Void, found.clone());
                return fail(error, value_location);
            }

            (Some(expected), None) => {
                let error = SemanticError::MissingReturnValue(expected.clone());
                return fail(error, location);
            }

            (Some(expected), Some(found)) => {
                if !expected.accepts(found) {
                    let error = SemanticError::ReturnType(expected.clone(), found.clone());
                    return fail(error, value_location);
                }
            }

            (None, found) => match &function.first_return {
                None => {
                    function.first_return = Some((found.cloned(), location.clone()));

                    // El tipo de retorno deja de estar pendiente desde aquí
                    if let (Some(found), Some(Named::Function(symbol))) =
                        (found, self.module.symbols.get_mut(&function.name))
                    {
                        symbol.returns = Some(found.clone());
                    }
                }

                Some((first_type, first)) => match (first_type, found) {
                    (None, None) => (),
                    (Some(expected), Some(found)) => {
                        if !expected.accepts(found) {
                            let error = SemanticError::ConflictingReturns {
                                expected: expected.clone(),
                                found: found.clone(),
                                first: first.clone(),
                            };

                            return fail(error, value_location);
                        }
                    }

                    _ => {
                        let error = SemanticError::MixedReturns {
                            first: first.clone(),
                        };

                        return fail(error, location);
                    }
                },
            },
        }

        Ok(ir::Statement::Return(value_expr))
    }

    /// Condición de `if` o `while`.
    fn condition(&mut self, condition: &Located<parse::Expr>) -> Semantic<Expr> {
        let condition_expr = self.value(condition)?;
        if condition_expr.typ.is_numeric() {
            Ok(condition_expr)
        } else {
            let error = SemanticError::ExpectedType(Type::Bool, condition_expr.typ);
            fail(error, condition.location())
        }
    }

    /// Expresión cuyo valor se utiliza, por lo cual no puede ser `None`.
    fn value(&mut self, expr: &Located<parse::Expr>) -> Semantic<Expr> {
        let resolved = self.expr(expr)?;
        if resolved.typ != Type::Void {
            return Ok(resolved);
        }

        let name = match expr.val() {
            parse::Expr::Call { callee, .. } => callee.val().clone(),
            _ => Identifier::from("expression"),
        };

        fail(SemanticError::VoidValue(name), expr.location())
    }

    fn expr(&mut self, expr: &Located<parse::Expr>) -> Semantic<Expr> {
        let location = expr.location();

        let (typ, kind) = match expr.val() {
            parse::Expr::Integer(integer) => (Type::Int, ExprKind::Integer(*integer)),
            parse::Expr::True => (Type::Bool, ExprKind::Bool(true)),
            parse::Expr::False => (Type::Bool, ExprKind::Bool(false)),
            parse::Expr::Str(string) => (Type::Str, ExprKind::Str(Rc::clone(string))),
            parse::Expr::Name(name) => return self.read(name, location),

            parse::Expr::Call { callee, arguments } => {
                return self.call(callee, arguments, location)
            }

            parse::Expr::Unary(operator, operand) => {
                let operand_expr = self.value(operand)?;
                numeric_operand(operator, &operand_expr, operand.location())?;

                let operand_expr = Box::new(operand_expr);
                match operator {
                    UnaryOp::Negate => (Type::Int, ExprKind::Negate(operand_expr)),
                    UnaryOp::Not => (Type::Bool, ExprKind::Not(operand_expr)),
                }
            }

            parse::Expr::Binary(lhs, operator, rhs) => {
                let operator = *operator;

                let lhs_expr = self.value(lhs)?;
                self.binary_operand(operator, &lhs_expr, lhs.location())?;
                let rhs_expr = self.value(rhs)?;
                self.binary_operand(operator, &rhs_expr, rhs.location())?;

                match operator {
                    BinOp::FloorDiv => self.helpers |= Helpers::FLOOR_DIV,
                    BinOp::Mod => self.helpers |= Helpers::MODULO,
                    _ => (),
                }

                let typ = if operator.is_logical() || operator.is_comparison() {
                    Type::Bool
                } else {
                    Type::Int
                };

                let kind = ExprKind::Binary(Box::new(lhs_expr), operator, Box::new(rhs_expr));
                (typ, kind)
            }
        };

        Ok(Expr::new(typ, kind))
    }

    fn binary_operand(&self, operator: BinOp, operand: &Expr, location: &Location) -> Semantic<()> {
        if !operator.is_logical() {
            numeric_operand(&operator, operand, location)
        } else if operand.typ == Type::Bool {
            Ok(())
        } else {
            let error = SemanticError::ExpectedType(Type::Bool, operand.typ.clone());
            fail(error, location)
        }
    }

    fn read(&mut self, name: &Identifier, location: &Location) -> Semantic<Expr> {
        if let Some(function) = self.function.as_mut() {
            if let Some(Named::Var(slot)) = function.table.symbols.get_mut(name) {
                let typ = match &slot.typ {
                    Some(typ) => typ.clone(),
                    None => {
                        let error = SemanticError::ReadBeforeAssignment(name.clone());
                        return fail(error, location);
                    }
                };

                slot.read = true;
                return Ok(Expr::new(typ, ExprKind::Read(Access::Local(name.clone()))));
            }
        }

        match self.module.symbols.get_mut(name) {
            Some(Named::Var(slot)) => {
                let typ = match &slot.typ {
                    Some(typ) => typ.clone(),
                    None => {
                        let error = SemanticError::ReadBeforeAssignment(name.clone());
                        return fail(error, location);
                    }
                };

                slot.read = true;
                Ok(Expr::new(typ, ExprKind::Read(Access::Global(name.clone()))))
            }

            Some(Named::Function(function)) => {
                let error = match &function.returns {
                    Some(returns) => {
                        let typ = function_type(&function.parameters, returns);
                        SemanticError::NotAValue(name.clone(), typ)
                    }

                    None => SemanticError::PendingReturnType(name.clone()),
                };

                fail(error, location)
            }

            None => {
                let builtin = platform::provider_of(name.as_ref())
                    .and_then(|provider| provider.builtin(name.as_ref()));

                let error = match builtin {
                    Some(builtin) => {
                        let typ = function_type(builtin.parameters, &builtin.returns);
                        SemanticError::NotAValue(name.clone(), typ)
                    }

                    None => SemanticError::Undefined(name.clone()),
                };

                fail(error, location)
            }
        }
    }

    fn call(
        &mut self,
        callee: &Located<Identifier>,
        arguments: &[Located<parse::Expr>],
        location: &Location,
    ) -> Semantic<Expr> {
        let name = callee.val();

        let is_local = self
            .function
            .as_ref()
            .map_or(false, |function| function.table.symbols.contains_key(name));

        if is_local {
            return fail(SemanticError::NotCallable(name.clone()), callee.location());
        }

        // Las funciones de usuario ocultan a los builtins
        let (target, parameters, returns) = match self.module.symbols.get(name) {
            Some(Named::Var(_)) => {
                return fail(SemanticError::NotCallable(name.clone()), callee.location())
            }

            Some(Named::Function(function)) => {
                let returns = match &function.returns {
                    Some(returns) => returns.clone(),
                    None => {
                        let error = SemanticError::PendingReturnType(name.clone());
                        return fail(error, callee.location());
                    }
                };

                (Callee::User(name.clone()), function.parameters.clone(), returns)
            }

            None => match self.platform.builtin(name.as_ref()) {
                Some(builtin) => (
                    Callee::Builtin(builtin),
                    builtin.parameters.to_vec(),
                    builtin.returns.clone(),
                ),

                None => {
                    let error = match platform::provider_of(name.as_ref()) {
                        Some(provider) => SemanticError::UnavailableBuiltin {
                            name: name.clone(),
                            provider: provider.id,
                            active: self.platform.id,
                        },

                        None => SemanticError::UnknownFunction(name.clone()),
                    };

                    return fail(error, callee.location());
                }
            },
        };

        if arguments.len() != parameters.len() {
            let error = SemanticError::ArgumentCount {
                name: name.clone(),
                expected: parameters.len(),
                found: arguments.len(),
            };

            return fail(error, location);
        }

        let mut resolved = Vec::with_capacity(arguments.len());
        for (argument, expected) in arguments.iter().zip(&parameters) {
            let argument_expr = self.value(argument)?;
            if !expected.accepts(&argument_expr.typ) {
                let error = SemanticError::ExpectedType(expected.clone(), argument_expr.typ);
                return fail(error, argument.location());
            }

            resolved.push(argument_expr);
        }

        // Basta una llamada en cualquier cuerpo para no invocar `main()` de nuevo
        if let Callee::User(_) = target {
            self.calls_main |= name.as_ref() == "main";
        }

        let kind = ExprKind::Call {
            target,
            arguments: resolved,
        };

        Ok(Expr::new(returns, kind))
    }
}

fn fail<T>(error: SemanticError, location: &Location) -> Semantic<T> {
    Err(Located::at(error, location.clone()))
}

fn numeric_operand<O>(operator: &O, operand: &Expr, location: &Location) -> Semantic<()>
where
    O: std::fmt::Display,
{
    if operand.typ.is_numeric() {
        Ok(())
    } else {
        let error = SemanticError::UnsupportedOperand(operator.to_string(), operand.typ.clone());
        fail(error, location)
    }
}

fn function_type(parameters: &[Type], returns: &Type) -> Type {
    Type::Function(Box::new(Signature {
        parameters: parameters.to_vec(),
        returns: returns.clone(),
    }))
}

fn type_of(name: TypeName) -> Type {
    match name {
        TypeName::Int => Type::Int,
        TypeName::Bool => Type::Bool,
        TypeName::Str => Type::Str,
        TypeName::None => Type::Void,
    }
}

fn parameter_types(def: &parse::FunctionDef) -> Semantic<Vec<Type>> {
    def.parameters
        .iter()
        .map(|parameter| {
            let name = &parameter.name;
            match &parameter.annotation {
                None => fail(
                    SemanticError::MissingAnnotation(name.val().clone()),
                    name.location(),
                ),

                Some(annotation) => match type_of(*annotation.val()) {
                    Type::Void => fail(
                        SemanticError::VoidVariable(name.val().clone()),
                        annotation.location(),
                    ),

                    typ => Ok(typ),
                },
            }
        })
        .collect()
}

/// Tipo de retorno conocido al declarar, o `None` si queda pendiente.
fn declared_return(def: &parse::FunctionDef) -> Option<Type> {
    match &def.returns {
        Some(annotation) => Some(type_of(*annotation.val())),
        None if returns_value(&def.body) => None,
        None => Some(Type::Void),
    }
}

fn returns_value(body: &[Located<parse::Statement>]) -> bool {
    body.iter().any(|statement| match statement.val() {
        parse::Statement::Return(value) => value.is_some(),
        parse::Statement::If { body, orelse, .. } => returns_value(body) || returns_value(orelse),
        parse::Statement::While { body, .. } => returns_value(body),
        _ => false,
    })
}

fn assigned_names(body: &[Located<parse::Statement>], names: &mut Vec<Identifier>) {
    for statement in body {
        match statement.val() {
            parse::Statement::Assign { target, .. } => {
                if !names.contains(target.val()) {
                    names.push(target.val().clone());
                }
            }

            parse::Statement::If { body, orelse, .. } => {
                assigned_names(body, names);
                assigned_names(orelse, names);
            }

            parse::Statement::While { body, .. } => assigned_names(body, names),
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse, source};

    fn resolve_on(text: &str, platform: &str) -> Semantic<ir::Program> {
        let (start, stream) = source::consume(text.as_bytes(), "test.py");
        let tokens = Lexer::new(start.clone(), stream).tokenize().unwrap();
        let module = parse::parse(tokens.iter(), start).unwrap();

        module.resolve(platform::lookup(platform).unwrap())
    }

    fn resolve(text: &str) -> Semantic<ir::Program> {
        resolve_on(text, "desktop-process")
    }

    fn reject(text: &str) -> Located<SemanticError> {
        match resolve(text) {
            Ok(_) => panic!("program was accepted: {:?}", text),
            Err(error) => error,
        }
    }

    #[test]
    fn unknown_function_is_named_and_located() {
        let error = reject("x = 1\nfrobnicate()\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::UnknownFunction(name) if name.as_ref() == "frobnicate"
        ));
        assert_eq!(error.location().to_string(), "test.py:[2:1-2:10]");
        assert!(error.to_string().contains("frobnicate"));
    }

    #[test]
    fn builtins_depend_on_platform() {
        let source = "draw_text('hi', 1, 2)\n";

        let error = resolve_on(source, "desktop-process").unwrap_err();
        match error.as_ref() {
            SemanticError::UnavailableBuiltin {
                name,
                provider,
                active,
            } => {
                assert_eq!(name.as_ref(), "draw_text");
                assert_eq!(*provider, "console-md");
                assert_eq!(*active, "desktop-process");
            }

            other => panic!("unexpected {}", other),
        }

        let program = resolve_on(source, "console-md").unwrap();
        match &program.body[0] {
            ir::Statement::Expr(Expr {
                kind: ExprKind::Call {
                    target: Callee::Builtin(builtin),
                    ..
                },
                ..
            }) => assert_eq!(builtin.name, "draw_text"),

            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn user_functions_shadow_builtins() {
        let program = resolve("def print(x: int):\n    pass\nprint(3)\n").unwrap();
        assert!(matches!(
            &program.body[0],
            ir::Statement::Expr(Expr {
                kind: ExprKind::Call {
                    target: Callee::User(_),
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn conflicting_returns_name_both_locations() {
        let source = "def f(x: int):\n    if x:\n        return True\n    return 7\n";
        let error = reject(source);

        match error.as_ref() {
            SemanticError::ConflictingReturns {
                expected,
                found,
                first,
            } => {
                assert_eq!(*expected, Type::Bool);
                assert_eq!(*found, Type::Int);
                assert_eq!(first.start().line(), 3);
            }

            other => panic!("unexpected {}", other),
        }

        assert_eq!(error.location().start().line(), 4);
        assert!(error.to_string().contains("first return at test.py:[3:9"));
    }

    #[test]
    fn mixed_returns() {
        let error = reject("def f(x: int):\n    if x:\n        return\n    return 1\n");
        assert!(matches!(error.as_ref(), SemanticError::MixedReturns { .. }));
    }

    #[test]
    fn bool_is_accepted_where_int_is_expected() {
        resolve("def f(x: int) -> int:\n    return x\ny = f(True)\n").unwrap();

        let error = reject("def g(b: bool) -> bool:\n    return b\nz = g(1)\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ExpectedType(Type::Bool, Type::Int)
        ));
    }

    #[test]
    fn strings_are_opaque() {
        resolve("s = 'a'\nt: str = s\n").unwrap();

        let error = reject("s = 'a' + 'b'\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::UnsupportedOperand(operator, Type::Str) if operator == "+"
        ));

        let error = reject("if 'x':\n    pass\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ExpectedType(Type::Bool, Type::Str)
        ));
    }

    #[test]
    fn logical_operators_take_bools() {
        resolve("a = 1\nb = a > 0 and not a\n").unwrap();

        let error = reject("a = 1\nb = a and True\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ExpectedType(Type::Bool, Type::Int)
        ));
    }

    #[test]
    fn variables_keep_their_first_type() {
        let error = reject("x = 1\nx = 'a'\n");
        assert!(matches!(error.as_ref(), SemanticError::AssignmentType { .. }));

        resolve("x = 1\nx = True\n").unwrap();

        let error = reject("x: bool = 1\n");
        assert!(matches!(error.as_ref(), SemanticError::AssignmentType { .. }));
    }

    #[test]
    fn locals_follow_assignment_rule() {
        let program = resolve("x = 1\ndef f() -> int:\n    return x\n").unwrap();
        assert!(program.globals[0].read);

        let error = reject("x = 1\ndef f() -> int:\n    y = x\n    x = 2\n    return y\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ReadBeforeAssignment(name) if name.as_ref() == "x"
        ));

        let error = reject("def f() -> int:\n    return x\nx = 1\n");
        assert!(matches!(error.as_ref(), SemanticError::Undefined(_)));
    }

    #[test]
    fn function_layout() {
        let source = "def f(a: int, b: str) -> int:\n    c = a * 2\n    d = c\n    return c\n";
        let program = resolve(source).unwrap();
        let function = &program.functions[0];

        let parameters: Vec<_> = function
            .parameters
            .iter()
            .map(|p| (p.name.as_ref(), p.read))
            .collect();
        assert_eq!(parameters, [("a", true), ("b", false)]);

        let locals: Vec<_> = function
            .locals
            .iter()
            .map(|l| (l.name.as_ref(), l.read))
            .collect();
        assert_eq!(locals, [("c", true), ("d", false)]);
        assert_eq!(function.returns, Type::Int);
    }

    #[test]
    fn pending_return_types() {
        let error = reject("def f():\n    return g()\ndef g():\n    return 1\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::PendingReturnType(name) if name.as_ref() == "g"
        ));

        let error = reject("def f(n: int):\n    if n:\n        f(n - 1)\n    return 1\n");
        assert!(matches!(error.as_ref(), SemanticError::PendingReturnType(_)));

        let factorial = "\
def fact(n: int):
    if n <= 1:
        return 1
    return n * fact(n - 1)
";
        let program = resolve(factorial).unwrap();
        assert_eq!(program.functions[0].returns, Type::Int);

        resolve("def f() -> int:\n    return g()\ndef g() -> int:\n    return 1\n").unwrap();
    }

    #[test]
    fn missing_return() {
        let error = reject("def f(x: int) -> int:\n    if x:\n        return 1\n");
        assert!(matches!(error.as_ref(), SemanticError::MissingReturn(_)));

        resolve("def f() -> int:\n    while True:\n        pass\n").unwrap();
        resolve("def f(x: int) -> int:\n    if x:\n        return 1\n    else:\n        return 2\n")
            .unwrap();
    }

    #[test]
    fn declared_returns() {
        let error = reject("def f() -> int:\n    return\n");
        assert!(matches!(error.as_ref(), SemanticError::MissingReturnValue(Type::Int)));

        let error = reject("def f() -> None:\n    return 1\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ReturnType(Type::Void, Type::Int)
        ));

        let error = reject("def f() -> bool:\n    return 1\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ReturnType(Type::Bool, Type::Int)
        ));
    }

    #[test]
    fn structural_errors() {
        let error = reject("break\n");
        assert!(matches!(error.as_ref(), SemanticError::OutsideLoop("break")));

        let error = reject("def f():\n    def g():\n        pass\n");
        assert!(matches!(error.as_ref(), SemanticError::NestedFunction));

        let error = reject("def f(x):\n    pass\n");
        assert!(matches!(error.as_ref(), SemanticError::MissingAnnotation(_)));

        let error = reject("def f():\n    pass\ndef f():\n    pass\n");
        assert!(matches!(error.as_ref(), SemanticError::Redefinition(_)));

        let error = reject("def f(a: int, a: int):\n    pass\n");
        assert!(matches!(error.as_ref(), SemanticError::Redefinition(_)));
    }

    #[test]
    fn names_and_calls() {
        let error = reject("def f(a: int, b: str) -> bool:\n    return True\nx = f\n");
        assert!(matches!(error.as_ref(), SemanticError::NotAValue(..)));
        assert!(error.to_string().contains("`(int, str) -> bool`"));

        let error = reject("y = print\n");
        assert!(error.to_string().contains("`(str) -> None`"));

        let error = reject("x = 1\nx()\n");
        assert!(matches!(error.as_ref(), SemanticError::NotCallable(_)));

        let error = reject("def f():\n    pass\nx = f()\n");
        assert!(matches!(error.as_ref(), SemanticError::VoidValue(name) if name.as_ref() == "f"));

        let error = reject("def f(a: int):\n    pass\nf()\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ArgumentCount {
                expected: 1,
                found: 0,
                ..
            }
        ));

        let error = reject("print(1)\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ExpectedType(Type::Str, Type::Int)
        ));
    }

    #[test]
    fn completion_convention() {
        let program = resolve("x = 2\nreturn x * 3\n").unwrap();
        assert!(program.completion.is_some());

        let error = reject("return 1\nx = 2\n");
        assert!(matches!(error.as_ref(), SemanticError::CompletionNotLast));

        let error = reject("return 1\nreturn 2\n");
        assert!(matches!(error.as_ref(), SemanticError::MultipleCompletions { .. }));
        assert_eq!(error.location().start().line(), 2);

        let error = reject("if True:\n    return 1\n");
        assert!(matches!(error.as_ref(), SemanticError::NestedCompletion));

        let error = reject("return 'done'\n");
        assert!(matches!(
            error.as_ref(),
            SemanticError::ExpectedType(Type::Int, Type::Str)
        ));
    }

    #[test]
    fn implicit_main() {
        let program = resolve("def main():\n    return 5\n").unwrap();
        match &program.completion {
            Some(Expr {
                typ: Type::Int,
                kind: ExprKind::Call { .. },
                ..
            }) => (),
            other => panic!("unexpected {:?}", other),
        }

        let program = resolve("def main():\n    pass\n").unwrap();
        assert!(program.completion.is_none());
        assert!(matches!(program.body.last(), Some(ir::Statement::Expr(_))));

        let program = resolve("def main() -> int:\n    return 1\nmain()\n").unwrap();
        assert!(program.completion.is_none());
        assert_eq!(program.body.len(), 1);

        let program = resolve("def main(x: int) -> int:\n    return x\n").unwrap();
        assert!(program.completion.is_none());
        assert!(program.body.is_empty());
    }

    #[test]
    fn indirect_main_calls_disable_implicit_main() {
        let source = "def main():\n    print('m')\ndef go():\n    main()\ngo()\n";
        let program = resolve(source).unwrap();

        assert!(program.completion.is_none());
        assert_eq!(program.body.len(), 1);
        match &program.body[0] {
            ir::Statement::Expr(Expr {
                kind: ExprKind::Call {
                    target: Callee::User(name),
                    ..
                },
                ..
            }) => assert_eq!(name.as_ref(), "go"),
            other => panic!("unexpected {:?}", other),
        }

        let source = "def main() -> int:\n    return 1\ndef go() -> int:\n    return main()\n";
        let program = resolve(source).unwrap();
        assert!(program.completion.is_none());
    }

    #[test]
    fn helpers_are_recorded() {
        let program = resolve("x = 7 // 2\n").unwrap();
        assert_eq!(program.helpers, Helpers::FLOOR_DIV);

        let program = resolve("x = 7 % 2 + 1 // 1\n").unwrap();
        assert_eq!(program.helpers, Helpers::FLOOR_DIV | Helpers::MODULO);

        let program = resolve("x = 7 - 2\n").unwrap();
        assert!(program.helpers.is_empty());
    }
}
