//! Recursive-descent parser for Cb
//!
//! Declarations use C declarator syntax (parsed inside-out through a
//! small declarator mirror), expressions use an explicit precedence
//! cascade. On an unexpected token the parser reports
//! `file:line:col: error: ...` and recovers to the next `;` or block
//! boundary so several syntax errors surface in one run; the compile
//! still fails.
//!
//! `import foo.bar;` is resolved here: the loader locates `foo/bar.hb`,
//! the file is parsed with the same session state and its declarations
//! are merged into the current top-level list. A unit is loaded at most
//! once; reentry during its own load (a cycle) is a no-op.
//!
//! The parser tracks typedef names (shared across imported units) to
//! disambiguate declarations from expression statements, the classic
//! C ambiguity.

use crate::ast::*;
use crate::error::{Diagnostics, Location};
use crate::lexer::{Lexer, Token, TokenKind, TokenValue};
use crate::loader::{LoadOutcome, Loader};
use std::collections::HashSet;
use std::path::PathBuf;
use std::rc::Rc;

struct ParseError {
    location: Location,
    message: String,
}

type PResult<T> = Result<T, ParseError>;

/// Parse one compilation unit. Imports are resolved through `loader`;
/// syntax errors land in `diags` and an AST for the recoverable part is
/// still returned.
pub fn parse_unit(
    tokens: &[Token],
    file: Rc<PathBuf>,
    loader: &mut Loader,
    diags: &mut Diagnostics,
) -> Ast {
    let mut known_types = HashSet::new();
    let mut parser = Parser {
        tokens,
        pos: 0,
        file: file.clone(),
        loader,
        diags,
        known_types: &mut known_types,
    };
    let (imports, declarations) = parser.parse_compilation_unit();
    Ast {
        file,
        imports,
        declarations,
    }
}

/// Mirror of the C declarator grammar; applied inside-out against the
/// base type to produce the final [`TypeRef`].
enum Declarator {
    Name(Option<String>, Location),
    Pointer(Box<Declarator>),
    Array(Box<Declarator>, Option<Expr>),
    Func(Box<Declarator>, Vec<Param>, bool),
}

impl Declarator {
    /// A function declared directly on a name, possibly under pointer
    /// wrappers that belong to the return type (`int *f(void)`).
    /// Returns (pointer depth, name, location, params, variadic).
    fn function_parts(&self) -> Option<(usize, &str, &Location, &[Param], bool)> {
        let mut declarator = self;
        let mut depth = 0;
        loop {
            match declarator {
                Declarator::Pointer(inner) => {
                    depth += 1;
                    declarator = inner;
                }
                Declarator::Func(inner, params, variadic) => {
                    return match &**inner {
                        Declarator::Name(Some(name), location) => {
                            Some((depth, name, location, params, *variadic))
                        }
                        _ => None,
                    };
                }
                _ => return None,
            }
        }
    }
}

/// Wrap a return type in the pointer levels peeled off the declarator.
fn wrap_pointers(mut base: TypeRef, depth: usize) -> TypeRef {
    for _ in 0..depth {
        let location = base.location.clone();
        base = TypeRef::new(TypeRefKind::Pointer(Box::new(base)), location);
    }
    base
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    file: Rc<PathBuf>,
    loader: &'a mut Loader,
    diags: &'a mut Diagnostics,
    known_types: &'a mut HashSet<String>,
}

impl<'a> Parser<'a> {
    // ---- token plumbing ---------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn location(&self) -> Location {
        self.peek().location.clone()
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "expected {}, found '{}'",
                what,
                self.describe_current()
            )))
        }
    }

    fn describe_current(&self) -> String {
        let token = self.peek();
        match token.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::IntLiteral => token.text.clone(),
            TokenKind::StringLiteral => "string literal".to_string(),
            TokenKind::CharLiteral => "character literal".to_string(),
            _ => token.text.clone(),
        }
    }

    fn error_here(&self, message: String) -> ParseError {
        ParseError {
            location: self.location(),
            message,
        }
    }

    fn report(&mut self, error: ParseError) {
        self.diags.error(error.location, error.message);
    }

    /// Skip to the next statement terminator or block boundary.
    fn synchronize(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace | TokenKind::LBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Is the current token the start of a type (declaration context)?
    fn at_type_start(&self) -> bool {
        match self.kind() {
            TokenKind::Void
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Unsigned
            | TokenKind::Signed
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum => true,
            TokenKind::Ident => self.known_types.contains(&self.peek().text),
            _ => false,
        }
    }

    fn type_starts_at(&self, n: usize) -> bool {
        let token = self.peek_at(n);
        match token.kind {
            TokenKind::Void
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Unsigned
            | TokenKind::Signed
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum => true,
            TokenKind::Ident => self.known_types.contains(&token.text),
            _ => false,
        }
    }

    // ---- compilation unit -------------------------------------------

    fn parse_compilation_unit(&mut self) -> (Vec<String>, Vec<Declaration>) {
        let mut imports = Vec::new();
        let mut declarations = Vec::new();
        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Import) {
                match self.parse_import(&mut declarations) {
                    Ok(Some(name)) => imports.push(name),
                    Ok(None) => {}
                    Err(e) => {
                        self.report(e);
                        self.synchronize();
                    }
                }
                continue;
            }
            match self.parse_top_declaration() {
                Ok(mut decls) => declarations.append(&mut decls),
                Err(e) => {
                    self.report(e);
                    self.synchronize();
                    // a stray '}' at top level would loop forever
                    if self.check(TokenKind::RBrace) {
                        self.advance();
                    }
                }
            }
        }
        (imports, declarations)
    }

    fn parse_import(&mut self, declarations: &mut Vec<Declaration>) -> PResult<Option<String>> {
        let location = self.location();
        self.expect(TokenKind::Import, "'import'")?;
        let mut name = self.expect(TokenKind::Ident, "import name")?.text;
        while self.accept(TokenKind::Dot).is_some() {
            name.push('.');
            name.push_str(&self.expect(TokenKind::Ident, "import name")?.text);
        }
        self.expect(TokenKind::Semicolon, "';'")?;

        match self.loader.begin_load(&name) {
            LoadOutcome::Skip => Ok(None),
            LoadOutcome::NotFound => {
                self.diags.error(
                    location,
                    format!("cannot find import file for \"{}\"", name),
                );
                Ok(None)
            }
            LoadOutcome::Source { path, text } => {
                let sub_file = Rc::new(path);
                let sub_tokens = Lexer::new(sub_file.clone(), &text).lex(self.diags);
                let mut sub = Parser {
                    tokens: &sub_tokens,
                    pos: 0,
                    file: sub_file,
                    loader: &mut *self.loader,
                    diags: &mut *self.diags,
                    known_types: &mut *self.known_types,
                };
                let (_, mut decls) = sub.parse_compilation_unit();
                declarations.append(&mut decls);
                self.loader.end_load(&name);
                Ok(Some(name))
            }
        }
    }

    fn parse_top_declaration(&mut self) -> PResult<Vec<Declaration>> {
        match self.kind() {
            TokenKind::Typedef => Ok(vec![self.parse_typedef()?]),
            TokenKind::Const => Ok(vec![self.parse_constant()?]),
            TokenKind::Enum => Err(self.error_here("enum is not supported".to_string())),
            TokenKind::Struct if self.peek_at(2).kind == TokenKind::LBrace => {
                Ok(vec![self.parse_composite_def(true)?])
            }
            TokenKind::Union if self.peek_at(2).kind == TokenKind::LBrace => {
                Ok(vec![self.parse_composite_def(false)?])
            }
            _ => self.parse_variables_or_function(),
        }
    }

    fn parse_typedef(&mut self) -> PResult<Declaration> {
        let location = self.location();
        self.expect(TokenKind::Typedef, "'typedef'")?;
        let base = self.parse_type_specifier()?;
        let declarator = self.parse_declarator()?;
        let (name, name_loc, type_ref) = self.apply_declarator(declarator, base);
        let Some(name) = name else {
            return Err(ParseError {
                location: name_loc,
                message: "typedef requires a name".to_string(),
            });
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        self.known_types.insert(name.clone());
        Ok(Declaration::Typedef(TypedefDef {
            name,
            type_ref,
            location,
        }))
    }

    fn parse_constant(&mut self) -> PResult<Declaration> {
        let location = self.location();
        self.expect(TokenKind::Const, "'const'")?;
        let base = self.parse_type_specifier()?;
        let name = self.expect(TokenKind::Ident, "constant name")?.text;
        self.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_assignment()?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Declaration::Constant(ConstantDef {
            name,
            type_ref: base,
            value,
            location,
            entity: None,
        }))
    }

    fn parse_composite_def(&mut self, is_struct: bool) -> PResult<Declaration> {
        let location = self.location();
        self.advance(); // struct / union
        let name = self.expect(TokenKind::Ident, "tag name")?.text;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let base = self.parse_type_specifier()?;
            loop {
                let declarator = self.parse_declarator()?;
                let (member_name, member_loc, type_ref) = self.apply_declarator(declarator, base.clone());
                let Some(member_name) = member_name else {
                    return Err(ParseError {
                        location: member_loc,
                        message: "member requires a name".to_string(),
                    });
                };
                members.push(MemberDecl {
                    name: member_name,
                    type_ref,
                    location: member_loc,
                });
                if self.accept(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect(TokenKind::Semicolon, "';'")?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        let node = CompositeDefNode {
            name,
            members,
            location,
        };
        Ok(if is_struct {
            Declaration::StructDef(node)
        } else {
            Declaration::UnionDef(node)
        })
    }

    fn parse_storage(&mut self) -> Storage {
        if self.accept(TokenKind::Static).is_some() {
            Storage::Static
        } else if self.accept(TokenKind::Extern).is_some() {
            Storage::Extern
        } else {
            Storage::Auto
        }
    }

    fn parse_variables_or_function(&mut self) -> PResult<Vec<Declaration>> {
        let storage = self.parse_storage();
        let base = self.parse_type_specifier()?;
        let declarator = self.parse_declarator()?;

        // `T f(params) { ... }` is a function definition
        if let Some((depth, name, location, params, variadic)) = declarator.function_parts()
            && self.check(TokenKind::LBrace)
        {
            let name = name.to_string();
            let location = location.clone();
            let params = self.clone_params_checked(params)?;
            let body = self.parse_block()?;
            return Ok(vec![Declaration::DefinedFunction(FunctionDef {
                name,
                storage,
                return_type: wrap_pointers(base, depth),
                params,
                variadic,
                body,
                location,
                entity: None,
            })]);
        }

        let mut declarations = Vec::new();
        let mut declarator = Some(declarator);
        loop {
            let current = match declarator.take() {
                Some(d) => d,
                None => self.parse_declarator()?,
            };
            declarations.push(self.finish_declarator(current, base.clone(), storage)?);
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(declarations)
    }

    /// Prototype parameters become part of the declaration; parameter
    /// names inside them are kept for documentation but not required.
    fn clone_params_checked(&mut self, params: &[Param]) -> PResult<Vec<Param>> {
        let mut out = Vec::with_capacity(params.len());
        for p in params {
            out.push(Param {
                name: p.name.clone(),
                type_ref: p.type_ref.clone(),
                location: p.location.clone(),
                entity: None,
            });
        }
        Ok(out)
    }

    /// Turn one parsed declarator into a top-level declaration.
    fn finish_declarator(
        &mut self,
        declarator: Declarator,
        base: TypeRef,
        storage: Storage,
    ) -> PResult<Declaration> {
        // function prototype: the declarator is a function directly on a
        // name, with any pointer levels belonging to the return type
        if let Some((depth, name, location, params, variadic)) = declarator.function_parts() {
            let name = name.to_string();
            let location = location.clone();
            let params = self.clone_params_checked(params)?;
            return Ok(Declaration::UndefinedFunction(FunctionDecl {
                name,
                storage,
                return_type: wrap_pointers(base, depth),
                params,
                variadic,
                location,
                entity: None,
            }));
        }

        let (name, location, type_ref) = self.apply_declarator(declarator, base);
        let Some(name) = name else {
            return Err(ParseError {
                location,
                message: "declaration requires a name".to_string(),
            });
        };
        if storage == Storage::Extern {
            if self.check(TokenKind::Assign) {
                return Err(self.error_here("extern declaration cannot be initialized".to_string()));
            }
            return Ok(Declaration::UndefinedVariable(VariableDecl {
                name,
                type_ref,
                location,
                entity: None,
            }));
        }
        let initializer = if self.accept(TokenKind::Assign).is_some() {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        Ok(Declaration::DefinedVariable(VariableDef {
            name,
            storage,
            type_ref,
            initializer,
            location,
            entity: None,
        }))
    }

    // ---- types and declarators --------------------------------------

    fn parse_type_specifier(&mut self) -> PResult<TypeRef> {
        let location = self.location();
        let kind = match self.kind() {
            TokenKind::Void => {
                self.advance();
                TypeRefKind::Void
            }
            TokenKind::Struct => {
                self.advance();
                let tag = self.expect(TokenKind::Ident, "struct tag")?.text;
                TypeRefKind::Struct(tag)
            }
            TokenKind::Union => {
                self.advance();
                let tag = self.expect(TokenKind::Ident, "union tag")?.text;
                TypeRefKind::Union(tag)
            }
            TokenKind::Enum => {
                return Err(self.error_here("enum is not supported".to_string()));
            }
            TokenKind::Unsigned | TokenKind::Signed => {
                let signed = self.advance().kind == TokenKind::Signed;
                let kind = self.parse_int_kind().unwrap_or(IntSpec::Int);
                TypeRefKind::Integer { signed, kind }
            }
            TokenKind::Char | TokenKind::Short | TokenKind::Int | TokenKind::Long => {
                let kind = self.parse_int_kind().unwrap_or(IntSpec::Int);
                TypeRefKind::Integer { signed: true, kind }
            }
            TokenKind::Ident if self.known_types.contains(&self.peek().text) => {
                let name = self.advance().text;
                TypeRefKind::Named(name)
            }
            _ => {
                return Err(self.error_here(format!(
                    "expected type, found '{}'",
                    self.describe_current()
                )));
            }
        };
        Ok(TypeRef::new(kind, location))
    }

    fn parse_int_kind(&mut self) -> Option<IntSpec> {
        let kind = match self.kind() {
            TokenKind::Char => IntSpec::Char,
            TokenKind::Short => IntSpec::Short,
            TokenKind::Int => IntSpec::Int,
            TokenKind::Long => IntSpec::Long,
            _ => return None,
        };
        self.advance();
        // accept `short int` / `long int`
        if matches!(kind, IntSpec::Short | IntSpec::Long) {
            self.accept(TokenKind::Int);
        }
        Some(kind)
    }

    fn parse_declarator(&mut self) -> PResult<Declarator> {
        if self.accept(TokenKind::Star).is_some() {
            return Ok(Declarator::Pointer(Box::new(self.parse_declarator()?)));
        }
        self.parse_direct_declarator()
    }

    fn parse_direct_declarator(&mut self) -> PResult<Declarator> {
        let mut core = match self.kind() {
            TokenKind::Ident => {
                let token = self.advance();
                Declarator::Name(Some(token.text), token.location)
            }
            // `(*...)` introduces a nested (usually pointer) declarator
            TokenKind::LParen if self.peek_at(1).kind == TokenKind::Star => {
                self.advance();
                let inner = self.parse_declarator()?;
                self.expect(TokenKind::RParen, "')'")?;
                inner
            }
            _ => Declarator::Name(None, self.location()),
        };
        loop {
            if self.accept(TokenKind::LBracket).is_some() {
                let length = if self.check(TokenKind::RBracket) {
                    None
                } else {
                    Some(self.parse_conditional()?)
                };
                self.expect(TokenKind::RBracket, "']'")?;
                core = Declarator::Array(Box::new(core), length);
            } else if self.check(TokenKind::LParen) {
                let (params, variadic) = self.parse_params()?;
                core = Declarator::Func(Box::new(core), params, variadic);
            } else {
                break;
            }
        }
        Ok(core)
    }

    fn parse_params(&mut self) -> PResult<(Vec<Param>, bool)> {
        self.expect(TokenKind::LParen, "'('")?;
        if self.accept(TokenKind::RParen).is_some() {
            return Ok((Vec::new(), false));
        }
        // `(void)` means no parameters
        if self.check(TokenKind::Void) && self.peek_at(1).kind == TokenKind::RParen {
            self.advance();
            self.advance();
            return Ok((Vec::new(), false));
        }
        let mut params = Vec::new();
        let mut variadic = false;
        loop {
            if self.accept(TokenKind::Ellipsis).is_some() {
                variadic = true;
                break;
            }
            let location = self.location();
            let base = self.parse_type_specifier()?;
            let declarator = self.parse_declarator()?;
            let (name, _, type_ref) = self.apply_declarator(declarator, base);
            params.push(Param {
                name,
                type_ref,
                location,
                entity: None,
            });
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        if variadic && params.is_empty() {
            return Err(self.error_here("variadic function needs a named parameter".to_string()));
        }
        Ok((params, variadic))
    }

    /// Wrap `base` according to the declarator, inside-out.
    fn apply_declarator(
        &mut self,
        declarator: Declarator,
        base: TypeRef,
    ) -> (Option<String>, Location, TypeRef) {
        match declarator {
            Declarator::Name(name, location) => (name, location, base),
            Declarator::Pointer(inner) => {
                let location = base.location.clone();
                let wrapped = TypeRef::new(TypeRefKind::Pointer(Box::new(base)), location);
                self.apply_declarator(*inner, wrapped)
            }
            Declarator::Array(inner, length) => {
                let location = base.location.clone();
                let wrapped = TypeRef::new(
                    TypeRefKind::Array(Box::new(base), length.map(Box::new)),
                    location,
                );
                self.apply_declarator(*inner, wrapped)
            }
            Declarator::Func(inner, params, variadic) => {
                let location = base.location.clone();
                let param_types = params.into_iter().map(|p| p.type_ref).collect();
                let wrapped = TypeRef::new(
                    TypeRefKind::Function {
                        ret: Box::new(base),
                        params: param_types,
                        variadic,
                    },
                    location,
                );
                self.apply_declarator(*inner, wrapped)
            }
        }
    }

    /// Abstract type name, as used by casts and `sizeof(type)`.
    fn parse_type_name(&mut self) -> PResult<TypeRef> {
        let base = self.parse_type_specifier()?;
        let declarator = self.parse_declarator()?;
        let (name, location, type_ref) = self.apply_declarator(declarator, base);
        if name.is_some() {
            return Err(ParseError {
                location,
                message: "unexpected name in type".to_string(),
            });
        }
        Ok(type_ref)
    }

    // ---- statements -------------------------------------------------

    fn parse_block(&mut self) -> PResult<Stmt> {
        let location = self.location();
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            match self.parse_block_item() {
                Ok(mut items) => stmts.append(&mut items),
                Err(e) => {
                    self.report(e);
                    self.synchronize();
                    if self.check(TokenKind::LBrace) {
                        self.advance();
                    }
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Stmt::new(StmtKind::Block(stmts), location))
    }

    fn parse_block_item(&mut self) -> PResult<Vec<Stmt>> {
        match self.kind() {
            TokenKind::Typedef => Err(self.error_here(
                "typedef is only allowed at top level".to_string(),
            )),
            TokenKind::Const => Err(self.error_here(
                "constant definitions are only allowed at top level".to_string(),
            )),
            TokenKind::Struct | TokenKind::Union
                if self.peek_at(2).kind == TokenKind::LBrace =>
            {
                Err(self.error_here(
                    "struct/union definitions are only allowed at top level".to_string(),
                ))
            }
            TokenKind::Static | TokenKind::Extern => self.parse_local_variables(),
            _ if self.at_type_start() => self.parse_local_variables(),
            _ => Ok(vec![self.parse_stmt()?]),
        }
    }

    fn parse_local_variables(&mut self) -> PResult<Vec<Stmt>> {
        let storage = self.parse_storage();
        let base = self.parse_type_specifier()?;
        let mut stmts = Vec::new();
        loop {
            let declarator = self.parse_declarator()?;
            if declarator.function_parts().is_some() {
                return Err(self.error_here(
                    "function declarations are only allowed at top level".to_string(),
                ));
            }
            let (name, location, type_ref) = self.apply_declarator(declarator, base.clone());
            let Some(name) = name else {
                return Err(ParseError {
                    location,
                    message: "declaration requires a name".to_string(),
                });
            };
            let initializer = if self.accept(TokenKind::Assign).is_some() {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            stmts.push(Stmt::new(
                StmtKind::LocalVar(VariableDef {
                    name,
                    storage,
                    type_ref,
                    initializer,
                    location: location.clone(),
                    entity: None,
                }),
                location,
            ));
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let location = self.location();
        match self.kind() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::new(StmtKind::Empty, location))
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::new(StmtKind::Return(value), location))
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::new(StmtKind::Break, location))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::new(StmtKind::Continue, location))
            }
            TokenKind::Goto => {
                self.advance();
                let name = self.expect(TokenKind::Ident, "label name")?.text;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::new(StmtKind::Goto(name), location))
            }
            TokenKind::Ident if self.peek_at(1).kind == TokenKind::Colon => {
                let name = self.advance().text;
                self.advance(); // ':'
                let stmt = self.parse_stmt()?;
                Ok(Stmt::new(
                    StmtKind::Label {
                        name,
                        stmt: Box::new(stmt),
                    },
                    location,
                ))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::new(StmtKind::Expr(expr), location))
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let location = self.location();
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then = Box::new(self.parse_stmt()?);
        let els = if self.accept(TokenKind::Else).is_some() {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::new(StmtKind::If { cond, then, els }, location))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let location = self.location();
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::new(StmtKind::While { cond, body }, location))
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let location = self.location();
        self.expect(TokenKind::Do, "'do'")?;
        let body = Box::new(self.parse_stmt()?);
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::new(StmtKind::DoWhile { body, cond }, location))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let location = self.location();
        self.expect(TokenKind::For, "'for'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let init = if self.accept(TokenKind::Semicolon).is_some() {
            None
        } else if self.at_type_start() {
            let base = self.parse_type_specifier()?;
            let declarator = self.parse_declarator()?;
            let (name, var_loc, type_ref) = self.apply_declarator(declarator, base);
            let Some(name) = name else {
                return Err(ParseError {
                    location: var_loc,
                    message: "declaration requires a name".to_string(),
                });
            };
            let initializer = if self.accept(TokenKind::Assign).is_some() {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            self.expect(TokenKind::Semicolon, "';'")?;
            Some(ForInit::Var(Box::new(VariableDef {
                name,
                storage: Storage::Auto,
                type_ref,
                initializer,
                location: var_loc,
                entity: None,
            })))
        } else {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            Some(ForInit::Expr(expr))
        };
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::new(
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
            location,
        ))
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let location = self.location();
        self.expect(TokenKind::Switch, "'switch'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut clauses = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            if !self.check(TokenKind::Case) && !self.check(TokenKind::Default) {
                let error = self.error_here("expected 'case' or 'default'".to_string());
                self.report(error);
                self.synchronize();
                continue;
            }
            let clause_loc = self.location();
            let mut values = Vec::new();
            let mut is_default = false;
            loop {
                if self.accept(TokenKind::Case).is_some() {
                    values.push(self.parse_conditional()?);
                    self.expect(TokenKind::Colon, "':'")?;
                } else if self.accept(TokenKind::Default).is_some() {
                    is_default = true;
                    self.expect(TokenKind::Colon, "':'")?;
                } else {
                    break;
                }
            }
            let mut body = Vec::new();
            while !matches!(
                self.kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
            ) {
                let mut items = self.parse_block_item()?;
                body.append(&mut items);
            }
            clauses.push(CaseClause {
                values,
                is_default,
                body,
                location: clause_loc,
            });
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Stmt::new(StmtKind::Switch { cond, clauses }, location))
    }

    // ---- expressions ------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_assignment()?;
        while self.check(TokenKind::Comma) {
            let location = self.advance().location;
            let rhs = self.parse_assignment()?;
            expr = Expr::new(
                ExprKind::Comma {
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                },
                location,
            );
        }
        Ok(expr)
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_conditional()?;
        let op = match self.kind() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            TokenKind::AmpAssign => Some(BinaryOp::BitAnd),
            TokenKind::PipeAssign => Some(BinaryOp::BitOr),
            TokenKind::CaretAssign => Some(BinaryOp::BitXor),
            TokenKind::ShlAssign => Some(BinaryOp::Shl),
            TokenKind::ShrAssign => Some(BinaryOp::Shr),
            _ => return Ok(lhs),
        };
        let location = self.advance().location;
        let rhs = self.parse_assignment()?;
        let kind = match op {
            None => ExprKind::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            Some(op) => ExprKind::OpAssign {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        };
        Ok(Expr::new(kind, location))
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.check(TokenKind::Question) {
            return Ok(cond);
        }
        let location = self.advance().location;
        let then = self.parse_expr()?;
        self.expect(TokenKind::Colon, "':'")?;
        let els = self.parse_conditional()?;
        Ok(Expr::new(
            ExprKind::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            location,
        ))
    }

    /// Binary operator for the current token at `level`, if any.
    fn binary_op_at(&self, level: usize) -> Option<BinaryOp> {
        const LEVELS: [&[(TokenKind, BinaryOp)]; 10] = [
            &[(TokenKind::PipePipe, BinaryOp::LogicalOr)],
            &[(TokenKind::AmpAmp, BinaryOp::LogicalAnd)],
            &[(TokenKind::Pipe, BinaryOp::BitOr)],
            &[(TokenKind::Caret, BinaryOp::BitXor)],
            &[(TokenKind::Amp, BinaryOp::BitAnd)],
            &[
                (TokenKind::EqEq, BinaryOp::Eq),
                (TokenKind::BangEq, BinaryOp::NotEq),
            ],
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::LtEq, BinaryOp::LtEq),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::GtEq, BinaryOp::GtEq),
            ],
            &[
                (TokenKind::Shl, BinaryOp::Shl),
                (TokenKind::Shr, BinaryOp::Shr),
            ],
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
        ];
        LEVELS[level]
            .iter()
            .find(|(kind, _)| *kind == self.kind())
            .map(|&(_, op)| op)
    }

    /// Precedence cascade, lowest level 0 (`||`) to highest level 9
    /// (`* / %`); one recursive body instead of ten copies.
    fn parse_binary(&mut self, level: usize) -> PResult<Expr> {
        if level > 9 {
            return self.parse_cast_expr();
        }
        let mut lhs = self.parse_binary(level + 1)?;
        while let Some(op) = self.binary_op_at(level) {
            let location = self.advance().location;
            let rhs = self.parse_binary(level + 1)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                location,
            );
        }
        Ok(lhs)
    }

    fn parse_cast_expr(&mut self) -> PResult<Expr> {
        if self.check(TokenKind::LParen) && self.type_starts_at(1) {
            let location = self.location();
            self.advance();
            let type_ref = self.parse_type_name()?;
            self.expect(TokenKind::RParen, "')'")?;
            let expr = self.parse_cast_expr()?;
            return Ok(Expr::new(
                ExprKind::Cast {
                    type_ref: Some(type_ref),
                    expr: Box::new(expr),
                },
                location,
            ));
        }
        self.parse_unary()
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let location = self.location();
        let kind = match self.kind() {
            TokenKind::PlusPlus => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::PreInc,
                    expr: Box::new(self.parse_unary()?),
                }
            }
            TokenKind::MinusMinus => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::PreDec,
                    expr: Box::new(self.parse_unary()?),
                }
            }
            TokenKind::Plus => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::Plus,
                    expr: Box::new(self.parse_cast_expr()?),
                }
            }
            TokenKind::Minus => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::Minus,
                    expr: Box::new(self.parse_cast_expr()?),
                }
            }
            TokenKind::Bang => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(self.parse_cast_expr()?),
                }
            }
            TokenKind::Tilde => {
                self.advance();
                ExprKind::Unary {
                    op: UnaryOp::BitNot,
                    expr: Box::new(self.parse_cast_expr()?),
                }
            }
            TokenKind::Star => {
                self.advance();
                ExprKind::Deref(Box::new(self.parse_cast_expr()?))
            }
            TokenKind::Amp => {
                self.advance();
                ExprKind::Addr(Box::new(self.parse_cast_expr()?))
            }
            TokenKind::Sizeof => {
                self.advance();
                if self.check(TokenKind::LParen) && self.type_starts_at(1) {
                    self.advance();
                    let type_ref = self.parse_type_name()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    ExprKind::SizeofType(type_ref)
                } else {
                    ExprKind::SizeofExpr(Box::new(self.parse_unary()?))
                }
            }
            _ => return self.parse_postfix(),
        };
        Ok(Expr::new(kind, location))
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let location = self.location();
            match self.kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::new(
                        ExprKind::ArrayRef {
                            expr: Box::new(expr),
                            index: Box::new(index),
                        },
                        location,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect(TokenKind::Ident, "member name")?.text;
                    expr = Expr::new(
                        ExprKind::Member {
                            expr: Box::new(expr),
                            name,
                        },
                        location,
                    );
                }
                TokenKind::Arrow => {
                    self.advance();
                    let name = self.expect(TokenKind::Ident, "member name")?.text;
                    expr = Expr::new(
                        ExprKind::PtrMember {
                            expr: Box::new(expr),
                            name,
                        },
                        location,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_assignment()?);
                            if self.accept(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    expr = Expr::new(
                        ExprKind::FunCall {
                            callee: Box::new(expr),
                            args,
                        },
                        location,
                    );
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::Unary {
                            op: UnaryOp::PostInc,
                            expr: Box::new(expr),
                        },
                        location,
                    );
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::Unary {
                            op: UnaryOp::PostDec,
                            expr: Box::new(expr),
                        },
                        location,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let location = self.location();
        match self.kind() {
            TokenKind::IntLiteral => {
                let token = self.advance();
                let (value, unsigned, long) = match token.value {
                    TokenValue::Int {
                        value,
                        unsigned,
                        long,
                    } => (value as i64, unsigned, long),
                    _ => (0, false, false),
                };
                Ok(Expr::new(
                    ExprKind::IntLiteral {
                        value,
                        unsigned,
                        long,
                    },
                    location,
                ))
            }
            TokenKind::CharLiteral => {
                let token = self.advance();
                let value = match token.value {
                    TokenValue::Char(c) => c,
                    _ => 0,
                };
                Ok(Expr::new(ExprKind::CharLiteral(value), location))
            }
            TokenKind::StringLiteral => {
                let token = self.advance();
                let bytes = match token.value {
                    TokenValue::Str(bytes) => bytes,
                    _ => Vec::new(),
                };
                Ok(Expr::new(ExprKind::StringLiteral(bytes), location))
            }
            TokenKind::Ident => {
                let token = self.advance();
                Ok(Expr::new(
                    ExprKind::VarRef {
                        name: token.text,
                        entity: None,
                    },
                    location,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error_here(format!(
                "unexpected token '{}'",
                self.describe_current()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_source(source: &str) -> (Ast, Diagnostics) {
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(Vec::new());
        let ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        (ast, diags)
    }

    fn parse_ok(source: &str) -> Ast {
        let (ast, diags) = parse_source(source);
        let messages: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert!(!diags.has_errors(), "unexpected errors: {:?}", messages);
        ast
    }

    fn main_body(ast: &Ast) -> &Vec<Stmt> {
        let main = ast.defined_function("main").expect("no main");
        match &main.body.kind {
            StmtKind::Block(stmts) => stmts,
            _ => panic!("main body is not a block"),
        }
    }

    #[test]
    fn test_minimal_main() {
        let ast = parse_ok("int main(void) { return 0; }");
        let main = ast.defined_function("main").unwrap();
        assert!(main.params.is_empty());
        assert!(!main.variadic);
    }

    #[test]
    fn test_precedence() {
        let ast = parse_ok("int main(void) { return 1+2*3; }");
        let body = main_body(&ast);
        let StmtKind::Return(Some(expr)) = &body[0].kind else {
            panic!("expected return");
        };
        let ExprKind::Binary { op: BinaryOp::Add, rhs, .. } = &expr.kind else {
            panic!("expected + at the top");
        };
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary { op: BinaryOp::Mul, .. }
        ));
    }

    #[test]
    fn test_declarators() {
        let ast = parse_ok("int x; int *p; int a[3]; int (*f)(int); char *argv[10];");
        let kinds: Vec<&TypeRefKind> = ast
            .declarations
            .iter()
            .map(|d| match d {
                Declaration::DefinedVariable(v) => &v.type_ref.kind,
                _ => panic!("expected variables"),
            })
            .collect();
        assert!(matches!(kinds[0], TypeRefKind::Integer { .. }));
        assert!(matches!(kinds[1], TypeRefKind::Pointer(_)));
        assert!(matches!(kinds[2], TypeRefKind::Array(..)));
        // (*f)(int): pointer to function
        match kinds[3] {
            TypeRefKind::Pointer(inner) => {
                assert!(matches!(inner.kind, TypeRefKind::Function { .. }))
            }
            other => panic!("expected pointer to function, got {:?}", other),
        }
        // *argv[10]: array of pointer
        match kinds[4] {
            TypeRefKind::Array(inner, _) => {
                assert!(matches!(inner.kind, TypeRefKind::Pointer(_)))
            }
            other => panic!("expected array of pointer, got {:?}", other),
        }
    }

    #[test]
    fn test_prototype_and_variadic() {
        let ast = parse_ok("int printf(char* fmt, ...); extern int errno;");
        match &ast.declarations[0] {
            Declaration::UndefinedFunction(f) => {
                assert_eq!(f.name, "printf");
                assert!(f.variadic);
                assert_eq!(f.params.len(), 1);
            }
            other => panic!("expected prototype, got {:?}", other),
        }
        assert!(matches!(
            ast.declarations[1],
            Declaration::UndefinedVariable(_)
        ));
    }

    #[test]
    fn test_struct_def_and_use() {
        let ast = parse_ok("struct point { int x; int y; }; int main(void) { struct point p; p.x = 1; return p.x; }");
        match &ast.declarations[0] {
            Declaration::StructDef(def) => {
                assert_eq!(def.name, "point");
                assert_eq!(def.members.len(), 2);
            }
            other => panic!("expected struct def, got {:?}", other),
        }
    }

    #[test]
    fn test_typedef_changes_parsing() {
        let ast = parse_ok("typedef int myint; int main(void) { myint x; x = 1; return x; }");
        let body = main_body(&ast);
        assert!(matches!(body[0].kind, StmtKind::LocalVar(_)));
    }

    #[test]
    fn test_dangling_else_binds_inner() {
        let ast = parse_ok("int main(void) { if (1) if (0) return 1; else return 2; return 3; }");
        let body = main_body(&ast);
        let StmtKind::If { els, then, .. } = &body[0].kind else {
            panic!("expected if");
        };
        assert!(els.is_none());
        assert!(matches!(then.kind, StmtKind::If { .. }));
    }

    #[test]
    fn test_switch_clauses() {
        let ast = parse_ok(
            "int main(void) { switch (1) { case 1: case 2: return 1; default: return 0; } }",
        );
        let body = main_body(&ast);
        let StmtKind::Switch { clauses, .. } = &body[0].kind else {
            panic!("expected switch");
        };
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].values.len(), 2);
        assert!(clauses[1].is_default);
    }

    #[test]
    fn test_cast_vs_paren() {
        let ast = parse_ok("int main(void) { int x; x = (int)'a'; x = (x) + 1; return x; }");
        let body = main_body(&ast);
        let StmtKind::Expr(e) = &body[1].kind else { panic!() };
        let ExprKind::Assign { rhs, .. } = &e.kind else { panic!() };
        assert!(matches!(rhs.kind, ExprKind::Cast { .. }));
        let StmtKind::Expr(e) = &body[2].kind else { panic!() };
        let ExprKind::Assign { rhs, .. } = &e.kind else { panic!() };
        assert!(matches!(rhs.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_sizeof_forms() {
        let ast = parse_ok("int main(void) { int x; return sizeof(int) + sizeof x; }");
        let body = main_body(&ast);
        let StmtKind::Return(Some(expr)) = &body[1].kind else { panic!() };
        let ExprKind::Binary { lhs, rhs, .. } = &expr.kind else { panic!() };
        assert!(matches!(lhs.kind, ExprKind::SizeofType(_)));
        assert!(matches!(rhs.kind, ExprKind::SizeofExpr(_)));
    }

    #[test]
    fn test_error_recovery_reports_multiple() {
        let (_, diags) = parse_source("int main(void) { return 1 +; int y = ]; return 0; }");
        assert!(diags.has_errors());
        assert!(diags.error_count() >= 2);
    }

    #[test]
    fn test_enum_is_rejected() {
        let (_, diags) = parse_source("enum color { RED };");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message.contains("not supported")));
    }

    #[test]
    fn test_import_merges_declarations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("stdio.hb"),
            "int printf(char* fmt, ...);\n",
        )
        .unwrap();
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let source = "import stdio; int main(void) { return 0; }";
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(vec![dir.path().to_path_buf()]);
        let ast = parse_unit(&tokens, file, &mut loader, &mut diags);
        assert!(!diags.has_errors());
        assert_eq!(ast.imports, vec!["stdio"]);
        assert!(matches!(
            ast.declarations[0],
            Declaration::UndefinedFunction(_)
        ));
        assert!(ast.defined_function("main").is_some());
    }

    #[test]
    fn test_import_typedef_is_visible() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("types.hb"), "typedef unsigned long size_t;\n").unwrap();
        let mut diags = Diagnostics::new();
        let file = Rc::new(PathBuf::from("t.cb"));
        let source = "import types; int main(void) { size_t n; n = 1; return 0; }";
        let tokens = Lexer::new(file.clone(), source).lex(&mut diags);
        let mut loader = Loader::new(vec![dir.path().to_path_buf()]);
        parse_unit(&tokens, file, &mut loader, &mut diags);
        let messages: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert!(!diags.has_errors(), "unexpected errors: {:?}", messages);
    }

    #[test]
    fn test_for_with_declaration() {
        let ast = parse_ok("int main(void) { int s; s = 0; for (int i = 0; i < 4; ++i) s += i; return s; }");
        let body = main_body(&ast);
        let StmtKind::For { init, .. } = &body[2].kind else { panic!() };
        assert!(matches!(init, Some(ForInit::Var(_))));
    }

    #[test]
    fn test_label_and_goto() {
        let ast = parse_ok("int main(void) { goto done; done: return 0; }");
        let body = main_body(&ast);
        assert!(matches!(body[0].kind, StmtKind::Goto(_)));
        assert!(matches!(body[1].kind, StmtKind::Label { .. }));
    }
}
