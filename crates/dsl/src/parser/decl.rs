//! Declaration parsers - programs, modules, imports and formulas.

use crate::ast::{
    ArgumentDecl, ConstantDecl, Expr, FormulaDecl, ImportDecl, ImportKind, Literal, ModuleDecl,
    Program, Spanned, UnaryOp,
};
use crate::lexer::Token;
use crate::parser::{ParseError, TokenStream, expr};

/// Parse a whole program: `(ArgumentDecl | ConstantDecl | Module)*`.
pub(crate) fn parse_program(stream: &mut TokenStream) -> Result<Program, ParseError> {
    let mut program = Program::default();

    while !stream.at_end() {
        match stream.peek() {
            Some(Token::Argument) => {
                stream.advance();
                let name = parse_name(stream)?;
                program.arguments.push(ArgumentDecl { name });
            }
            Some(Token::Const) => {
                stream.advance();
                let name = parse_name(stream)?;
                stream.expect(Token::Eq)?;
                let value = parse_literal(stream)?;
                program.constants.push(ConstantDecl { name, value });
            }
            Some(Token::Module) => {
                program.modules.push(parse_module(stream)?);
            }
            found => {
                return Err(ParseError::expected(
                    "declaration (argument, const or module)",
                    found.cloned(),
                    stream.position(),
                ));
            }
        }
    }

    Ok(program)
}

/// Parse `module Name { Import* Formula* }`.
fn parse_module(stream: &mut TokenStream) -> Result<ModuleDecl, ParseError> {
    stream.expect(Token::Module)?;
    let name = parse_name(stream)?;
    stream.expect(Token::LBrace)?;

    let mut imports = Vec::new();
    while stream.check(&Token::Import) {
        imports.push(parse_import(stream)?);
    }

    let mut formulas = Vec::new();
    while !stream.check(&Token::RBrace) {
        formulas.push(parse_formula(stream)?);
    }
    stream.expect(Token::RBrace)?;

    Ok(ModuleDecl {
        name,
        imports,
        formulas,
    })
}

/// Parse an import declaration.
///
/// Forms: `import module M`, `import argument A`, `import const C`, and
/// `import F from M` (formula), each with an optional `as alias`.
fn parse_import(stream: &mut TokenStream) -> Result<ImportDecl, ParseError> {
    stream.expect(Token::Import)?;

    let (kind, path, default_local) = match stream.peek() {
        Some(Token::Module) => {
            stream.advance();
            let target = parse_name(stream)?;
            (ImportKind::Module, vec![target.node.clone()], target)
        }
        Some(Token::Argument) => {
            stream.advance();
            let target = parse_name(stream)?;
            (ImportKind::Argument, vec![target.node.clone()], target)
        }
        Some(Token::Const) => {
            stream.advance();
            let target = parse_name(stream)?;
            (ImportKind::Constant, vec![target.node.clone()], target)
        }
        Some(Token::Ident(_)) => {
            let target = parse_name(stream)?;
            stream.expect(Token::From)?;
            let (module, _) = stream.expect_ident("module name")?;
            (
                ImportKind::Formula,
                vec![module, target.node.clone()],
                target,
            )
        }
        found => {
            return Err(ParseError::expected(
                "import target",
                found.cloned(),
                stream.position(),
            ));
        }
    };

    let local_name = if stream.check(&Token::As) {
        stream.advance();
        parse_name(stream)?
    } else {
        default_local
    };

    Ok(ImportDecl {
        local_name,
        path,
        kind,
    })
}

/// Parse `[export] Name = Expression`.
fn parse_formula(stream: &mut TokenStream) -> Result<FormulaDecl, ParseError> {
    let is_exported = stream.check(&Token::Export);
    if is_exported {
        stream.advance();
    }

    let name = parse_name(stream)?;
    stream.expect(Token::Eq)?;
    let body = expr::parse_expr(stream)?;

    Ok(FormulaDecl {
        name,
        body,
        is_exported,
    })
}

/// Parse a declaration name (bare or quoted identifier) with its span.
fn parse_name(stream: &mut TokenStream) -> Result<Spanned<String>, ParseError> {
    let (name, span) = stream.expect_ident("name")?;
    Ok(Spanned::new(name, span))
}

/// Parse a constant literal, allowing a leading `-` on numbers.
fn parse_literal(stream: &mut TokenStream) -> Result<Literal, ParseError> {
    let position = stream.position();
    let expr = expr::parse_expr(stream)?;
    match expr {
        Expr::Literal(lit) => Ok(lit),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => match *operand {
            Expr::Literal(Literal::Number(n)) => Ok(Literal::Number(-n)),
            _ => Err(ParseError::invalid_syntax(
                "constant value must be a literal",
                position,
            )),
        },
        _ => Err(ParseError::invalid_syntax(
            "constant value must be a literal",
            position,
        )),
    }
}
