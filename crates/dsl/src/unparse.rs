//! Render an expression back to surface syntax.
//!
//! Compound operands are always parenthesized, so the output is longer than
//! the original source but reparses to a structurally identical tree:
//! `parse_expression(&unparse(e)) == e` for any parser-produced expression.

use crate::ast::{BinaryOp, Expr, Literal, MacroArg, UnaryOp};

const KEYWORDS: &[&str] = &[
    "module", "export", "argument", "const", "import", "from", "as", "await", "if", "where",
    "list", "object", "and", "or", "not", "true", "false",
];

/// Render an expression to parseable source text.
pub fn unparse(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(expr, &mut out);
    out
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Literal(lit) => write_literal(lit, out),
        Expr::Identifier(name) => write_name(name, out),
        Expr::Access { value, member } => {
            write_operand(value, out);
            out.push('.');
            write_name(member, out);
        }
        Expr::Invoke { callee, args } => {
            write_operand(callee, out);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(arg, out);
            }
            out.push(')');
        }
        Expr::Binary { op, left, right } => {
            write_operand(left, out);
            out.push(' ');
            out.push_str(binary_symbol(*op));
            out.push(' ');
            write_operand(right, out);
        }
        Expr::Unary { op, operand } => {
            out.push_str(match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "not ",
                UnaryOp::Await => "await ",
            });
            write_operand(operand, out);
        }
        Expr::Block(exprs) => {
            out.push('(');
            for (i, e) in exprs.iter().enumerate() {
                if i > 0 {
                    out.push_str("; ");
                }
                write_expr(e, out);
            }
            out.push(')');
        }
        Expr::Macro { name, args } => {
            out.push_str(name.keyword());
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match arg {
                    MacroArg::Positional(e) => write_expr(e, out),
                    MacroArg::Named { name, value } => {
                        write_name(name, out);
                        out.push_str(" = ");
                        write_expr(value, out);
                    }
                }
            }
            out.push(')');
        }
    }
}

/// Write an operand, parenthesizing compound expressions.
fn write_operand(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Binary { .. } | Expr::Unary { .. } => {
            out.push('(');
            write_expr(expr, out);
            out.push(')');
        }
        _ => write_expr(expr, out),
    }
}

fn write_literal(lit: &Literal, out: &mut String) {
    match lit {
        Literal::Number(n) => out.push_str(&n.to_string()),
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Text(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if c.is_control() => {
                        out.push_str(&format!("\\u{{{:04X}}}", c as u32));
                    }
                    c => out.push(c),
                }
            }
            out.push('"');
        }
    }
}

/// Write a name, quoting it when it is not a bare identifier.
fn write_name(name: &str, out: &mut String) {
    let bare = !name.is_empty()
        && !KEYWORDS.contains(&name)
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if bare {
        out.push_str(name);
    } else {
        out.push('\'');
        out.push_str(name);
        out.push('\'');
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "or",
        BinaryOp::And => "and",
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Concat => "&",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "^",
    }
}
