//! Expression tree walking.
//!
//! A single depth-first traversal shared by every analysis pass: the
//! visitor is called on the way in and on the way out of each node, with
//! children visited left-to-right in between.

use crate::ast::Expr;

/// Callbacks for a depth-first walk over an expression tree.
///
/// Both methods default to no-ops so a pass only implements the hook it
/// needs. Visitors own their state; nothing is threaded through the walk.
pub trait ExprVisitor {
    fn on_enter(&mut self, _expr: &Expr) {}
    fn on_exit(&mut self, _expr: &Expr) {}
}

/// Walk an expression tree depth-first.
///
/// Order: enter node, walk each child left-to-right recursively, exit node.
pub fn walk_expr<V>(expr: &Expr, visitor: &mut V)
where
    V: ExprVisitor + ?Sized,
{
    visitor.on_enter(expr);
    for child in expr.children() {
        walk_expr(child, visitor);
    }
    visitor.on_exit(expr);
}
