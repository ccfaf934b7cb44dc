//! Lowering from the external parser's tree to the owned evaluator AST.
//!
//! The parser is an external collaborator: any ES5-compliant parser would do,
//! and we use oxc. Its tree borrows from an arena, so this module converts the
//! parts we execute into the `Rc`-shared nodes of [`crate::ast`] and rejects
//! everything outside the ES5 subset with a `SyntaxError`. The evaluator
//! depends on the parser only through [`parse_program`] and
//! [`parse_function_literal`].

use std::rc::Rc;

use oxc_allocator::Allocator;
use oxc_ast::ast;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::operator::{AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator};

use crate::{
    ast::{
        AssignOp, BinaryOp, CatchClause, Expr, ExprKind, ExprNode, ForInTarget, ForInit, FunctionNode, LogicalOp,
        ObjectProp, PropKind, PropRef, Span, Stmt, StmtKind, StmtNode, SwitchCase, UnaryOp, UpdateOp, VarDeclarator,
    },
    error::{CodeLoc, Exception},
    value::number_to_string,
};

/// A lowered program.
#[derive(Debug)]
pub(crate) struct ParsedProgram {
    pub body: Vec<Stmt>,
    /// Whether the program prologue carries a `"use strict"` directive.
    pub strict: bool,
}

/// Parses a whole program into the owned ES5 tree.
///
/// With `strip_spans` set, every lowered node carries no span; the driver uses
/// span-less nodes to recognize polyfill code it should step past.
pub(crate) fn parse_program(source: &str, strip_spans: bool) -> Result<ParsedProgram, Exception> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(err) = ret.errors.first() {
        return Err(Exception::syntax_error(err.to_string()));
    }
    let program = ret.program;
    let strict = has_use_strict(&program.directives);
    let lowerer = Lowerer {
        source,
        strip: strip_spans,
    };
    let body = program
        .body
        .iter()
        .map(|stmt| lowerer.stmt(stmt))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedProgram { body, strict })
}

/// Parses an internally generated `(function(...){...})` snippet and returns
/// its function literal. Used by the `Function` constructor.
pub(crate) fn parse_function_literal(source: &str) -> Result<Rc<FunctionNode>, Exception> {
    let program = parse_program(source, false)?;
    if let [stmt] = program.body.as_slice()
        && let StmtKind::Expression(expr) = &stmt.kind
        && let ExprKind::Function(node) = &expr.kind
    {
        return Ok(Rc::clone(node));
    }
    Err(Exception::syntax_error("expected a single function literal"))
}

fn has_use_strict(directives: &[ast::Directive<'_>]) -> bool {
    directives.iter().any(|d| d.directive.as_str() == "use strict")
}

fn unsupported(what: &str, source: &str, offset: u32) -> Exception {
    Exception::syntax_error(format!("{what} is not supported")).with_loc(Some(CodeLoc::from_offset(source, offset)))
}

struct Lowerer<'s> {
    source: &'s str,
    strip: bool,
}

impl Lowerer<'_> {
    fn span(&self, span: oxc_span::Span) -> Option<Span> {
        if self.strip {
            None
        } else {
            Some(Span::new(span.start, span.end))
        }
    }

    fn stmt_node(&self, span: oxc_span::Span, kind: StmtKind) -> Stmt {
        Rc::new(StmtNode {
            span: self.span(span),
            kind,
        })
    }

    fn expr_node(&self, span: oxc_span::Span, kind: ExprKind) -> Expr {
        Rc::new(ExprNode {
            span: self.span(span),
            kind,
        })
    }

    fn block(&self, block: &ast::BlockStatement<'_>) -> Result<Rc<[Stmt]>, Exception> {
        self.stmt_list(&block.body)
    }

    fn stmt_list(&self, stmts: &[ast::Statement<'_>]) -> Result<Rc<[Stmt]>, Exception> {
        stmts.iter().map(|s| self.stmt(s)).collect::<Result<_, _>>()
    }

    fn stmt(&self, stmt: &ast::Statement<'_>) -> Result<Stmt, Exception> {
        use ast::Statement as S;
        let span = stmt.span();
        let kind = match stmt {
            S::ExpressionStatement(s) => StmtKind::Expression(self.expr(&s.expression)?),
            S::VariableDeclaration(decl) => StmtKind::VarDecl(self.var_declarators(decl)?),
            S::FunctionDeclaration(func) => StmtKind::FunctionDecl(self.function(func)?),
            S::BlockStatement(s) => StmtKind::Block(self.block(s)?),
            S::EmptyStatement(_) => StmtKind::Empty,
            S::IfStatement(s) => StmtKind::If {
                test: self.expr(&s.test)?,
                consequent: self.stmt(&s.consequent)?,
                alternate: s.alternate.as_ref().map(|a| self.stmt(a)).transpose()?,
            },
            S::ForStatement(s) => {
                let init = match &s.init {
                    None => None,
                    Some(ast::ForStatementInit::VariableDeclaration(decl)) => {
                        Some(ForInit::Decl(self.var_declarators(decl)?))
                    }
                    Some(init) => match init.as_expression() {
                        Some(expr) => Some(ForInit::Expr(self.expr(expr)?)),
                        None => return Err(unsupported("for-loop initializer", self.source, span.start)),
                    },
                };
                StmtKind::For {
                    init,
                    test: s.test.as_ref().map(|t| self.expr(t)).transpose()?,
                    update: s.update.as_ref().map(|u| self.expr(u)).transpose()?,
                    body: self.stmt(&s.body)?,
                }
            }
            S::ForInStatement(s) => StmtKind::ForIn {
                left: self.for_in_target(&s.left)?,
                right: self.expr(&s.right)?,
                body: self.stmt(&s.body)?,
            },
            S::WhileStatement(s) => StmtKind::While {
                test: self.expr(&s.test)?,
                body: self.stmt(&s.body)?,
            },
            S::DoWhileStatement(s) => StmtKind::DoWhile {
                body: self.stmt(&s.body)?,
                test: self.expr(&s.test)?,
            },
            S::SwitchStatement(s) => {
                let cases = s
                    .cases
                    .iter()
                    .map(|case| {
                        Ok(SwitchCase {
                            test: case.test.as_ref().map(|t| self.expr(t)).transpose()?,
                            body: self.stmt_list(&case.consequent)?,
                        })
                    })
                    .collect::<Result<_, Exception>>()?;
                StmtKind::Switch {
                    discriminant: self.expr(&s.discriminant)?,
                    cases,
                }
            }
            S::TryStatement(s) => {
                let handler = match &s.handler {
                    None => None,
                    Some(clause) => {
                        let Some(param) = &clause.param else {
                            return Err(unsupported("catch without a binding", self.source, span.start));
                        };
                        let name = self.binding_name(&param.pattern)?;
                        Some(Rc::new(CatchClause {
                            param: name,
                            body: self.block(&clause.body)?,
                        }))
                    }
                };
                StmtKind::Try {
                    block: self.block(&s.block)?,
                    handler,
                    finalizer: s.finalizer.as_ref().map(|f| self.block(f)).transpose()?,
                }
            }
            S::ThrowStatement(s) => StmtKind::Throw(self.expr(&s.argument)?),
            S::ReturnStatement(s) => StmtKind::Return(s.argument.as_ref().map(|a| self.expr(a)).transpose()?),
            S::BreakStatement(s) => StmtKind::Break(s.label.as_ref().map(|l| Rc::from(l.name.as_str()))),
            S::ContinueStatement(s) => StmtKind::Continue(s.label.as_ref().map(|l| Rc::from(l.name.as_str()))),
            S::LabeledStatement(s) => StmtKind::Labeled {
                label: Rc::from(s.label.name.as_str()),
                body: self.stmt(&s.body)?,
            },
            S::WithStatement(s) => StmtKind::With {
                object: self.expr(&s.object)?,
                body: self.stmt(&s.body)?,
            },
            S::DebuggerStatement(_) => StmtKind::Debugger,
            S::ClassDeclaration(_) => return Err(unsupported("class declaration", self.source, span.start)),
            _ => return Err(unsupported("statement kind", self.source, span.start)),
        };
        Ok(self.stmt_node(span, kind))
    }

    fn var_declarators(&self, decl: &ast::VariableDeclaration<'_>) -> Result<Rc<[VarDeclarator]>, Exception> {
        // `let`/`const` parse but bind like `var`: the source dialect has
        // function-scoped bindings only.
        decl.declarations
            .iter()
            .map(|d| {
                Ok(VarDeclarator {
                    name: self.binding_name(&d.id)?,
                    init: d.init.as_ref().map(|init| self.expr(init)).transpose()?,
                })
            })
            .collect::<Result<_, Exception>>()
    }

    fn binding_name(&self, pattern: &ast::BindingPattern<'_>) -> Result<Rc<str>, Exception> {
        match &pattern.kind {
            ast::BindingPatternKind::BindingIdentifier(ident) => Ok(Rc::from(ident.name.as_str())),
            _ => Err(unsupported("destructuring pattern", self.source, pattern.span().start)),
        }
    }

    fn for_in_target(&self, left: &ast::ForStatementLeft<'_>) -> Result<ForInTarget, Exception> {
        use ast::ForStatementLeft as L;
        match left {
            L::VariableDeclaration(decl) => {
                if decl.declarations.len() == 1 {
                    Ok(ForInTarget::Decl(self.binding_name(&decl.declarations[0].id)?))
                } else {
                    Err(unsupported("multi-binding for-in target", self.source, decl.span.start))
                }
            }
            L::AssignmentTargetIdentifier(ident) => Ok(ForInTarget::Target(
                self.expr_node(ident.span, ExprKind::Identifier(Rc::from(ident.name.as_str()))),
            )),
            L::StaticMemberExpression(member) => Ok(ForInTarget::Target(self.static_member(member)?)),
            L::ComputedMemberExpression(member) => Ok(ForInTarget::Target(self.computed_member(member)?)),
            _ => Err(unsupported("for-in target", self.source, left.span().start)),
        }
    }

    fn function(&self, func: &ast::Function<'_>) -> Result<Rc<FunctionNode>, Exception> {
        let span = func.span;
        if func.generator || func.r#async {
            return Err(unsupported("generator or async function", self.source, span.start));
        }
        if func.params.rest.is_some() {
            return Err(unsupported("rest parameter", self.source, span.start));
        }
        let params = func
            .params
            .items
            .iter()
            .map(|p| self.binding_name(&p.pattern))
            .collect::<Result<Rc<[_]>, _>>()?;
        let Some(body) = &func.body else {
            return Err(unsupported("function without a body", self.source, span.start));
        };
        let source = self
            .source
            .get(span.start as usize..span.end as usize)
            .map(Rc::<str>::from);
        Ok(Rc::new(FunctionNode {
            name: func.id.as_ref().map(|id| Rc::from(id.name.as_str())),
            params,
            body: self.stmt_list(&body.statements)?,
            strict: has_use_strict(&body.directives),
            span: self.span(span),
            source,
        }))
    }

    fn static_member(&self, member: &ast::StaticMemberExpression<'_>) -> Result<Expr, Exception> {
        Ok(self.expr_node(
            member.span,
            ExprKind::Member {
                object: self.expr(&member.object)?,
                property: PropRef::Static(Rc::from(member.property.name.as_str())),
            },
        ))
    }

    fn computed_member(&self, member: &ast::ComputedMemberExpression<'_>) -> Result<Expr, Exception> {
        Ok(self.expr_node(
            member.span,
            ExprKind::Member {
                object: self.expr(&member.object)?,
                property: PropRef::Computed(self.expr(&member.expression)?),
            },
        ))
    }

    fn arguments(&self, args: &[ast::Argument<'_>]) -> Result<Rc<[Expr]>, Exception> {
        args.iter()
            .map(|arg| match arg.as_expression() {
                Some(expr) => self.expr(expr),
                None => Err(unsupported("spread argument", self.source, arg.span().start)),
            })
            .collect::<Result<_, _>>()
    }

    fn property_key(&self, key: &ast::PropertyKey<'_>) -> Result<Rc<str>, Exception> {
        use ast::PropertyKey as K;
        match key {
            K::StaticIdentifier(ident) => Ok(Rc::from(ident.name.as_str())),
            K::StringLiteral(lit) => Ok(Rc::from(lit.value.as_str())),
            K::NumericLiteral(lit) => Ok(Rc::from(number_to_string(lit.value).as_str())),
            _ => Err(unsupported("property key kind", self.source, key.span().start)),
        }
    }

    fn assignment_target(&self, target: &ast::AssignmentTarget<'_>) -> Result<Expr, Exception> {
        use ast::AssignmentTarget as T;
        match target {
            T::AssignmentTargetIdentifier(ident) => {
                Ok(self.expr_node(ident.span, ExprKind::Identifier(Rc::from(ident.name.as_str()))))
            }
            T::StaticMemberExpression(member) => self.static_member(member),
            T::ComputedMemberExpression(member) => self.computed_member(member),
            _ => Err(unsupported("assignment target", self.source, target.span().start)),
        }
    }

    fn simple_assignment_target(&self, target: &ast::SimpleAssignmentTarget<'_>) -> Result<Expr, Exception> {
        use ast::SimpleAssignmentTarget as T;
        match target {
            T::AssignmentTargetIdentifier(ident) => {
                Ok(self.expr_node(ident.span, ExprKind::Identifier(Rc::from(ident.name.as_str()))))
            }
            T::StaticMemberExpression(member) => self.static_member(member),
            T::ComputedMemberExpression(member) => self.computed_member(member),
            _ => Err(unsupported("update target", self.source, target.span().start)),
        }
    }

    fn regex_flags(flags: oxc_ast::ast::RegExpFlags) -> String {
        use oxc_ast::ast::RegExpFlags as F;
        let mut out = String::new();
        if flags.contains(F::G) {
            out.push('g');
        }
        if flags.contains(F::I) {
            out.push('i');
        }
        if flags.contains(F::M) {
            out.push('m');
        }
        out
    }

    fn expr(&self, expr: &ast::Expression<'_>) -> Result<Expr, Exception> {
        use ast::Expression as E;
        let span = expr.span();
        let kind = match expr {
            E::ParenthesizedExpression(inner) => return self.expr(&inner.expression),
            E::NumericLiteral(lit) => ExprKind::Number(lit.value),
            E::StringLiteral(lit) => ExprKind::Str(Rc::from(lit.value.as_str())),
            E::BooleanLiteral(lit) => ExprKind::Bool(lit.value),
            E::NullLiteral(_) => ExprKind::Null,
            E::RegExpLiteral(lit) => ExprKind::Regex {
                pattern: Rc::from(lit.regex.pattern.text.as_str()),
                flags: Rc::from(Self::regex_flags(lit.regex.flags).as_str()),
            },
            E::Identifier(ident) => ExprKind::Identifier(Rc::from(ident.name.as_str())),
            E::ThisExpression(_) => ExprKind::This,
            E::ArrayExpression(array) => {
                let elements = array
                    .elements
                    .iter()
                    .map(|element| match element {
                        ast::ArrayExpressionElement::Elision(_) => Ok(None),
                        element => match element.as_expression() {
                            Some(expr) => self.expr(expr).map(Some),
                            None => Err(unsupported("spread element", self.source, element.span().start)),
                        },
                    })
                    .collect::<Result<Rc<[_]>, Exception>>()?;
                ExprKind::Array(elements)
            }
            E::ObjectExpression(object) => {
                let props = object
                    .properties
                    .iter()
                    .map(|prop| match prop {
                        ast::ObjectPropertyKind::ObjectProperty(p) => {
                            let kind = match p.kind {
                                ast::PropertyKind::Init => PropKind::Init,
                                ast::PropertyKind::Get => PropKind::Get,
                                ast::PropertyKind::Set => PropKind::Set,
                            };
                            Ok(ObjectProp {
                                key: self.property_key(&p.key)?,
                                kind,
                                value: self.expr(&p.value)?,
                            })
                        }
                        ast::ObjectPropertyKind::SpreadProperty(p) => {
                            Err(unsupported("spread property", self.source, p.span.start))
                        }
                    })
                    .collect::<Result<Rc<[_]>, Exception>>()?;
                ExprKind::Object(props)
            }
            E::FunctionExpression(func) => ExprKind::Function(self.function(func)?),
            E::StaticMemberExpression(member) => return self.static_member(member),
            E::ComputedMemberExpression(member) => return self.computed_member(member),
            E::CallExpression(call) => ExprKind::Call {
                callee: self.expr(&call.callee)?,
                args: self.arguments(&call.arguments)?,
            },
            E::NewExpression(new) => ExprKind::New {
                callee: self.expr(&new.callee)?,
                args: self.arguments(&new.arguments)?,
            },
            E::UnaryExpression(unary) => {
                let op = match unary.operator {
                    UnaryOperator::UnaryNegation => UnaryOp::Minus,
                    UnaryOperator::UnaryPlus => UnaryOp::Plus,
                    UnaryOperator::LogicalNot => UnaryOp::Not,
                    UnaryOperator::BitwiseNot => UnaryOp::BitNot,
                    UnaryOperator::Typeof => UnaryOp::Typeof,
                    UnaryOperator::Void => UnaryOp::Void,
                    UnaryOperator::Delete => UnaryOp::Delete,
                };
                ExprKind::Unary {
                    op,
                    argument: self.expr(&unary.argument)?,
                }
            }
            E::UpdateExpression(update) => {
                let op = match update.operator {
                    UpdateOperator::Increment => UpdateOp::Increment,
                    UpdateOperator::Decrement => UpdateOp::Decrement,
                };
                ExprKind::Update {
                    op,
                    prefix: update.prefix,
                    target: self.simple_assignment_target(&update.argument)?,
                }
            }
            E::BinaryExpression(binary) => {
                let op = match binary.operator {
                    BinaryOperator::Addition => BinaryOp::Add,
                    BinaryOperator::Subtraction => BinaryOp::Sub,
                    BinaryOperator::Multiplication => BinaryOp::Mul,
                    BinaryOperator::Division => BinaryOp::Div,
                    BinaryOperator::Remainder => BinaryOp::Rem,
                    BinaryOperator::Equality => BinaryOp::Eq,
                    BinaryOperator::Inequality => BinaryOp::NotEq,
                    BinaryOperator::StrictEquality => BinaryOp::StrictEq,
                    BinaryOperator::StrictInequality => BinaryOp::StrictNotEq,
                    BinaryOperator::LessThan => BinaryOp::Lt,
                    BinaryOperator::LessEqualThan => BinaryOp::LtEq,
                    BinaryOperator::GreaterThan => BinaryOp::Gt,
                    BinaryOperator::GreaterEqualThan => BinaryOp::GtEq,
                    BinaryOperator::ShiftLeft => BinaryOp::ShiftLeft,
                    BinaryOperator::ShiftRight => BinaryOp::ShiftRight,
                    BinaryOperator::ShiftRightZeroFill => BinaryOp::ShiftRightUnsigned,
                    BinaryOperator::BitwiseAnd => BinaryOp::BitAnd,
                    BinaryOperator::BitwiseOR => BinaryOp::BitOr,
                    BinaryOperator::BitwiseXOR => BinaryOp::BitXor,
                    BinaryOperator::In => BinaryOp::In,
                    BinaryOperator::Instanceof => BinaryOp::Instanceof,
                    BinaryOperator::Exponential => {
                        return Err(unsupported("exponentiation operator", self.source, span.start));
                    }
                };
                ExprKind::Binary {
                    op,
                    left: self.expr(&binary.left)?,
                    right: self.expr(&binary.right)?,
                }
            }
            E::LogicalExpression(logical) => {
                let op = match logical.operator {
                    LogicalOperator::And => LogicalOp::And,
                    LogicalOperator::Or => LogicalOp::Or,
                    LogicalOperator::Coalesce => {
                        return Err(unsupported("nullish coalescing", self.source, span.start));
                    }
                };
                ExprKind::Logical {
                    op,
                    left: self.expr(&logical.left)?,
                    right: self.expr(&logical.right)?,
                }
            }
            E::ConditionalExpression(cond) => ExprKind::Conditional {
                test: self.expr(&cond.test)?,
                consequent: self.expr(&cond.consequent)?,
                alternate: self.expr(&cond.alternate)?,
            },
            E::AssignmentExpression(assign) => {
                let op = match assign.operator {
                    AssignmentOperator::Assign => AssignOp::Assign,
                    AssignmentOperator::Addition => AssignOp::Add,
                    AssignmentOperator::Subtraction => AssignOp::Sub,
                    AssignmentOperator::Multiplication => AssignOp::Mul,
                    AssignmentOperator::Division => AssignOp::Div,
                    AssignmentOperator::Remainder => AssignOp::Rem,
                    AssignmentOperator::ShiftLeft => AssignOp::ShiftLeft,
                    AssignmentOperator::ShiftRight => AssignOp::ShiftRight,
                    AssignmentOperator::ShiftRightZeroFill => AssignOp::ShiftRightUnsigned,
                    AssignmentOperator::BitwiseAnd => AssignOp::BitAnd,
                    AssignmentOperator::BitwiseOR => AssignOp::BitOr,
                    AssignmentOperator::BitwiseXOR => AssignOp::BitXor,
                    _ => return Err(unsupported("assignment operator", self.source, span.start)),
                };
                ExprKind::Assign {
                    op,
                    target: self.assignment_target(&assign.left)?,
                    value: self.expr(&assign.right)?,
                }
            }
            E::SequenceExpression(seq) => {
                let exprs = seq
                    .expressions
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<Rc<[_]>, _>>()?;
                ExprKind::Sequence(exprs)
            }
            _ => return Err(unsupported("expression kind", self.source, span.start)),
        };
        Ok(self.expr_node(span, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_program() {
        let program = parse_program("var x = 1 + 2; x;", false).unwrap();
        assert_eq!(program.body.len(), 2);
        assert!(!program.strict);
        assert!(program.body[0].span.is_some());
    }

    #[test]
    fn detects_strict_prologue() {
        let program = parse_program("'use strict';\nvar x = 1;", false).unwrap();
        assert!(program.strict);
    }

    #[test]
    fn strips_spans_for_polyfill_source() {
        let program = parse_program("Array.prototype.x = 1;", true).unwrap();
        assert!(program.body[0].span.is_none());
    }

    #[test]
    fn rejects_arrow_functions() {
        let err = parse_program("var f = function() { return 1; }; var g = (x) => x;", false).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::SyntaxError);
    }

    #[test]
    fn rejects_destructuring() {
        assert!(parse_program("var [a, b] = [1, 2];", false).is_err());
    }

    #[test]
    fn parses_function_literal_snippets() {
        let node = parse_function_literal("(function(a, b) { return a + b; })").unwrap();
        assert_eq!(node.params.len(), 2);
        assert!(node.name.is_none());
    }

    #[test]
    fn reports_parse_errors_as_syntax_errors() {
        let err = parse_program("var = ;", false).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::SyntaxError);
    }
}
