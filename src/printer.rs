use crate::ast::*;

/// Renders syntax tree nodes back into (normalized) source text. Used for stack trace lines
/// when the original source is not available.
pub struct AstPrinter;

impl AstPrinter {
    pub fn to_string(expr: &Expr) -> String {
        match expr {
            Expr::Literal { value } => Self::literal(value),
            Expr::Variable { name } => name.clone(),
            Expr::Tuple { elements } if elements.len() == 1 => {
                format!("({},)", Self::to_string(&elements[0]))
            }
            Expr::Tuple { elements } => format!("({})", Self::join(elements)),
            Expr::List { elements } => format!("[{}]", Self::join(elements)),
            Expr::Unary { op, right } => format!("{}{}", op.symbol(), Self::to_string(right)),
            Expr::Not { right } => format!("not {}", Self::to_string(right)),
            Expr::Binary { left, op, right } => {
                format!("{} {} {}", Self::operand(left), op.symbol(), Self::operand(right))
            }
            Expr::Logical { left, op, right } => {
                let word = match op {
                    LogicalOp::And => "and",
                    LogicalOp::Or => "or",
                };
                format!("{} {word} {}", Self::operand(left), Self::operand(right))
            }
            Expr::Call { callee, arguments, keywords } => {
                let mut args: Vec<String> = arguments.iter().map(Self::to_string).collect();
                args.extend(keywords.iter().map(|(k, v)| format!("{k}={}", Self::to_string(v))));
                format!("{}({})", Self::to_string(callee), args.join(", "))
            }
            Expr::Attribute { object, name } => format!("{}.{name}", Self::to_string(object)),
            Expr::Index { object, index } => {
                format!("{}[{}]", Self::to_string(object), Self::to_string(index))
            }
            Expr::Slice { object, start, end } => {
                let bound = |b: &Option<Box<Expr>>| b.as_deref().map(Self::to_string).unwrap_or_default();
                format!("{}[{}:{}]", Self::to_string(object), bound(start), bound(end))
            }
            Expr::Lambda { decl } => format!("fun({}) {{ ... }}", Self::params(&decl.params)),
        }
    }

    /// A single line summary of a statement. Compound statements render their header only.
    pub fn stmt_to_string(stmt: &Stmt) -> String {
        match &stmt.kind {
            StmtKind::Expression { expr } => format!("{};", Self::to_string(expr)),
            StmtKind::Assign { targets, values } => {
                format!("{} = {};", Self::join(targets), Self::join(values))
            }
            StmtKind::Block { catches, .. } if catches.is_empty() => "{ ... }".to_owned(),
            StmtKind::Block { .. } => "try { ... }".to_owned(),
            StmtKind::If { branches, .. } => match branches.first() {
                Some((condition, _)) => format!("if {} {{ ... }}", Self::to_string(condition)),
                None => "if { ... }".to_owned(),
            },
            StmtKind::ForRange { variable, start, end, .. } => format!(
                "for {variable} in {}..{} {{ ... }}",
                Self::to_string(start),
                Self::to_string(end)
            ),
            StmtKind::While { condition, .. } => {
                format!("while {} {{ ... }}", Self::to_string(condition))
            }
            StmtKind::Loop { .. } => "loop { ... }".to_owned(),
            StmtKind::Break => "break;".to_owned(),
            StmtKind::Return { values } if values.is_empty() => "return;".to_owned(),
            StmtKind::Return { values } => format!("return {};", Self::join(values)),
            StmtKind::Throw { value } => format!("throw {};", Self::to_string(value)),
            StmtKind::Function { decl } => {
                format!("fun {}({}) {{ ... }}", decl.name, Self::params(&decl.params))
            }
            StmtKind::Class { name, value_type, .. } => {
                let keyword = if *value_type { "struct" } else { "class" };
                format!("{keyword} {name} {{ ... }}")
            }
            StmtKind::Import { path, alias } => {
                let path = match path {
                    ImportPath::Relative(p) => format!("{p:?}"),
                    ImportPath::Standard(parts) => parts.join("."),
                };
                match alias {
                    Some(alias) => format!("import {path} as {alias};"),
                    None => format!("import {path};"),
                }
            }
        }
    }

    fn literal(value: &Literal) -> String {
        match value {
            Literal::Nil => "nil".to_owned(),
            Literal::Bool(b) => b.to_string(),
            Literal::Int(n) => n.to_string(),
            Literal::Real(n) if n.fract() == 0.0 && n.is_finite() => format!("{n:.1}"),
            Literal::Real(n) => n.to_string(),
            Literal::Str(s) => format!("{s:?}"),
        }
    }

    fn operand(expr: &Expr) -> String {
        match expr {
            Expr::Binary { .. } | Expr::Logical { .. } => format!("({})", Self::to_string(expr)),
            _ => Self::to_string(expr),
        }
    }

    fn join(exprs: &[Expr]) -> String {
        exprs.iter().map(Self::to_string).collect::<Vec<_>>().join(", ")
    }

    fn params(params: &[Param]) -> String {
        params
            .iter()
            .map(|p| if p.variadic { format!("*{}", p.name) } else { p.name.clone() })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_an_ast() {
        // This is '-123 * (45.67)'
        let expr = Expr::Binary {
            left: Box::new(Expr::Unary { op: UnaryOp::Neg, right: Box::new(Expr::int_literal(123)) }),
            op: BinaryOp::Mul,
            right: Box::new(Expr::Binary {
                left: Box::new(Expr::real_literal(45.67)),
                op: BinaryOp::Add,
                right: Box::new(Expr::variable("x")),
            }),
        };

        let res = AstPrinter::to_string(&expr);
        assert_eq!(res, "-123 * (45.67 + x)".to_owned());
    }

    #[test]
    fn print_a_statement() {
        let stmt = Stmt::new(
            StmtKind::Assign {
                targets: vec![Expr::variable("a"), Expr::variable("b")],
                values: vec![Expr::Slice {
                    object: Box::new(Expr::variable("xs")),
                    start: Some(Box::new(Expr::Unary {
                        op: UnaryOp::Neg,
                        right: Box::new(Expr::int_literal(2)),
                    })),
                    end: None,
                }],
            },
            1,
        );

        assert_eq!(stmt.to_string(), "a, b = xs[-2:];");
    }
}
