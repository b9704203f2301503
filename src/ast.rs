use std::fmt::{self, Display, Formatter};
use std::rc::Rc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

/// A parsed source file or REPL line. The tree is immutable once built; the
/// evaluator only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, value: Expr },
    Const { name: String, value: Expr },
    Return(Expr),
    While { cond: Expr, body: Block },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Break,
    Continue,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Int(BigInt),
    Float(BigDecimal),
    Str(String),
    Bool(bool),
    Array(Vec<Expr>),
    // Pairs in source order; later duplicates win at evaluation time
    Hash(Vec<(Expr, Expr)>),
    Prefix {
        op: String,
        right: Box<Expr>,
    },
    Postfix {
        op: String,
        left: Box<Expr>,
    },
    Infix {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        consequence: Block,
        elifs: Vec<(Expr, Block)>,
        alternative: Option<Block>,
    },
    // Parameters and body are shared so closures can hold them without
    // copying the subtree on every function-literal evaluation
    Function {
        parameters: Rc<Vec<String>>,
        body: Rc<Block>,
    },
    Call {
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    // `a[i]` keeps one entry, `a[i, j]` keeps the whole tuple; evaluation
    // applies the indices left to right
    Index {
        left: Box<Expr>,
        indices: Vec<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Dot {
        left: Box<Expr>,
        property: String,
    },
    Import(Box<Expr>),
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let { name, value } => write!(f, "let {} = {};", name, value),
            Stmt::Const { name, value } => write!(f, "const {} = {};", name, value),
            Stmt::Return(value) => write!(f, "return {};", value),
            Stmt::While { cond, body } => write!(f, "while ({}) {{ {} }}", cond, body),
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                f.write_str("for (")?;
                if let Some(init) = init {
                    write!(f, "{}", init)?;
                } else {
                    f.write_str(";")?;
                }
                if let Some(cond) = cond {
                    write!(f, " {}", cond)?;
                }
                f.write_str(";")?;
                if let Some(post) = post {
                    write!(f, " {}", post)?;
                }
                write!(f, ") {{ {} }}", body)
            }
            Stmt::Break => f.write_str("break;"),
            Stmt::Continue => f.write_str("continue;"),
            Stmt::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => f.write_str(name),
            Expr::Int(value) => write!(f, "{}", value),
            Expr::Float(value) => write!(f, "{}", value),
            Expr::Str(value) => f.write_str(value),
            Expr::Bool(value) => write!(f, "{}", value),
            Expr::Array(elements) => {
                f.write_str("[")?;
                write_joined(f, elements)?;
                f.write_str("]")
            }
            Expr::Hash(pairs) => {
                f.write_str("{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
            Expr::Prefix { op, right } => write!(f, "({}{})", op, right),
            Expr::Postfix { op, left } => write!(f, "({}{})", left, op),
            Expr::Infix { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Expr::If {
                cond,
                consequence,
                elifs,
                alternative,
            } => {
                write!(f, "if ({}) {{ {} }}", cond, consequence)?;
                for (elif_cond, elif_body) in elifs {
                    write!(f, " elif ({}) {{ {} }}", elif_cond, elif_body)?;
                }
                if let Some(alternative) = alternative {
                    write!(f, " else {{ {} }}", alternative)?;
                }
                Ok(())
            }
            Expr::Function { parameters, body } => {
                write!(f, "fn({}) {{\n{}\n}}", parameters.join(", "), body)
            }
            Expr::Call {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;
                write_joined(f, arguments)?;
                f.write_str(")")
            }
            Expr::Index { left, indices } => {
                write!(f, "({}[", left)?;
                write_joined(f, indices)?;
                f.write_str("])")
            }
            Expr::Assign { target, value } => write!(f, "({} = {})", target, value),
            Expr::Dot { left, property } => write!(f, "({}.{})", left, property),
            Expr::Import(path) => write!(f, "import({})", path),
        }
    }
}

fn write_joined(f: &mut Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", expr)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn statements_render() {
        let stmt = Stmt::Let {
            name: "answer".to_string(),
            value: Expr::Infix {
                op: "*".to_string(),
                left: Box::new(Expr::Int(BigInt::from(6))),
                right: Box::new(Expr::Int(BigInt::from(7))),
            },
        };
        assert_eq!("let answer = (6 * 7);", stmt.to_string());
    }

    #[test]
    fn function_literal_renders() {
        let expr = Expr::Function {
            parameters: Rc::new(vec!["x".to_string(), "y".to_string()]),
            body: Rc::new(Block {
                statements: vec![Stmt::Expr(Expr::Infix {
                    op: "+".to_string(),
                    left: Box::new(Expr::Ident("x".to_string())),
                    right: Box::new(Expr::Ident("y".to_string())),
                })],
            }),
        };
        assert_eq!("fn(x, y) {\n(x + y)\n}", expr.to_string());
    }
}
