//! Ember: the bytecode compiler for the Ember scripting language.
//!
//! This facade re-exports the compiler entry point and the data model it
//! consumes and produces. The lexer and parser are external collaborators:
//! the compiler takes a [`tokens::TokenList`] and a dense [`ast::Ast`] and
//! returns the compiled [`bytecode::Bytecode`] together with unresolved
//! globals for the host to patch.
//!
//! ```
//! use ember::ast::{Ast, NodeData, NodeKind};
//! use ember::tokens::{Token, TokenKind, TokenList};
//! use ember::Compiler;
//!
//! let src = "1 2";
//! let tokens = vec![
//!   Token::new(TokenKind::INT_LIT, (0, 1)),
//!   Token::new(TokenKind::INT_LIT, (2, 3)),
//! ];
//!
//! let mut ast = Ast::default();
//! let one = ast.push(NodeKind::IntLit, 0, NodeData::None);
//! let two = ast.push(NodeKind::IntLit, 1, NodeData::None);
//! let sum = ast.push(NodeKind::Add, 0, NodeData::Bin { lhs: one, rhs: two });
//! ast.root_nodes.push(sum);
//!
//! let list = TokenList::new(src, &tokens);
//! let module = Compiler::compile(&list, &ast).unwrap();
//! // The sum folds into a single constant, followed by the final return.
//! assert_eq!(module.bytecode.code.len(), 2);
//! ```

pub use ember_compiler::{Compiler, Module, MAX_PARAMS};
pub use ember_core::{ast, bytecode, errors, tokens, VERSION};
