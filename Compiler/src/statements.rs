use ember_core::ast::{NodeIdx, NodeKind};
use ember_core::bytecode::{OpCode, Operand, Ref};
use ember_core::errors::ErrMsg;

use crate::value::{Res, Value};
use crate::{CompileResult, Compiler};

/// The mode an lvalue is compiled in: binding a new symbol or storing into
/// an existing one. Augmented assignment goes through
/// `resolve_aug_target` instead.
pub(crate) enum Lval {
  Let(Value),
  Assign(Value),
}

impl Lval {
  fn value(&self) -> &Value {
    match self {
      Lval::Let(val) | Lval::Assign(val) => val,
    }
  }

  fn with_value(&self, val: Value) -> Lval {
    match self {
      Lval::Let(_) => Lval::Let(val),
      Lval::Assign(_) => Lval::Assign(val),
    }
  }
}

impl<'a> Compiler<'a> {
  /// Compiles a `let pattern = expr` declaration.
  pub(crate) fn gen_decl(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let (pattern, init) = self.ast.bin(node);
    let val = self.gen_node(init, Res::Value)?;
    self.gen_lval(pattern, &Lval::Let(val))?;
    Ok(Value::Empty)
  }

  /// Compiles the left-hand side of a declaration or assignment.
  pub(crate) fn gen_lval(&mut self, node: NodeIdx, lval: &Lval) -> CompileResult<()> {
    let tok = self.ast.token(node);

    match self.ast.kind(node) {
      NodeKind::Ident => self.lval_ident(node, lval, false),
      NodeKind::MutIdent => match lval {
        Lval::Let(_) => self.lval_ident(node, lval, true),
        Lval::Assign(_) => self.error(
          tok,
          ErrMsg::Syntax("'mut' is only valid in a declaration target.".to_string()),
        ),
      },
      NodeKind::Discard => match lval {
        Lval::Let(_) => self.error_with_hint(
          tok,
          ErrMsg::Syntax("Cannot declare '_'.".to_string()),
          "Nothing would be bound; use a named binding instead.",
        ),
        // Evaluate-and-ignore: the right-hand side was already lowered.
        Lval::Assign(_) => Ok(()),
      },
      NodeKind::Paren => self.gen_lval(self.ast.un(node), lval),
      NodeKind::Error => {
        let val = lval.value();
        if !val.is_runtime() {
          return self.error(tok, ErrMsg::Expected("expected an error".to_string()));
        }
        let source = val.runtime_ref();
        let unwrapped = self.emit_un(OpCode::UnwrapError, source, tok);
        self.gen_lval(self.ast.un(node), &lval.with_value(Value::Ref(unwrapped)))
      }
      NodeKind::Tuple | NodeKind::List | NodeKind::Map => self.error(
        tok,
        ErrMsg::Unsupported("Destructuring patterns are not implemented yet.".to_string()),
      ),
      _ => self.error(tok, ErrMsg::Syntax("Invalid assignment target.".to_string())),
    }
  }

  /// Binds or stores through a named identifier.
  fn lval_ident(&mut self, node: NodeIdx, lval: &Lval, mutable: bool) -> CompileResult<()> {
    let tok = self.ast.token(node);
    let name = self.tokens.lexeme(tok);

    match lval {
      Lval::Let(val) => {
        let slot = match val {
          // A mutable source is always copied so two bindings never share
          // one mutable storage slot; a fresh runtime value only needs a
          // copy when the new binding is itself mutable.
          Value::Mut(reff) => self.emit_un(OpCode::CopyUn, *reff, tok),
          Value::Ref(reff) if mutable => self.emit_un(OpCode::CopyUn, *reff, tok),
          Value::Ref(reff) => *reff,
          Value::Empty => {
            return self.error(tok, ErrMsg::Expected("expected a value".to_string()));
          }
          constant => self.make_runtime(constant, tok)?,
        };
        self.declare_symbol(name, tok, slot, mutable)
      }
      Lval::Assign(val) => {
        let resolved = self.resolve_symbol(name, tok)?;
        if resolved.global {
          return self.error(
            tok,
            ErrMsg::Reference(format!("Cannot assign to undeclared identifier '{}'.", name)),
          );
        }
        if !resolved.mutable {
          return self.error_with_hint(
            tok,
            ErrMsg::Reassignment(format!("Cannot assign to immutable '{}'.", name)),
            "Declare it with 'mut' to allow reassignment.",
          );
        }

        match val {
          Value::Mut(reff) => {
            self.emit_bin(OpCode::Copy, resolved.slot, *reff, tok);
          }
          _ => {
            let reff = self.make_runtime(val, tok)?;
            self.emit_bin(OpCode::Move, resolved.slot, reff, tok);
          }
        }
        Ok(())
      }
    }
  }

  /// Compiles a plain or augmented assignment. Assignments are statements:
  /// any surrounding context expecting a value is an error.
  pub(crate) fn gen_assignment(&mut self, node: NodeIdx, res: Res) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let kind = self.ast.kind(node);
    let (lhs, rhs) = self.ast.bin(node);

    if res != Res::Discard {
      return self.error(tok, ErrMsg::Syntax("assignment produces no value".to_string()));
    }

    if kind == NodeKind::Assign {
      let val = self.gen_node(rhs, Res::Value)?;
      self.gen_lval(lhs, &Lval::Assign(val))?;
      return Ok(Value::Empty);
    }

    // Augmented assignment expands `a op= b` into `a = a op b` over the
    // resolved target slot.
    let target = self.resolve_aug_target(lhs)?;
    let val = self.gen_node(rhs, Res::Value)?;
    let rhs_ref = self.make_runtime(&val, tok)?;

    let op = match kind {
      NodeKind::AddAssign => OpCode::Add,
      NodeKind::SubAssign => OpCode::Sub,
      NodeKind::MulAssign => OpCode::Mul,
      NodeKind::DivAssign => OpCode::Div,
      NodeKind::DivFloorAssign => OpCode::DivFloor,
      NodeKind::ModAssign => OpCode::Mod,
      NodeKind::PowAssign => OpCode::Pow,
      NodeKind::ShlAssign => OpCode::ShiftLeft,
      NodeKind::ShrAssign => OpCode::ShiftRight,
      NodeKind::BitAndAssign => OpCode::BitAnd,
      NodeKind::BitOrAssign => OpCode::BitOr,
      NodeKind::BitXorAssign => OpCode::BitXor,
      _ => unreachable!("Assignment operators are dispatched by node kind."),
    };

    let result = self.emit_bin(op, target, rhs_ref, tok);
    self.emit_bin(OpCode::Move, target, result, tok);
    Ok(Value::Empty)
  }

  /// Resolves the target slot of an augmented assignment. Only mutable named
  /// bindings qualify.
  fn resolve_aug_target(&mut self, node: NodeIdx) -> CompileResult<Ref> {
    let tok = self.ast.token(node);

    match self.ast.kind(node) {
      NodeKind::Paren => self.resolve_aug_target(self.ast.un(node)),
      NodeKind::Ident => {
        let name = self.tokens.lexeme(tok);
        let resolved = self.resolve_symbol(name, tok)?;
        if resolved.global {
          return self.error(
            tok,
            ErrMsg::Reference(format!("Cannot assign to undeclared identifier '{}'.", name)),
          );
        }
        if !resolved.mutable {
          return self.error_with_hint(
            tok,
            ErrMsg::Reassignment(format!("Cannot assign to immutable '{}'.", name)),
            "Declare it with 'mut' to allow reassignment.",
          );
        }
        Ok(resolved.slot)
      }
      NodeKind::Discard => self.error(
        tok,
        ErrMsg::Syntax("'_' is not a valid augmented-assignment target.".to_string()),
      ),
      NodeKind::Error => self.error(
        tok,
        ErrMsg::Syntax("Cannot use an error pattern in augmented assignment.".to_string()),
      ),
      _ => self.error(tok, ErrMsg::Syntax("Invalid assignment target.".to_string())),
    }
  }

  /// Compiles a `return expr?` statement.
  pub(crate) fn gen_return(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let operand = self.ast.un(node);

    if operand.is_none() {
      self.emit_nullary(OpCode::RetNull, tok);
    } else {
      let val = self.gen_node(operand, Res::Value)?;
      let reff = self.make_runtime(&val, tok)?;
      self.emit_un(OpCode::Ret, reff, tok);
    }
    Ok(Value::Empty)
  }

  /// Compiles a `break` statement.
  pub(crate) fn gen_break(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);

    if self.cur_loop.is_none() {
      return self.error(
        tok,
        ErrMsg::Syntax("Cannot have 'break' statement outside of loop.".to_string()),
      );
    }

    let jump = self.emit_jump(OpCode::Jump, None, tok);
    self.cur_loop.as_mut().unwrap().breaks.push(jump);
    Ok(Value::Empty)
  }

  /// Compiles a `continue` statement.
  pub(crate) fn gen_continue(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);

    match &self.cur_loop {
      None => self.error(
        tok,
        ErrMsg::Syntax("Cannot have 'continue' statement outside of loop.".to_string()),
      ),
      Some(loop_ctx) => {
        let start = loop_ctx.start;
        self.emit(OpCode::Jump, Operand::Jump(start), tok);
        Ok(Value::Empty)
      }
    }
  }

  /// Compiles a block. Children are statements; bindings made inside are
  /// popped when the block ends.
  pub(crate) fn gen_block(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let mark = self.scopes.len();

    for &child in self.ast.list(node) {
      self.gen_node(child, Res::Discard)?;
    }

    self.pop_scopes(mark);
    Ok(Value::Empty)
  }
}

/// Whether a node kind is a plain or augmented assignment.
pub(crate) fn is_assignment(kind: NodeKind) -> bool {
  matches!(
    kind,
    NodeKind::Assign
      | NodeKind::AddAssign
      | NodeKind::SubAssign
      | NodeKind::MulAssign
      | NodeKind::DivAssign
      | NodeKind::DivFloorAssign
      | NodeKind::ModAssign
      | NodeKind::PowAssign
      | NodeKind::ShlAssign
      | NodeKind::ShrAssign
      | NodeKind::BitAndAssign
      | NodeKind::BitOrAssign
      | NodeKind::BitXorAssign
  )
}
