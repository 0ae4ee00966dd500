use ember_core::ast::{NodeIdx, NodeKind};
use ember_core::bytecode::{OpCode, Operand, Ref, TypeTag};
use ember_core::errors::ErrMsg;
use ember_core::tokens::{TokenIdx, TokenKind};
use ember_core::utils::*;

use crate::value::{Res, Value};
use crate::{CompileResult, Compiler};

impl<'a> Compiler<'a> {
  /// Compiles an integer literal. The token kind selects the radix.
  pub(crate) fn gen_int_literal(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let lexeme = self.tokens.lexeme(tok);

    let parsed = match self.tokens[tok].kind {
      TokenKind::INT_LIT => parse_int_lexeme(lexeme),
      TokenKind::HEX_LIT => parse_int_from_lexeme_base(lexeme, 16),
      TokenKind::OCTAL_LIT => parse_int_from_lexeme_base(lexeme, 8),
      TokenKind::BINARY_LIT => parse_int_from_lexeme_base(lexeme, 2),
      _ => {
        return self.error(tok, ErrMsg::Internal("Malformed integer literal token.".to_string()));
      }
    };

    match parsed {
      Ok(i) => Ok(Value::Int(i)),
      Err(_) => self.error(
        tok,
        ErrMsg::Internal("Could not convert token to integer.".to_string()),
      ),
    }
  }

  /// Compiles a float literal.
  pub(crate) fn gen_num_literal(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let lexeme = self.tokens.lexeme(tok);

    let parsed = match self.tokens[tok].kind {
      TokenKind::FLOAT_LIT => parse_float_lexeme(lexeme),
      TokenKind::SCIENTIFIC_LIT => parse_scientific_literal_lexeme(lexeme),
      _ => {
        return self.error(tok, ErrMsg::Internal("Malformed float literal token.".to_string()));
      }
    };

    match parsed {
      Ok(n) => Ok(Value::Num(n)),
      Err(_) => self.error(
        tok,
        ErrMsg::Internal("Could not convert token to float.".to_string()),
      ),
    }
  }

  /// Compiles an identifier expression.
  pub(crate) fn gen_identifier(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let name = self.tokens.lexeme(tok);
    let resolved = self.resolve_symbol(name, tok)?;

    Ok(if resolved.mutable {
      Value::Mut(resolved.slot)
    } else {
      Value::Ref(resolved.slot)
    })
  }

  /// Compiles a unary `!`, `~`, or `-` expression, folding constants.
  pub(crate) fn gen_unary(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let operand = self.gen_node(self.ast.un(node), Res::Value)?;

    match self.ast.kind(node) {
      NodeKind::BoolNot => match operand {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        ref v if v.is_const() => self.error(tok, ErrMsg::Expected("expected a boolean".to_string())),
        v => {
          let reff = self.make_runtime(&v, tok)?;
          Ok(Value::Ref(self.emit_un(OpCode::BoolNot, reff, tok)))
        }
      },
      NodeKind::BitNot => match operand {
        Value::Int(i) => Ok(Value::Int(!i)),
        ref v if v.is_const() => {
          self.error(tok, ErrMsg::Expected("expected an integer".to_string()))
        }
        v => {
          let reff = self.make_runtime(&v, tok)?;
          Ok(Value::Ref(self.emit_un(OpCode::BitNot, reff, tok)))
        }
      },
      NodeKind::Negate => match operand {
        // Negating i64::MIN overflows, so it stays a runtime operation.
        Value::Int(i) if i.checked_neg().is_some() => Ok(Value::Int(-i)),
        Value::Num(n) => Ok(Value::Num(-n)),
        ref v if v.is_const() && !matches!(v, Value::Int(_)) => {
          self.error(tok, ErrMsg::Expected("expected a number".to_string()))
        }
        v => {
          let reff = self.make_runtime(&v, tok)?;
          Ok(Value::Ref(self.emit_un(OpCode::Negate, reff, tok)))
        }
      },
      _ => unreachable!("Unary operators are dispatched by node kind."),
    }
  }

  /// Compiles a binary arithmetic, bitwise, shift, or comparison expression.
  /// Constant operands fold at compile time; anything else lowers to the
  /// matching runtime instruction.
  pub(crate) fn gen_binary(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let kind = self.ast.kind(node);
    let (lhs_node, rhs_node) = self.ast.bin(node);

    let lhs = self.gen_node(lhs_node, Res::Value)?;
    let rhs = self.gen_node(rhs_node, Res::Value)?;

    if let Some(folded) = self.fold_binary(kind, &lhs, &rhs, tok)? {
      return Ok(folded);
    }

    let lhs_ref = self.make_runtime(&lhs, tok)?;
    let rhs_ref = self.make_runtime(&rhs, tok)?;

    let op = match kind {
      NodeKind::Add => OpCode::Add,
      NodeKind::Sub => OpCode::Sub,
      NodeKind::Mul => OpCode::Mul,
      NodeKind::Div => OpCode::Div,
      NodeKind::DivFloor => OpCode::DivFloor,
      NodeKind::Mod => OpCode::Mod,
      NodeKind::Pow => OpCode::Pow,
      NodeKind::BitAnd => OpCode::BitAnd,
      NodeKind::BitOr => OpCode::BitOr,
      NodeKind::BitXor => OpCode::BitXor,
      NodeKind::Shl => OpCode::ShiftLeft,
      NodeKind::Shr => OpCode::ShiftRight,
      NodeKind::Equal => OpCode::Equal,
      NodeKind::NotEqual => OpCode::NotEqual,
      NodeKind::LessThan => OpCode::LessThan,
      NodeKind::LessThanEq => OpCode::LessThanEq,
      NodeKind::GreaterThan => OpCode::GreaterThan,
      NodeKind::GreaterThanEq => OpCode::GreaterThanEq,
      _ => unreachable!("Binary operators are dispatched by node kind."),
    };

    Ok(Value::Ref(self.emit_bin(op, lhs_ref, rhs_ref, tok)))
  }

  /// Tries to fold a binary expression over constant operands.
  ///
  /// `Ok(None)` means the expression must be emitted as a runtime
  /// instruction; integer overflow lands there rather than folding wrong.
  fn fold_binary(
    &mut self,
    kind: NodeKind,
    lhs: &Value,
    rhs: &Value,
    tok: TokenIdx,
  ) -> CompileResult<Option<Value>> {
    use NodeKind::*;

    // A negative constant shift amount is rejected even when the other
    // operand is runtime.
    if matches!(kind, Shl | Shr) {
      if let Value::Int(amount) = rhs {
        if *amount < 0 {
          return self.error(tok, ErrMsg::Syntax("Cannot shift by a negative amount.".to_string()));
        }
      }
    }

    if !lhs.is_const() || !rhs.is_const() {
      return Ok(None);
    }

    match kind {
      Add | Sub | Mul | Div | DivFloor | Mod | Pow => self.fold_arith(kind, lhs, rhs, tok),

      BitAnd | BitOr | BitXor => Ok(match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(Value::Int(match kind {
          BitAnd => a & b,
          BitOr => a | b,
          _ => a ^ b,
        })),
        _ => None,
      }),

      Shl | Shr => Ok(match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(Value::Int(if kind == Shl {
          if *b >= 64 {
            0
          } else {
            a.wrapping_shl(*b as u32)
          }
        } else if *b >= 64 {
          i64::MAX
        } else {
          a >> b
        })),
        _ => None,
      }),

      Equal => Ok(Some(Value::Bool(fold_eq(lhs, rhs)))),
      NotEqual => Ok(Some(Value::Bool(!fold_eq(lhs, rhs)))),

      LessThan | LessThanEq | GreaterThan | GreaterThanEq => Ok(match (as_num(lhs), as_num(rhs)) {
        (Some(a), Some(b)) => Some(Value::Bool(match kind {
          LessThan => a < b,
          LessThanEq => a <= b,
          GreaterThan => a > b,
          _ => a >= b,
        })),
        // Ordering of non-numeric values is left to the runtime.
        _ => None,
      }),

      _ => unreachable!("Operator is not foldable."),
    }
  }

  /// Folds arithmetic over two constants. Both operands must be numbers;
  /// the result promotes to `num` iff either operand is one.
  fn fold_arith(
    &mut self,
    kind: NodeKind,
    lhs: &Value,
    rhs: &Value,
    tok: TokenIdx,
  ) -> CompileResult<Option<Value>> {
    use NodeKind::*;

    if !matches!(lhs, Value::Int(_) | Value::Num(_)) || !matches!(rhs, Value::Int(_) | Value::Num(_))
    {
      return self.error(tok, ErrMsg::Expected("expected a number".to_string()));
    }

    // Division by a constant zero faults at runtime, not at compile time.
    if matches!(kind, Div | DivFloor | Mod) {
      if matches!(rhs, Value::Int(0)) || matches!(rhs, Value::Num(n) if *n == 0.0) {
        return Ok(None);
      }
    }

    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
      // Division always produces a num; everything else stays an int unless
      // the host i64 would overflow, in which case the operation is emitted
      // for the runtime instead.
      let folded = match kind {
        Add => a.checked_add(*b).map(Value::Int),
        Sub => a.checked_sub(*b).map(Value::Int),
        Mul => a.checked_mul(*b).map(Value::Int),
        Div => Some(Value::Num(*a as f64 / *b as f64)),
        DivFloor => floor_div(*a, *b).map(Value::Int),
        Mod => floor_mod(*a, *b).map(Value::Int),
        Pow => u32::try_from(*b)
          .ok()
          .and_then(|exp| a.checked_pow(exp))
          .map(Value::Int),
        _ => unreachable!("Operator is not arithmetic."),
      };
      return Ok(folded);
    }

    let (a, b) = (as_num(lhs).unwrap(), as_num(rhs).unwrap());
    Ok(Some(Value::Num(match kind {
      Add => a + b,
      Sub => a - b,
      Mul => a * b,
      Div => a / b,
      DivFloor => (a / b).floor(),
      Mod => a - b * (a / b).floor(),
      Pow => a.powf(b),
      _ => unreachable!("Operator is not arithmetic."),
    })))
  }

  /// Compiles an `expr as type` expression.
  pub(crate) fn gen_cast(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let (operand, ty_tok) = self.ast.ty_bin(node);
    let tag = self.parse_type_name(ty_tok)?;

    let val = self.gen_node(operand, Res::Value)?;

    if matches!(
      tag,
      TypeTag::Func | TypeTag::Err | TypeTag::Range | TypeTag::Tuple | TypeTag::Map | TypeTag::List | TypeTag::Tagged
    ) {
      return self.error(
        ty_tok,
        ErrMsg::InvalidCast(format!("Cannot cast to '{}'.", tag.name())),
      );
    }

    // Casting to null yields null no matter the source.
    if tag == TypeTag::Null {
      return Ok(Value::Null);
    }

    if val.is_const() {
      return self.fold_cast(&val, tag, tok);
    }

    let reff = self.make_runtime(&val, tok)?;
    let result = self.emit(OpCode::As, Operand::TyBin(reff, tag), tok);
    self.emit_fallible(result, tok);
    Ok(Value::Ref(result))
  }

  /// Folds a cast over a constant operand per the compile-time cast table.
  fn fold_cast(&mut self, val: &Value, tag: TypeTag, tok: TokenIdx) -> CompileResult<Value> {
    Ok(match tag {
      TypeTag::Int => match val {
        Value::Int(i) => Value::Int(*i),
        Value::Num(n) => Value::Int(*n as i64),
        Value::Bool(b) => Value::Int(*b as i64),
        Value::Str(s) => match s.parse::<i64>() {
          Ok(i) => Value::Int(i),
          Err(_) => {
            return self.error(tok, ErrMsg::InvalidCast(format!("Cannot cast '{}' to int.", s)));
          }
        },
        _ => return self.error(tok, ErrMsg::InvalidCast("Cannot cast null to int.".to_string())),
      },
      TypeTag::Num => match val {
        Value::Int(i) => Value::Num(*i as f64),
        Value::Num(n) => Value::Num(*n),
        Value::Bool(b) => Value::Num(*b as i64 as f64),
        Value::Str(s) => match s.parse::<f64>() {
          Ok(n) => Value::Num(n),
          Err(_) => {
            return self.error(tok, ErrMsg::InvalidCast(format!("Cannot cast '{}' to num.", s)));
          }
        },
        _ => return self.error(tok, ErrMsg::InvalidCast("Cannot cast null to num.".to_string())),
      },
      TypeTag::Bool => match val {
        Value::Int(i) => Value::Bool(*i != 0),
        Value::Num(n) => Value::Bool(*n != 0.0),
        Value::Bool(b) => Value::Bool(*b),
        Value::Str(s) => match &**s {
          "true" => Value::Bool(true),
          "false" => Value::Bool(false),
          _ => {
            return self.error(tok, ErrMsg::InvalidCast(format!("Cannot cast '{}' to bool.", s)));
          }
        },
        _ => return self.error(tok, ErrMsg::InvalidCast("Cannot cast null to bool.".to_string())),
      },
      TypeTag::Str => match val {
        Value::Int(i) => Value::Str(format!("{}", i).into()),
        Value::Num(n) => Value::Str(format!("{}", n).into()),
        Value::Bool(b) => Value::Str(if *b { "true" } else { "false" }.into()),
        Value::Str(s) => Value::Str(s.clone()),
        _ => return self.error(tok, ErrMsg::InvalidCast("Cannot cast null to str.".to_string())),
      },
      _ => unreachable!("Cast target was validated by the caller."),
    })
  }

  /// Compiles an `expr is type` expression, folding constant operands.
  pub(crate) fn gen_is(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let (operand, ty_tok) = self.ast.ty_bin(node);
    let tag = self.parse_type_name(ty_tok)?;

    let val = self.gen_node(operand, Res::Value)?;

    if val.is_const() {
      let matches_tag = match val {
        Value::Null => tag == TypeTag::Null,
        Value::Int(_) => tag == TypeTag::Int,
        Value::Num(_) => tag == TypeTag::Num,
        Value::Bool(_) => tag == TypeTag::Bool,
        Value::Str(_) => tag == TypeTag::Str,
        _ => unreachable!("Runtime values are handled below."),
      };
      return Ok(Value::Bool(matches_tag));
    }

    let reff = self.make_runtime(&val, tok)?;
    Ok(Value::Ref(self.emit(
      OpCode::Is,
      Operand::TyBin(reff, tag),
      tok,
    )))
  }

  /// Maps a type-name token to its tag, erroring on unknown names.
  fn parse_type_name(&mut self, ty_tok: TokenIdx) -> CompileResult<TypeTag> {
    let name = self.tokens.lexeme(ty_tok);
    match TypeTag::from_name(name) {
      Some(tag) => Ok(tag),
      None => self.error(ty_tok, ErrMsg::Expected("expected a type name".to_string())),
    }
  }

  /// Compiles an `expr.name` member access.
  pub(crate) fn gen_member_access(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let target = self.gen_container(self.ast.un(node))?;

    let name = self.tokens.lexeme(tok);
    let (offset, len) = self.strings.intern(name);
    let name_ref = self.emit(
      OpCode::ConstStr,
      Operand::Str { offset, len },
      tok,
    );

    Ok(Value::Ref(self.emit_bin(OpCode::Get, target, name_ref, tok)))
  }

  /// Compiles an `expr[index]` access.
  pub(crate) fn gen_array_access(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let (target_node, index_node) = self.ast.bin(node);

    let target = self.gen_container(target_node)?;
    let index = self.gen_node(index_node, Res::Value)?;
    let index_ref = self.make_runtime(&index, tok)?;

    Ok(Value::Ref(self.emit_bin(OpCode::Get, target, index_ref, tok)))
  }

  /// Lowers the target of a member or index access, which must be a runtime
  /// value or a constant string.
  fn gen_container(&mut self, node: NodeIdx) -> CompileResult<Ref> {
    let tok = self.ast.token(node);
    let val = self.gen_node(node, Res::Value)?;

    match val {
      Value::Ref(_) | Value::Mut(_) | Value::Str(_) => self.make_runtime(&val, tok),
      _ => self.error(tok, ErrMsg::Expected("expected an indexable value".to_string())),
    }
  }

  /// Compiles an `error(expr)` expression, wrapping a value into a runtime
  /// error value.
  pub(crate) fn gen_error_expr(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let val = self.gen_node(self.ast.un(node), Res::Value)?;
    let reff = self.make_runtime(&val, tok)?;
    Ok(Value::Ref(self.emit_un(OpCode::BuildError, reff, tok)))
  }

  /// Compiles an `import("name")` expression. The operand must be a string
  /// literal; module lookup itself happens in the host at runtime.
  pub(crate) fn gen_import(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let val = self.gen_node(self.ast.un(node), Res::Value)?;

    match val {
      Value::Str(_) => {
        let reff = self.make_runtime(&val, tok)?;
        Ok(Value::Ref(self.emit_un(OpCode::Import, reff, tok)))
      }
      _ => self.error(tok, ErrMsg::Expected("expected a string".to_string())),
    }
  }

  /// Compiles a tuple or list literal. In discard mode the elements are
  /// still lowered for their side effects, but no build instruction is
  /// emitted.
  pub(crate) fn gen_collection(
    &mut self,
    node: NodeIdx,
    op: OpCode,
    res: Res,
  ) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);

    if res == Res::Discard {
      for &child in children {
        self.gen_node(child, Res::Discard)?;
      }
      return Ok(Value::Empty);
    }

    let mut elems = Vec::with_capacity(children.len());
    for &child in children {
      let val = self.gen_node(child, Res::Value)?;
      elems.push(self.make_runtime(&val, self.ast.token(child))?);
    }

    Ok(Value::Ref(self.emit_extra(op, &elems, tok)))
  }

  /// Compiles a map literal. Each entry is a `(key, value)` pair; a missing
  /// or trailing-identifier key shorthand uses the identifier's name as a
  /// string key.
  pub(crate) fn gen_map(&mut self, node: NodeIdx, res: Res) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);

    if res == Res::Discard {
      for &item in children {
        let (key, value) = self.ast.bin(item);
        if !key.is_none() && !self.is_trailing_ident(key) {
          self.gen_node(key, Res::Discard)?;
        }
        self.gen_node(value, Res::Discard)?;
      }
      return Ok(Value::Empty);
    }

    let mut pairs = Vec::with_capacity(children.len() * 2);
    for &item in children {
      let item_tok = self.ast.token(item);
      let (key, value) = self.ast.bin(item);

      let key_ref = if key.is_none() {
        // `{ v }`: the value must end in an identifier naming the key.
        let name_tok = match self.trailing_ident_token(value) {
          Some(t) => t,
          None => return self.error(item_tok, ErrMsg::Expected("expected a key".to_string())),
        };
        self.emit_name_str(name_tok)
      } else if let Some(name_tok) = self.trailing_ident_token_shallow(key) {
        // `{ k = v }`: the identifier's name, not its binding, is the key.
        self.emit_name_str(name_tok)
      } else {
        let key_val = self.gen_node(key, Res::Value)?;
        self.make_runtime(&key_val, self.ast.token(key))?
      };

      let value_val = self.gen_node(value, Res::Value)?;
      let value_ref = self.make_runtime(&value_val, self.ast.token(value))?;

      pairs.push(key_ref);
      pairs.push(value_ref);
    }

    Ok(Value::Ref(self.emit_extra(OpCode::BuildMap, &pairs, tok)))
  }

  /// Interns an identifier token's name and emits it as a string constant.
  fn emit_name_str(&mut self, name_tok: TokenIdx) -> Ref {
    let name = self.tokens.lexeme(name_tok);
    let (offset, len) = self.strings.intern(name);
    self.emit(
      OpCode::ConstStr,
      Operand::Str { offset, len },
      name_tok,
    )
  }

  /// Skips parens around a node.
  fn skip_parens(&self, node: NodeIdx) -> NodeIdx {
    let mut node = node;
    while self.ast.kind(node) == NodeKind::Paren {
      node = self.ast.un(node);
    }
    node
  }

  /// The name token of an expression that ends in an identifier, if any:
  /// a plain identifier or the member name of a member access.
  fn trailing_ident_token(&self, node: NodeIdx) -> Option<usize> {
    let node = self.skip_parens(node);
    match self.ast.kind(node) {
      NodeKind::Ident | NodeKind::MemberAccess => Some(self.ast.token(node)),
      _ => None,
    }
  }

  /// Like `trailing_ident_token`, but only for a bare identifier key.
  fn trailing_ident_token_shallow(&self, node: NodeIdx) -> Option<usize> {
    let node = self.skip_parens(node);
    match self.ast.kind(node) {
      NodeKind::Ident => Some(self.ast.token(node)),
      _ => None,
    }
  }

  fn is_trailing_ident(&self, node: NodeIdx) -> bool {
    self.trailing_ident_token_shallow(node).is_some()
  }
}

/// Integer division rounding toward negative infinity. `None` on division
/// by zero or `i64::MIN / -1` overflow.
fn floor_div(a: i64, b: i64) -> Option<i64> {
  let q = a.checked_div(b)?;
  if a % b != 0 && (a < 0) != (b < 0) {
    Some(q - 1)
  } else {
    Some(q)
  }
}

/// Remainder matching `floor_div`: the result takes the divisor's sign.
fn floor_mod(a: i64, b: i64) -> Option<i64> {
  let r = a.checked_rem(b)?;
  if r != 0 && (r < 0) != (b < 0) {
    Some(r + b)
  } else {
    Some(r)
  }
}

/// The numeric reading of a constant, if it has one.
fn as_num(val: &Value) -> Option<f64> {
  match val {
    Value::Int(i) => Some(*i as f64),
    Value::Num(n) => Some(*n),
    _ => None,
  }
}

/// Structural equality over two constants. Numbers compare across the
/// int/num divide; unrelated families are simply unequal.
fn fold_eq(lhs: &Value, rhs: &Value) -> bool {
  match (lhs, rhs) {
    (Value::Null, Value::Null) => true,
    (Value::Bool(a), Value::Bool(b)) => a == b,
    (Value::Str(a), Value::Str(b)) => a == b,
    (Value::Int(a), Value::Int(b)) => a == b,
    _ => match (as_num(lhs), as_num(rhs)) {
      (Some(a), Some(b)) => a == b,
      _ => false,
    },
  }
}
