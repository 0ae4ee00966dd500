use std::mem;

use ember_core::ast::NodeIdx;
use ember_core::bytecode::{OpCode, Operand, Ref};
use ember_core::errors::ErrMsg;
use ember_core::tokens::TokenIdx;

use crate::statements::Lval;
use crate::symbols::LoopCtx;
use crate::value::{Res, Value};
use crate::{CompileResult, Compiler};

impl<'a> Compiler<'a> {
  /// Compiles a `for (pattern in iterable) body` loop.
  ///
  /// When the surrounding context wants a value, the loop collects each
  /// iteration's body value into a list built before the iterator.
  pub(crate) fn gen_for(&mut self, node: NodeIdx, res: Res) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);
    let (capture, iterable, body) = (children[0], children[1], children[2]);

    let collection = self.begin_loop_collection(res, tok);

    let iter_val = self.gen_node(iterable, Res::Value)?;
    match iter_val {
      // Constant strings are iterable at compile time; everything else has
      // to be a runtime value and is checked by `iter_init`.
      Value::Str(_) | Value::Ref(_) | Value::Mut(_) => {}
      _ => return self.error(tok, ErrMsg::Expected("expected iterable value".to_string())),
    }
    let iterable_ref = self.make_runtime(&iter_val, tok)?;

    let iter_ref = self.emit_un(OpCode::IterInit, iterable_ref, tok);
    self.emit_fallible(iter_ref, tok);

    let loop_start = self.cur_offset();
    let prev_loop = mem::replace(
      &mut self.cur_loop,
      Some(LoopCtx {
        start: loop_start,
        breaks: vec![],
      }),
    );

    // The exit offset is patched once the body and the back jump are done;
    // the instruction's own Ref names the current element.
    let elem = self.emit_jump(OpCode::IterNext, Some(iter_ref), tok);

    let mark = self.scopes.len();
    if !capture.is_none() {
      self.gen_lval(capture, &Lval::Let(Value::Ref(elem)))?;
    }
    self.gen_loop_body(body, collection)?;
    self.pop_scopes(mark);

    let start = self.cur_loop.as_ref().unwrap().start;
    self.emit(OpCode::Jump, Operand::Jump(start), tok);
    self.finalize_jump(elem);

    let finished = mem::replace(&mut self.cur_loop, prev_loop).unwrap();
    for jump in finished.breaks {
      self.finalize_jump(jump);
    }

    Ok(loop_result(collection, res))
  }

  /// Compiles a `while (condition) body` loop, or `while (let pattern =
  /// condition) body` when a capture is present.
  pub(crate) fn gen_while(&mut self, node: NodeIdx, res: Res) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);
    let (capture, cond, body) = (children[0], children[1], children[2]);

    let collection = self.begin_loop_collection(res, tok);

    let loop_start = self.cur_offset();
    let prev_loop = mem::replace(
      &mut self.cur_loop,
      Some(LoopCtx {
        start: loop_start,
        breaks: vec![],
      }),
    );

    // The condition re-evaluates every iteration, so it is lowered after
    // the loop start. Constant conditions emit nothing, which is what makes
    // the dead-loop elision below safe.
    let cond_val = self.gen_node(cond, Res::Value)?;

    let mut exit_jump = None;
    let mut capture_src = None;

    if capture.is_none() {
      match &cond_val {
        // A loop that can never run lowers to nothing.
        Value::Bool(false) => {
          self.cur_loop = prev_loop;
          return Ok(loop_result(collection, res));
        }
        Value::Bool(true) => {}
        v if v.is_const() => {
          return self.error(tok, ErrMsg::Expected("expected a boolean".to_string()));
        }
        _ => {
          let cond_ref = self.make_runtime(&cond_val, tok)?;
          exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse, Some(cond_ref), tok));
        }
      }
    } else {
      match &cond_val {
        Value::Null => {
          self.cur_loop = prev_loop;
          return Ok(loop_result(collection, res));
        }
        v if v.is_const() => {
          // A constant non-null condition binds unconditionally.
          capture_src = Some(self.make_runtime(&cond_val, tok)?);
        }
        _ => {
          let cond_ref = self.make_runtime(&cond_val, tok)?;
          exit_jump = Some(self.emit_jump(OpCode::JumpIfNull, Some(cond_ref), tok));
          capture_src = Some(cond_ref);
        }
      }
    }

    let mark = self.scopes.len();
    if let Some(source) = capture_src {
      self.gen_lval(capture, &Lval::Let(Value::Ref(source)))?;
    }
    self.gen_loop_body(body, collection)?;
    self.pop_scopes(mark);

    let start = self.cur_loop.as_ref().unwrap().start;
    self.emit(OpCode::Jump, Operand::Jump(start), tok);
    if let Some(jump) = exit_jump {
      self.finalize_jump(jump);
    }

    let finished = mem::replace(&mut self.cur_loop, prev_loop).unwrap();
    for jump in finished.breaks {
      self.finalize_jump(jump);
    }

    Ok(loop_result(collection, res))
  }

  /// Emits the loop's result container when the caller wants a value,
  /// targeting the caller's slot when it supplied one.
  fn begin_loop_collection(&mut self, res: Res, tok: TokenIdx) -> Option<Ref> {
    match res {
      Res::Discard => None,
      Res::Value | Res::Ref(_) => {
        let list = self.emit_extra(OpCode::BuildList, &[], tok);
        if let Res::Ref(target) = res {
          self.emit_bin(OpCode::Move, target, list, tok);
        }
        Some(list)
      }
    }
  }

  /// Lowers a loop body, appending its per-iteration value to the
  /// collection when one exists.
  fn gen_loop_body(&mut self, body: NodeIdx, collection: Option<Ref>) -> CompileResult<()> {
    let body_tok = self.ast.token(body);

    match collection {
      Some(list) => {
        let val = self.gen_node(body, Res::Value)?;
        let reff = self.make_runtime(&val, body_tok)?;
        self.emit_bin(OpCode::Append, list, reff, body_tok);
      }
      None => {
        self.gen_node(body, Res::Discard)?;
      }
    }
    Ok(())
  }
}

fn loop_result(collection: Option<Ref>, res: Res) -> Value {
  match (collection, res) {
    (Some(_), Res::Ref(target)) => Value::Ref(target),
    (Some(list), _) => Value::Ref(list),
    (None, _) => Value::Empty,
  }
}
