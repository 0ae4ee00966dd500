use ember_core::ast::{NodeIdx, NodeKind};
use ember_core::bytecode::{OpCode, Ref};
use ember_core::errors::ErrMsg;

use crate::statements::{is_assignment, Lval};
use crate::symbols::{FuncFrame, ScopeEntry};
use crate::value::{Res, Value};
use crate::{CompileResult, Compiler, MAX_PARAMS};

impl<'a> Compiler<'a> {
  /// Compiles a function literal into a nested compilation with its own
  /// code stream, then emits `build_func` (and one `store_capture` per
  /// lifted value) in the enclosing stream.
  pub(crate) fn gen_fn(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);
    let (params, body) = children.split_at(children.len() - 1);
    let body = body[0];

    if params.len() > MAX_PARAMS {
      return self.error(
        tok,
        ErrMsg::MaxCapacity(format!("Cannot declare more than {} parameters.", MAX_PARAMS)),
      );
    }

    // Loop and try scopes never cross a function boundary.
    let saved_loop = self.cur_loop.take();
    let saved_try = self.cur_try.take();

    self.streams.push(vec![]);
    let stream = self.streams.len() - 1;
    let frame_mark = self.scopes.len();
    self.scopes.push(ScopeEntry::Frame(FuncFrame {
      stream,
      captures: vec![],
    }));

    // Parameters occupy slots 0..N; the VM seeds them with the call's
    // arguments.
    for (k, &param) in params.iter().enumerate() {
      self.gen_lval(param, &Lval::Let(Value::Ref(Ref(k as u32))))?;
    }

    let body_tok = self.ast.token(body);
    let body_kind = self.ast.kind(body);
    if body_kind == NodeKind::Block || is_assignment(body_kind) {
      // Statement bodies return through an explicit `return`.
      self.gen_node(body, Res::Discard)?;
      self.emit_nullary(OpCode::RetNull, body_tok);
    } else {
      let val = self.gen_node(body, Res::Value)?;
      match val {
        Value::Empty | Value::Null => {
          self.emit_nullary(OpCode::RetNull, body_tok);
        }
        _ => {
          let reff = self.make_runtime(&val, body_tok)?;
          self.emit_un(OpCode::Ret, reff, body_tok);
        }
      }
    }

    self.pop_scopes(frame_mark + 1);
    let frame = match self.scopes.pop() {
      Some(ScopeEntry::Frame(frame)) => frame,
      _ => unreachable!("Function frame should be on top of the scope stack."),
    };
    let fn_stream = self.streams.pop().unwrap();

    self.cur_loop = saved_loop;
    self.cur_try = saved_try;

    // Word 0 packs {args: u8, captures: u24}; the rest is the function's
    // code stream in execution order.
    let mut payload = Vec::with_capacity(fn_stream.len() + 1);
    payload.push(Ref(params.len() as u32 | (frame.captures.len() as u32) << 8));
    payload.extend(fn_stream);

    let func = self.emit_extra(OpCode::BuildFunc, &payload, tok);
    for capture in &frame.captures {
      self.emit_bin(OpCode::StoreCapture, func, capture.parent_ref, tok);
    }

    Ok(Value::Ref(func))
  }

  /// Compiles a function call.
  pub(crate) fn gen_call(&mut self, node: NodeIdx) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);
    let (callee_node, args) = (children[0], &children[1..]);

    let callee_val = self.gen_node(callee_node, Res::Value)?;
    if !callee_val.is_runtime() {
      return self.error(tok, ErrMsg::Expected("expected a function".to_string()));
    }
    let callee = callee_val.runtime_ref();

    if args.len() > MAX_PARAMS {
      return self.error(
        tok,
        ErrMsg::MaxCapacity(format!("Cannot pass more than {} arguments.", MAX_PARAMS)),
      );
    }

    let mut arg_refs = Vec::with_capacity(args.len() + 1);
    arg_refs.push(callee);
    for &arg in args {
      let arg_tok = self.ast.token(arg);
      let val = self.gen_node(arg, Res::Value)?;
      let mut reff = self.make_runtime(&val, arg_tok)?;
      // Never expose the caller's mutable storage to the callee.
      if matches!(val, Value::Mut(_)) {
        reff = self.emit_un(OpCode::CopyUn, reff, arg_tok);
      }
      arg_refs.push(reff);
    }

    let result = match args.len() {
      0 => self.emit_un(OpCode::CallZero, callee, tok),
      1 => self.emit_bin(OpCode::CallOne, callee, arg_refs[1], tok),
      _ => self.emit_extra(OpCode::Call, &arg_refs, tok),
    };
    self.emit_fallible(result, tok);

    Ok(Value::Ref(result))
  }
}
