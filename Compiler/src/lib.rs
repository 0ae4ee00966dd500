use ember_core::ast::{Ast, NodeIdx, NodeKind};
use ember_core::bytecode::{
  Bytecode, Instruction, OpCode, Operand, Primitive, Ref, UnresolvedGlobal,
};
use ember_core::errors::{ErrMsg, ErrorReport};
use ember_core::tokens::{TokenIdx, TokenList};

mod branches;
mod expressions;
mod functions;
mod loops;
mod resolver;
mod statements;
mod strings;
mod symbols;
mod value;


use strings::StringInterner;
use symbols::{LoopCtx, ScopeEntry, TryCtx};
use value::{Res, Value};

/// The most parameters a function may declare, and the most arguments a call
/// may pass.
pub const MAX_PARAMS: usize = 32;

/// The result of successfully compiling one module.
pub struct Module {
  pub bytecode: Bytecode,
  /// Identifiers left for the host environment to resolve.
  pub globals: Vec<UnresolvedGlobal>,
  /// Non-fatal diagnostics.
  pub warnings: Vec<ErrorReport>,
}

/// The result type of every lowering routine. The error half is empty on
/// purpose: the diagnostic has already been pushed onto the error collector,
/// and `Err` only unwinds the recursion.
pub(crate) type CompileResult<T> = Result<T, ()>;

/// Represents the compiler and its internal state.
pub struct Compiler<'a> {
  tokens: &'a TokenList<'a>,
  ast: &'a Ast,
  /// The instruction buffer. An instruction's Ref is its index here.
  instructions: Vec<Instruction>,
  /// The token associated with each instruction.
  inst_tokens: Vec<TokenIdx>,
  /// Side table for variable-arity operands.
  extra: Vec<Ref>,
  strings: StringInterner,
  /// Stack of code streams. Index 0 is the top-level stream; function
  /// literals push and pop their own.
  streams: Vec<Vec<Ref>>,
  /// The scope stack: symbols interleaved with function-frame markers.
  scopes: Vec<ScopeEntry>,
  /// The enclosing loop, saved and restored around function bodies.
  cur_loop: Option<LoopCtx>,
  /// The enclosing try scope, saved and restored around function bodies.
  cur_try: Option<TryCtx>,
  globals: Vec<UnresolvedGlobal>,
  errors: Vec<ErrorReport>,
  warnings: Vec<ErrorReport>,
}

impl<'a> Compiler<'a> {
  pub fn new(tokens: &'a TokenList<'a>, ast: &'a Ast) -> Self {
    Compiler {
      tokens,
      ast,
      instructions: vec![],
      inst_tokens: vec![],
      extra: vec![],
      strings: StringInterner::new(),
      streams: vec![vec![]],
      scopes: vec![],
      cur_loop: None,
      cur_try: None,
      globals: vec![],
      errors: vec![],
      warnings: vec![],
    }
  }

  /// Compiles a module's AST into bytecode.
  ///
  /// # Arguments
  ///
  /// * `tokens`: The lexed tokens list.
  /// * `ast`: The parsed abstract syntax tree.
  ///
  /// # Returns:
  /// ```Result<Module, Vec<ErrorReport>>```
  pub fn compile(tokens: &TokenList, ast: &Ast) -> Result<Module, Vec<ErrorReport>> {
    let mut compiler = Compiler::new(tokens, ast);

    for &node in &ast.root_nodes {
      // The first error aborts the pass.
      if compiler.gen_node(node, Res::Discard).is_err() {
        break;
      }
    }

    if !compiler.errors.is_empty() {
      return Err(compiler.errors);
    }

    let end_tok = ast.root_nodes.last().map(|&n| ast.token(n)).unwrap_or(0);
    compiler.emit_nullary(OpCode::RetNull, end_tok);
    compiler.pop_scopes(0);

    let main = compiler.streams.pop().unwrap_or_default();
    Ok(Module {
      bytecode: Bytecode {
        code: compiler.instructions,
        extra: compiler.extra,
        strings: compiler.strings.into_bytes(),
        main,
        tokens: compiler.inst_tokens,
      },
      globals: compiler.globals,
      warnings: compiler.warnings,
    })
  }

  /// Lowers a single AST node, honoring the caller's result mode.
  pub(crate) fn gen_node(&mut self, node: NodeIdx, res: Res) -> CompileResult<Value> {
    use NodeKind::*;

    let tok = self.ast.token(node);

    let val = match self.ast.kind(node) {
      IntLit => self.gen_int_literal(node),
      NumLit => self.gen_num_literal(node),
      StrLit => self.parse_str_literal(tok).map(Value::Str),
      TrueLit => Ok(Value::Bool(true)),
      FalseLit => Ok(Value::Bool(false)),
      NullLit => Ok(Value::Null),
      Ident => self.gen_identifier(node),
      MutIdent => self.error(
        tok,
        ErrMsg::Syntax("'mut' is only valid in a declaration target.".to_string()),
      ),
      Discard => self.error(tok, ErrMsg::Syntax("'_' cannot be used as a value.".to_string())),

      BoolNot | BitNot | Negate => self.gen_unary(node),
      Return => self.gen_return(node),
      Break => self.gen_break(node),
      Continue => self.gen_continue(node),
      Error => self.gen_error_expr(node),
      Import => self.gen_import(node),
      Throw => self.error(
        tok,
        ErrMsg::Unsupported("'throw' is not implemented yet.".to_string()),
      ),
      Paren => return self.gen_node(self.ast.un(node), res),
      MemberAccess => self.gen_member_access(node),

      Add | Sub | Mul | Div | DivFloor | Mod | Pow | BitAnd | BitOr | BitXor | Shl | Shr
      | Equal | NotEqual | LessThan | LessThanEq | GreaterThan | GreaterThanEq => {
        self.gen_binary(node)
      }

      Assign | AddAssign | SubAssign | MulAssign | DivAssign | DivFloorAssign | ModAssign
      | PowAssign | ShlAssign | ShrAssign | BitAndAssign | BitOrAssign | BitXorAssign => {
        self.gen_assignment(node, res)
      }

      ArrayAccess => self.gen_array_access(node),
      Decl => self.gen_decl(node),
      As => self.gen_cast(node),
      Is => self.gen_is(node),

      Block => self.gen_block(node),
      Tuple => self.gen_collection(node, OpCode::BuildTuple, res),
      List => self.gen_collection(node, OpCode::BuildList, res),
      Map => self.gen_map(node, res),
      Call => self.gen_call(node),
      Fn => self.gen_fn(node),
      For => self.gen_for(node, res),
      While => self.gen_while(node, res),
      If => self.gen_if(node, res),
      Match => self.gen_match(node, res),

      MapItem | MatchCase | MatchCaseLet | MatchCaseCatchAll => self.error(
        tok,
        ErrMsg::Internal("Node is only valid inside its parent construct.".to_string()),
      ),
    }?;

    self.wrap_result(tok, val, res)
  }

  /// Reconciles a lowered value with the caller's result mode.
  ///
  /// Traps `empty` values where a value is required, discards unused runtime
  /// values, and materializes into the caller's slot for `Res::Ref`.
  pub(crate) fn wrap_result(&mut self, tok: TokenIdx, val: Value, res: Res) -> CompileResult<Value> {
    if matches!(val, Value::Empty) && res != Res::Discard {
      return self.error(tok, ErrMsg::Expected("expected a value".to_string()));
    }

    match res {
      Res::Discard => {
        if val.is_runtime() {
          let reff = val.runtime_ref();
          self.emit_un(OpCode::Discard, reff, tok);
        } else if !matches!(val, Value::Empty) {
          // Folded constants still materialize at statement level.
          self.make_runtime(&val, tok)?;
        }
        Ok(Value::Empty)
      }
      Res::Value => Ok(val),
      Res::Ref(target) => {
        let reff = self.make_runtime(&val, tok)?;
        if reff == target {
          // Already in place.
        } else if matches!(val, Value::Mut(_)) {
          self.emit_bin(OpCode::Copy, target, reff, tok);
        } else {
          self.emit_bin(OpCode::Move, target, reff, tok);
        }
        Ok(Value::Ref(target))
      }
    }
  }

  /// Emits whatever instructions are needed so that the value is available
  /// at runtime under a single Ref.
  pub(crate) fn make_runtime(&mut self, val: &Value, tok: TokenIdx) -> CompileResult<Ref> {
    Ok(match val {
      Value::Empty => {
        return self.error(tok, ErrMsg::Expected("expected a value".to_string()));
      }
      Value::Ref(reff) | Value::Mut(reff) => *reff,
      Value::Null => self.emit_primitive(Primitive::Null, tok),
      Value::Bool(true) => self.emit_primitive(Primitive::True, tok),
      Value::Bool(false) => self.emit_primitive(Primitive::False, tok),
      Value::Int(i) => self.emit(OpCode::ConstInt, Operand::Int(*i), tok),
      Value::Num(n) => self.emit(OpCode::ConstNum, Operand::Num(*n), tok),
      Value::Str(s) => {
        let (offset, len) = self.strings.intern(s);
        self.emit(OpCode::ConstStr, Operand::Str { offset, len }, tok)
      }
    })
  }

  // === Instruction Emission ===

  /// Appends an instruction to the buffer and to the code stream of the
  /// given function, returning its Ref.
  pub(crate) fn emit_in_stream(
    &mut self,
    stream: usize,
    op: OpCode,
    data: Operand,
    tok: TokenIdx,
  ) -> Ref {
    let reff: Ref = self.instructions.len().into();
    self.instructions.push(Instruction { op, data });
    self.inst_tokens.push(tok);
    self.streams[stream].push(reff);
    reff
  }

  /// Appends an instruction to the current code stream.
  pub(crate) fn emit(&mut self, op: OpCode, data: Operand, tok: TokenIdx) -> Ref {
    let stream = self.streams.len() - 1;
    self.emit_in_stream(stream, op, data, tok)
  }

  pub(crate) fn emit_nullary(&mut self, op: OpCode, tok: TokenIdx) -> Ref {
    self.emit(op, Operand::None, tok)
  }

  pub(crate) fn emit_un(&mut self, op: OpCode, operand: Ref, tok: TokenIdx) -> Ref {
    self.emit(op, Operand::Un(operand), tok)
  }

  pub(crate) fn emit_bin(&mut self, op: OpCode, lhs: Ref, rhs: Ref, tok: TokenIdx) -> Ref {
    self.emit(op, Operand::Bin(lhs, rhs), tok)
  }

  pub(crate) fn emit_primitive(&mut self, primitive: Primitive, tok: TokenIdx) -> Ref {
    self.emit(OpCode::ConstPrimitive, Operand::Primitive(primitive), tok)
  }

  /// Emits a jump with a not-yet-known offset, to be backpatched with
  /// `finalize_jump`. Conditional jumps carry the value they test.
  pub(crate) fn emit_jump(&mut self, op: OpCode, cond: Option<Ref>, tok: TokenIdx) -> Ref {
    let data = match cond {
      Some(cond) => Operand::JumpCond {
        cond,
        offset: ember_core::bytecode::UNPATCHED,
      },
      None => Operand::Jump(ember_core::bytecode::UNPATCHED),
    };
    self.emit(op, data, tok)
  }

  /// Emits a variable-arity instruction. The operands are copied into the
  /// extra buffer before the instruction itself is appended.
  pub(crate) fn emit_extra(&mut self, op: OpCode, refs: &[Ref], tok: TokenIdx) -> Ref {
    let start = self.extra.len() as u32;
    self.extra.extend_from_slice(refs);
    self.emit(
      op,
      Operand::Extra {
        start,
        len: refs.len() as u32,
      },
      tok,
    )
  }

  /// The current length of the current code stream, i.e. the offset the
  /// next emitted instruction will occupy.
  pub(crate) fn cur_offset(&self) -> u32 {
    self.streams.last().unwrap().len() as u32
  }

  /// Backpatches a jump emitted earlier to target the current code-stream
  /// position.
  pub(crate) fn finalize_jump(&mut self, jump: Ref) {
    let offset = self.cur_offset();
    match &mut self.instructions[jump.index()].data {
      Operand::Jump(o) => *o = offset,
      Operand::JumpCond { offset: o, .. } => *o = offset,
      _ => unreachable!("Ref #{} is not a jump instruction.", jump.0),
    }
  }

  /// Hook for instructions that may fault at runtime. Inside an active try
  /// scope, the result is moved into the error slot and tested, branching to
  /// the handler once its offset is known.
  pub(crate) fn emit_fallible(&mut self, result: Ref, tok: TokenIdx) {
    let err_slot = match &self.cur_try {
      Some(try_ctx) => try_ctx.err_slot,
      None => return,
    };

    self.emit_bin(OpCode::Move, err_slot, result, tok);
    let jump = self.emit_jump(OpCode::JumpIfError, Some(result), tok);
    self.cur_try.as_mut().unwrap().jumps.push(jump);
  }

  // === Diagnostics ===

  pub(crate) fn emit_error(&mut self, token: TokenIdx, err_msg: ErrMsg, hint: Option<String>) {
    self.errors.push(ErrorReport { token, err_msg, hint });
  }

  /// Records a diagnostic and unwinds the current lowering.
  pub(crate) fn error<T>(&mut self, token: TokenIdx, err_msg: ErrMsg) -> CompileResult<T> {
    self.emit_error(token, err_msg, None);
    Err(())
  }

  pub(crate) fn error_with_hint<T>(
    &mut self,
    token: TokenIdx,
    err_msg: ErrMsg,
    hint: &str,
  ) -> CompileResult<T> {
    self.emit_error(token, err_msg, Some(hint.to_string()));
    Err(())
  }
}
