use ember_core::ast::{NodeIdx, NodeKind};
use ember_core::bytecode::{OpCode, Primitive, Ref};
use ember_core::errors::ErrMsg;

use crate::statements::Lval;
use crate::value::{Res, Value};
use crate::{CompileResult, Compiler};

impl<'a> Compiler<'a> {
  /// Compiles an `if` expression.
  ///
  /// A compile-time constant condition lowers only the live branch. A
  /// runtime condition reserves a merge slot when the expression must yield
  /// a value, so both branches materialize into the same Ref.
  pub(crate) fn gen_if(&mut self, node: NodeIdx, res: Res) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);
    let (cond, then_branch, else_branch) = (children[0], children[1], children[2]);

    let cond_val = self.gen_node(cond, Res::Value)?;

    if cond_val.is_const() {
      let live = match cond_val {
        Value::Bool(true) => then_branch,
        Value::Bool(false) => else_branch,
        _ => return self.error(tok, ErrMsg::Expected("expected a boolean".to_string())),
      };

      return if live.is_none() {
        Ok(match res {
          Res::Discard => Value::Empty,
          _ => Value::Null,
        })
      } else {
        self.gen_node(live, res)
      };
    }

    let cond_ref = self.make_runtime(&cond_val, tok)?;
    let branch_res = self.branch_res(res, tok);

    let skip_jump = self.emit_jump(OpCode::JumpIfFalse, Some(cond_ref), tok);
    self.gen_node(then_branch, branch_res)?;

    if else_branch.is_none() {
      self.finalize_jump(skip_jump);
    } else {
      let end_jump = self.emit_jump(OpCode::Jump, None, tok);
      self.finalize_jump(skip_jump);
      self.gen_node(else_branch, branch_res)?;
      self.finalize_jump(end_jump);
    }

    Ok(merged_value(branch_res))
  }

  /// Compiles a `match` expression: one subject, N arms.
  pub(crate) fn gen_match(&mut self, node: NodeIdx, res: Res) -> CompileResult<Value> {
    let tok = self.ast.token(node);
    let children = self.ast.list(node);
    let (subject_node, arms) = (children[0], &children[1..]);

    let subject_val = self.gen_node(subject_node, Res::Value)?;
    let subject = self.make_runtime(&subject_val, tok)?;
    let branch_res = self.branch_res(res, tok);

    let mut end_jumps: Vec<Ref> = vec![];
    let mut seen_catch_all = false;

    for (i, &arm) in arms.iter().enumerate() {
      let arm_tok = self.ast.token(arm);

      if seen_catch_all {
        return self.error(
          arm_tok,
          ErrMsg::Syntax("additional cases after catch-all case".to_string()),
        );
      }

      let is_last = i == arms.len() - 1;
      let mut skip_jumps: Vec<Ref> = vec![];
      let mark = self.scopes.len();

      match self.ast.kind(arm) {
        NodeKind::MatchCaseCatchAll => {
          seen_catch_all = true;
          self.gen_node(self.ast.un(arm), branch_res)?;
        }
        NodeKind::MatchCaseLet => {
          seen_catch_all = true;
          let (pattern, body) = self.ast.bin(arm);
          self.gen_lval(pattern, &Lval::Let(Value::Ref(subject)))?;
          self.gen_node(body, branch_res)?;
        }
        NodeKind::MatchCase => {
          let items = self.ast.list(arm);
          let (candidates, body) = items.split_at(items.len() - 1);
          let body = body[0];

          if candidates.len() == 1 {
            // Degenerate single-candidate arm: one comparison guards the
            // body directly.
            let cand = self.gen_node(candidates[0], Res::Value)?;
            let cand_ref = self.make_runtime(&cand, arm_tok)?;
            let eq = self.emit_bin(OpCode::Equal, subject, cand_ref, arm_tok);
            skip_jumps.push(self.emit_jump(OpCode::JumpIfFalse, Some(eq), arm_tok));
          } else {
            let mut body_jumps: Vec<Ref> = vec![];
            for &candidate in candidates {
              let cand = self.gen_node(candidate, Res::Value)?;
              let cand_ref = self.make_runtime(&cand, arm_tok)?;
              let eq = self.emit_bin(OpCode::Equal, subject, cand_ref, arm_tok);
              body_jumps.push(self.emit_jump(OpCode::JumpIfTrue, Some(eq), arm_tok));
            }
            // No candidate matched: fall through to the next arm.
            skip_jumps.push(self.emit_jump(OpCode::Jump, None, arm_tok));
            for jump in body_jumps {
              self.finalize_jump(jump);
            }
          }

          self.gen_node(body, branch_res)?;
        }
        _ => {
          return self.error(arm_tok, ErrMsg::Internal("Malformed match arm.".to_string()));
        }
      }

      self.pop_scopes(mark);

      // The merged-null fallback sits after the last arm, so a value-list
      // last arm still jumps past it; only a catch-all last arm ends the
      // match directly.
      let fallback_follows = !seen_catch_all && matches!(branch_res, Res::Ref(_));
      if !is_last || fallback_follows {
        end_jumps.push(self.emit_jump(OpCode::Jump, None, arm_tok));
      }
      for jump in skip_jumps {
        self.finalize_jump(jump);
      }
    }

    // Without a catch-all the fall-through path yields null.
    if !seen_catch_all {
      if let Res::Ref(_) = branch_res {
        self.wrap_result(tok, Value::Null, branch_res)?;
      }
    }

    for jump in end_jumps {
      self.finalize_jump(jump);
    }

    Ok(merged_value(branch_res))
  }

  /// The result mode branches are lowered in. A caller wanting a value gets
  /// a reserved null instruction as the merge slot.
  fn branch_res(&mut self, res: Res, tok: usize) -> Res {
    match res {
      Res::Discard => Res::Discard,
      Res::Value => Res::Ref(self.emit_primitive(Primitive::Null, tok)),
      Res::Ref(target) => Res::Ref(target),
    }
  }
}

fn merged_value(branch_res: Res) -> Value {
  match branch_res {
    Res::Ref(slot) => Value::Ref(slot),
    _ => Value::Empty,
  }
}
