use ember_core::bytecode::{OpCode, Operand, Ref, UnresolvedGlobal};
use ember_core::errors::{ErrMsg, ErrorReport};
use ember_core::tokens::TokenIdx;

use crate::symbols::{Capture, ScopeEntry, Symbol};
use crate::{CompileResult, Compiler};

/// The outcome of a symbol lookup.
pub(crate) struct Resolved {
  /// The instruction the name is bound to: a symbol's slot, a capture's
  /// `LoadCapture`, or a `LoadGlobal` placeholder.
  pub slot: Ref,
  pub mutable: bool,
  pub global: bool,
}

impl<'a> Compiler<'a> {
  /// Binds a new symbol in the current scope.
  ///
  /// The redeclaration check is lexical: it walks the flat scope list down
  /// to the nearest function frame, not across it.
  pub(crate) fn declare_symbol(
    &mut self,
    name: &str,
    token: TokenIdx,
    slot: Ref,
    mutable: bool,
  ) -> CompileResult<()> {
    let redeclared = self
      .scopes
      .iter()
      .rev()
      .take_while(|entry| !matches!(entry, ScopeEntry::Frame(_)))
      .any(|entry| matches!(entry, ScopeEntry::Symbol(s) if s.name == name));

    if redeclared {
      return self.error(
        token,
        ErrMsg::Duplication(format!("Duplicate definition for identifier '{}'.", name)),
      );
    }

    self.scopes.push(ScopeEntry::Symbol(Symbol {
      name: name.to_string(),
      slot,
      mutable,
      is_used: false,
      token,
    }));
    Ok(())
  }

  /// Looks for a symbol with the given name, walking the scope stack from
  /// the top down and lifting captures through any function frames crossed
  /// on the way.
  ///
  /// An exhausted stack emits a `LoadGlobal` placeholder and defers the
  /// identifier to the host environment.
  pub(crate) fn resolve_symbol(&mut self, name: &str, token: TokenIdx) -> CompileResult<Resolved> {
    let mut crossed_frames: Vec<usize> = vec![];
    let mut found: Option<(Ref, bool)> = None;

    for idx in (0..self.scopes.len()).rev() {
      match &mut self.scopes[idx] {
        ScopeEntry::Symbol(symbol) if symbol.name == name => {
          symbol.is_used = true;
          found = Some((symbol.slot, symbol.mutable));
          break;
        }
        ScopeEntry::Frame(frame) => {
          if let Some(capture) = frame.captures.iter().find(|c| c.name == name) {
            found = Some((capture.local_ref, capture.mutable));
            break;
          }
          crossed_frames.push(idx);
        }
        _ => {}
      }
    }

    match found {
      Some((mut slot, mutable)) => {
        // Lift outermost-first so each frame captures its parent's value.
        for &frame_idx in crossed_frames.iter().rev() {
          slot = self.add_capture(frame_idx, name, slot, mutable, token)?;
        }
        Ok(Resolved {
          slot,
          mutable,
          global: false,
        })
      }
      None => {
        let placeholder = self.emit_un(OpCode::LoadGlobal, Ref::default(), token);
        self.globals.push(UnresolvedGlobal { token, placeholder });
        Ok(Resolved {
          slot: placeholder,
          mutable: false,
          global: true,
        })
      }
    }
  }

  /// Appends a capture to the given function frame and emits its
  /// `LoadCapture` into that function's code stream.
  fn add_capture(
    &mut self,
    frame_idx: usize,
    name: &str,
    parent_ref: Ref,
    mutable: bool,
    token: TokenIdx,
  ) -> CompileResult<Ref> {
    let (stream, ordinal) = match &self.scopes[frame_idx] {
      ScopeEntry::Frame(frame) => (frame.stream, frame.captures.len()),
      _ => unreachable!("Capture target should be a function frame."),
    };

    // The packed function info word keeps the capture count in 24 bits.
    if ordinal >= (1 << 24) {
      return self.error(
        token,
        ErrMsg::MaxCapacity("Too many captured variables in function.".to_string()),
      );
    }

    let local_ref = self.emit_in_stream(
      stream,
      OpCode::LoadCapture,
      Operand::Int(ordinal as i64),
      token,
    );

    match &mut self.scopes[frame_idx] {
      ScopeEntry::Frame(frame) => frame.captures.push(Capture {
        name: name.to_string(),
        parent_ref,
        local_ref,
        mutable,
      }),
      _ => unreachable!("Capture target should be a function frame."),
    }

    Ok(local_ref)
  }

  /// Pops scope entries down to `mark`, reporting unused bindings.
  pub(crate) fn pop_scopes(&mut self, mark: usize) {
    while self.scopes.len() > mark {
      if let Some(ScopeEntry::Symbol(symbol)) = self.scopes.pop() {
        if !symbol.is_used {
          self.warnings.push(ErrorReport {
            token: symbol.token,
            err_msg: ErrMsg::Reference(format!("Variable '{}' is never used.", symbol.name)),
            hint: None,
          });
        }
      }
    }
  }
}
