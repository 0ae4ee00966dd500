use ember_core::bytecode::Ref;
use ember_core::tokens::TokenIdx;

/// A named binding on the scope stack. Its slot aliases the instruction that
/// first produced the bound value.
pub(crate) struct Symbol {
  pub name: String,
  pub slot: Ref,
  pub mutable: bool,
  pub is_used: bool,
  pub token: TokenIdx,
}

/// One value lifted from an enclosing scope into a function.
pub(crate) struct Capture {
  pub name: String,
  /// The value as resolved in the enclosing scope chain.
  pub parent_ref: Ref,
  /// The `LoadCapture` instruction inside the capturing function. Capture
  /// *k*'s instruction carries operand *k*.
  pub local_ref: Ref,
  pub mutable: bool,
}

/// A function boundary on the scope stack. Lookups that walk past it lift
/// the resolved value into `captures`.
pub(crate) struct FuncFrame {
  /// Index of the function's code stream in the compiler's stream stack.
  pub stream: usize,
  pub captures: Vec<Capture>,
}

/// An entry on the scope stack.
pub(crate) enum ScopeEntry {
  Symbol(Symbol),
  Frame(FuncFrame),
}

/// The enclosing loop. `break` jumps collect here until the loop body is
/// finished and their target offset is known.
pub(crate) struct LoopCtx {
  /// Code-stream offset of the loop's first instruction.
  pub start: u32,
  pub breaks: Vec<Ref>,
}

/// The enclosing try scope. Fallible instructions move their result into
/// `err_slot` and enqueue a conditional jump to the handler.
pub(crate) struct TryCtx {
  pub err_slot: Ref,
  pub jumps: Vec<Ref>,
}
