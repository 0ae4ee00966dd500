use ember_core::bytecode::Ref;

/// A compile-time value: either a known constant, or a reference to the
/// runtime instruction that will produce it.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Value {
  /// A statement produced no value.
  Empty,
  /// Known to be runtime-only; the Ref names the producing instruction.
  Ref(Ref),
  /// A runtime value bound to a mutable storage slot. Value flow out of a
  /// `Mut` copies instead of moving, so the slot is never aliased.
  Mut(Ref),
  Null,
  Int(i64),
  Num(f64),
  Bool(bool),
  Str(Box<str>),
}

impl Value {
  pub(crate) fn is_runtime(&self) -> bool {
    matches!(self, Value::Ref(_) | Value::Mut(_))
  }

  /// Whether this is a known constant (not runtime, not `Empty`).
  pub(crate) fn is_const(&self) -> bool {
    !matches!(self, Value::Empty | Value::Ref(_) | Value::Mut(_))
  }

  /// The producing instruction of a runtime value.
  pub(crate) fn runtime_ref(&self) -> Ref {
    match self {
      Value::Ref(reff) | Value::Mut(reff) => *reff,
      _ => unreachable!("Value is not a runtime reference."),
    }
  }
}

/// The caller's expectation for a lowered expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Res {
  /// No value required; runtime values must be explicitly discarded.
  Discard,
  /// Any value, constant or runtime, is acceptable.
  Value,
  /// The value must be materialized into the given target slot.
  Ref(Ref),
}
