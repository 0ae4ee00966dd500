use std::fmt::{self, Display, Formatter};

use crate::tokens::{TokenIdx, TokenList};

/// The kinds of compile-time diagnostics, each carrying its message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrMsg {
  Reference(String),
  Duplication(String),
  Reassignment(String),
  Syntax(String),
  Expected(String),
  InvalidCast(String),
  MaxCapacity(String),
  Unsupported(String),
  Internal(String),
}

impl ErrMsg {
  /// The diagnostic class shown before the message.
  pub fn kind(&self) -> &'static str {
    match self {
      ErrMsg::Reference(_) => "ReferenceError",
      ErrMsg::Duplication(_) => "DuplicationError",
      ErrMsg::Reassignment(_) => "ReassignmentError",
      ErrMsg::Syntax(_) => "SyntaxError",
      ErrMsg::Expected(_) => "TypeError",
      ErrMsg::InvalidCast(_) => "CastError",
      ErrMsg::MaxCapacity(_) => "MaxCapacityError",
      ErrMsg::Unsupported(_) => "UnsupportedError",
      ErrMsg::Internal(_) => "InternalError",
    }
  }

  /// The message text.
  pub fn text(&self) -> &str {
    match self {
      ErrMsg::Reference(m)
      | ErrMsg::Duplication(m)
      | ErrMsg::Reassignment(m)
      | ErrMsg::Syntax(m)
      | ErrMsg::Expected(m)
      | ErrMsg::InvalidCast(m)
      | ErrMsg::MaxCapacity(m)
      | ErrMsg::Unsupported(m)
      | ErrMsg::Internal(m) => m,
    }
  }
}

impl Display for ErrMsg {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.kind(), self.text())
  }
}

/// A diagnostic generated while compiling, tied to the offending token.
/// Presentation is left to the host; the report only records positions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorReport {
  pub token: TokenIdx,
  pub err_msg: ErrMsg,
  pub hint: Option<String>,
}

impl ErrorReport {
  /// The byte offset of the offending token in the source text.
  pub fn offset(&self, tokens: &TokenList) -> usize {
    tokens.offset(self.token)
  }
}
