use std::ops::Index;

/// Represents the index of a Token in the TokenList.
pub type TokenIdx = usize;

/// List of Tokens found in the source code.
pub struct TokenList<'a> {
  pub tokens: &'a [Token],
  pub src: &'a str,
}

impl<'a> Index<usize> for TokenList<'a> {
  type Output = Token;
  fn index(&self, index: usize) -> &Self::Output {
    &self.tokens[index]
  }
}

impl<'a> TokenList<'a> {
  /// Generates a new Tokens List.
  ///
  /// # Arguments
  ///
  /// * `src`: A reference to the program's source text.
  /// * `tokens`: A reference to the source list of lexed tokens.
  ///
  /// # Returns:
  /// ```TokenList```
  pub fn new(src: &'a str, tokens: &'a [Token]) -> Self {
    Self { src, tokens }
  }

  /// Gets the lexeme of a token based on its span information.
  ///
  /// # Arguments
  ///
  /// * `idx`: The index of the token in the list of tokens.
  ///
  /// # Returns:
  /// ```&str```
  pub fn lexeme(&self, idx: TokenIdx) -> &'a str {
    let tok = &self[idx];
    &self.src[tok.span.0..tok.span.1]
  }

  /// Gets the byte offset of a token in the program's source text.
  pub fn offset(&self, idx: TokenIdx) -> usize {
    self[idx].span.0
  }
}

/// A token that represents a single unit of Ember code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
  /// The token's lexeme span (byte start, byte end).
  pub span: (usize, usize),
  /// The token's type.
  pub kind: TokenKind,
}

impl Token {
  pub fn new(kind: TokenKind, span: (usize, usize)) -> Token {
    Token { span, kind }
  }
}

/// The types of tokens in an Ember program.
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenKind {
  // Symbol-based tokens
  BANG,          // !
  BIT_AND,       // &
  BIT_L_SHIFT,   // <<
  BIT_NOT,       // ~
  BIT_OR,        // |
  BIT_R_SHIFT,   // >>
  BIT_XOR,       // ^
  COLON,         // :
  COMMA,         // ,
  DASH,          // -
  DOT,           // .
  EQUALS,        // =
  GREATER_THAN,  // >
  LESS_THAN,     // <
  L_BRACKET,     // [
  L_CURLY,       // {
  L_PAREN,       // (
  PERCENT,       // %
  PLUS,          // +
  R_BRACKET,     // ]
  R_CURLY,       // }
  R_PAREN,       // )
  SLASH,         // /
  STAR,          // *
  UNDERSCORE,    // _

  // Value-carrying tokens
  BINARY_LIT,
  FLOAT_LIT,
  HEX_LIT,
  IDENTIFIER,
  INT_LIT,
  OCTAL_LIT,
  SCIENTIFIC_LIT,
  STR_LIT,

  // Keyword tokens the compiler cares about
  AS_KW,
  BREAK_KW,
  CONTINUE_KW,
  ELSE_KW,
  ERROR_KW,
  FALSE_KW,
  FN_KW,
  FOR_KW,
  IF_KW,
  IMPORT_KW,
  IN_KW,
  IS_KW,
  LET_KW,
  MATCH_KW,
  MUT_KW,
  NULL_KW,
  RETURN_KW,
  THROW_KW,
  TRUE_KW,
  WHILE_KW,

  EOF,
}
