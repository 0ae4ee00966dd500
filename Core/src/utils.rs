use std::num::{ParseFloatError, ParseIntError};

/// Parses an integer literal lexeme into a Rust int.
///
/// ```bnf
/// INTEGER_LITERAL ::= DIGIT+ ("_" DIGIT+)*
/// ```
pub fn parse_int_lexeme(lexeme: &str) -> Result<i64, ParseIntError> {
  // Removes any underscores and parses the lexeme into an int
  // that can then be folded into an Ember int constant.
  lexeme.replace('_', "").parse::<i64>()
}

/// Parses a float literal lexeme into a Rust float.
///
/// ```bnf
/// FLOAT_LITERAL ::= (DIGIT+ "." DIGIT*) | (DIGIT* "." DIGIT+)
/// ```
pub fn parse_float_lexeme(lexeme: &str) -> Result<f64, ParseFloatError> {
  lexeme.replace('_', "").parse::<f64>()
}

/// Parses a hex, octal, or binary literal lexeme into a Rust int.
///
/// ```bnf
/// HEX_LITERAL      ::= ("0x" | "0X") HEX_DIGIT+ ("_" HEX_DIGIT+)*
/// OCT_LITERAL      ::= ("0o" | "0O") OCT_DIGIT+ ("_" OCT_DIGIT+)*
/// BINARY_LITERAL   ::= ("0b" | "0B") BINARY_DIGIT+ ("_" BINARY_DIGIT+)*
/// ```
pub fn parse_int_from_lexeme_base(lexeme: &str, radix: u32) -> Result<i64, ParseIntError> {
  // The base prefix is two bytes long.
  i64::from_str_radix(&lexeme.replace('_', "")[2..], radix)
}

/// Parses a scientific-notation literal into a Rust float.
///
/// ```bnf
/// SCIENTIFIC_LITERAL ::= (FLOAT_LITERAL | INTEGER_LITERAL) ("e" | "E") "-"? INTEGER_LITERAL
/// ```
pub fn parse_scientific_literal_lexeme(lexeme: &str) -> Result<f64, ParseFloatError> {
  let lexeme = lexeme.replace('_', "");
  let lexemes: Vec<&str> = lexeme.split(['e', 'E']).collect();

  let base = lexemes[0].parse::<f64>()?;
  let exponent = lexemes[1].parse::<f64>()?;

  Ok(base * 10f64.powf(exponent))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_underscored_int_lexemes() {
    assert_eq!(parse_int_lexeme("1_000_000"), Ok(1_000_000));
    assert_eq!(parse_int_lexeme("42"), Ok(42));
    assert!(parse_int_lexeme("9223372036854775808").is_err());
  }

  #[test]
  fn parses_radix_lexemes() {
    assert_eq!(parse_int_from_lexeme_base("0xff", 16), Ok(255));
    assert_eq!(parse_int_from_lexeme_base("0o17", 8), Ok(15));
    assert_eq!(parse_int_from_lexeme_base("0b1010", 2), Ok(10));
  }

  #[test]
  fn parses_scientific_lexemes() {
    assert_eq!(parse_scientific_literal_lexeme("1e3"), Ok(1000.0));
    assert_eq!(parse_scientific_literal_lexeme("2.5E-1"), Ok(0.25));
  }
}
