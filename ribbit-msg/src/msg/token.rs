use tinyvec::ArrayVec;
use toad_macros::rfc_7252_doc;

use super::{Field, SetError};

#[doc = rfc_7252_doc!("5.3.1")]
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Token(pub ArrayVec<[u8; 8]>);

impl Token {
  /// Take an arbitrary-length sequence of bytes and turn it into an opaque message token
  ///
  /// Currently uses the BLAKE2 hashing algorithm, but this may change in the future.
  ///
  /// ```
  /// use ribbit_msg::Token;
  ///
  /// let my_token = Token::opaque(&[0, 1, 2]);
  /// assert_eq!(my_token.as_bytes().len(), 8);
  /// ```
  pub fn opaque(data: &[u8]) -> Token {
    use blake2::digest::consts::U8;
    use blake2::{Blake2b, Digest};

    let mut digest = Blake2b::<U8>::new();
    digest.update(data);
    Token(Into::<[u8; 8]>::into(digest.finalize()).into())
  }

  /// Copy up to 8 bytes into a token.
  ///
  /// ```
  /// use ribbit_msg::{Field, SetError, Token};
  ///
  /// assert_eq!(Token::try_from_slice(&[1, 2]).unwrap().as_bytes(), &[1, 2]);
  /// assert!(matches!(Token::try_from_slice(&[0; 9]),
  ///                  Err(SetError::ValueOutOfRange { field: Field::Token, .. })));
  /// ```
  pub fn try_from_slice(bytes: &[u8]) -> Result<Token, SetError> {
    if bytes.len() > 8 {
      return Err(SetError::ValueOutOfRange { field: Field::Token,
                                             actual: bytes.len() as u64,
                                             min: 0,
                                             max: 8 });
    }

    let mut token = ArrayVec::new();
    token.extend_from_slice(bytes);
    Ok(Token(token))
  }

  /// The raw bytes of this token
  pub fn as_bytes(&self) -> &[u8] {
    self.0.as_slice()
  }

  /// Is this the zero-length token?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl core::fmt::Display for Token {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    self.0.iter().try_for_each(|b| write!(f, "{:02x}", b))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn opaque_is_deterministic() {
    assert_eq!(Token::opaque(b"abc"), Token::opaque(b"abc"));
    assert_ne!(Token::opaque(b"abc"), Token::opaque(b"abd"));
  }

  #[test]
  fn display_hex() {
    let token = Token::try_from_slice(&[0x0a, 0xff]).unwrap();
    assert_eq!(format!("{}", token), "0aff");
  }
}
