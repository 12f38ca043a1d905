//! Core data types
//!
//! This module exposes the "core types" (or "string types") of IMAP:
//!
//! ```text
//!        ┌───────┐ ┌─────────────────┐
//!        │AString│ │     NString     │
//!        └──┬─┬──┘ │(Option<IString>)│
//!           │ │    └─────┬───────────┘
//!           │ └──────┐   │
//!           │        │   │
//! ┌────┐ ┌──▼────┐ ┌─▼───▼─┐
//! │Atom│ │AtomExt│ │IString│
//! └────┘ └───────┘ └┬─────┬┘
//!                   │     │
//!             ┌─────▼─┐ ┌─▼────┐
//!             │Literal│ │Quoted│
//!             └───────┘ └──────┘
//! ```

use std::{
    fmt::{Debug, Display, Formatter},
    str::from_utf8,
};

use crate::{
    types::error::{ValidationError, ValidationErrorKind},
    utils::indicators::{
        is_any_text_char_except_quoted_specials, is_astring_char, is_atom_char, is_char8,
        is_text_char,
    },
};

/// A non-empty vector.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Vec1<T>(Vec<T>);

impl<T> Vec1<T> {
    pub fn from_one(value: T) -> Self {
        Self(vec![value])
    }

    pub fn push(&mut self, value: T) {
        self.0.push(value);
    }

    pub fn as_ref(&self) -> &[T] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T> From<T> for Vec1<T> {
    fn from(value: T) -> Self {
        Self::from_one(value)
    }
}

impl<T> TryFrom<Vec<T>> for Vec1<T> {
    type Error = ValidationError;

    fn try_from(inner: Vec<T>) -> Result<Self, Self::Error> {
        if inner.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        Ok(Self(inner))
    }
}

impl<T> IntoIterator for Vec1<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Vec1<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A command tag.
///
/// `tag = 1*<any ASTRING-CHAR except "+">`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tag(pub(crate) String);

impl Tag {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        if let Some(at) = value
            .iter()
            .position(|b| !is_astring_char(*b) || *b == b'+')
        {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        };

        Ok(())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Tag {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Tag {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl TryFrom<&[u8]> for Tag {
    type Error = ValidationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        // Safety: `verify` ensures ASCII.
        Ok(Self(from_utf8(value).unwrap().to_owned()))
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An atom.
///
/// "An atom consists of one or more non-special characters." (RFC 3501)
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Atom(pub(crate) String);

impl Atom {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        if let Some(at) = value.iter().position(|b| !is_atom_char(*b)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        };

        Ok(())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Atom {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Atom {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl TryFrom<&[u8]> for Atom {
    type Error = ValidationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        // Safety: `verify` ensures ASCII.
        Ok(Self(from_utf8(value).unwrap().to_owned()))
    }
}

impl AsRef<str> for Atom {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An (extended) atom: an atom with the additional chars of `ASTRING-CHAR`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct AtomExt(pub(crate) String);

impl AtomExt {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        if let Some(at) = value.iter().position(|b| !is_astring_char(*b)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        };

        Ok(())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for AtomExt {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for AtomExt {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl From<Atom> for AtomExt {
    fn from(value: Atom) -> Self {
        Self(value.0)
    }
}

impl AsRef<str> for AtomExt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Specifies whether a literal is synchronizing or non-synchronizing.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LiteralMode {
    /// A synchronizing literal, e.g., `{3}\r\nfoo`.
    Sync,
    /// A non-synchronizing literal (LITERAL+), e.g., `{3+}\r\nfoo`.
    NonSync,
}

/// A literal.
///
/// "A literal is a sequence of zero or more octets (including CR and LF),
/// prefix-quoted with an octet count in the form of an open brace, the number
/// of octets, close brace, and CRLF." (RFC 3501)
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Literal {
    pub(crate) data: Vec<u8>,
    pub(crate) mode: LiteralMode,
}

impl Literal {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if let Some(at) = value.iter().position(|b| !is_char8(*b)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        };

        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mode(&self) -> LiteralMode {
        self.mode
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Debug for Literal {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_struct("Literal")
            .field("data", &crate::utils::escape_byte_string(&self.data))
            .field("mode", &self.mode)
            .finish()
    }
}

impl TryFrom<&[u8]> for Literal {
    type Error = ValidationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self {
            data: value.to_owned(),
            mode: LiteralMode::Sync,
        })
    }
}

impl TryFrom<Vec<u8>> for Literal {
    type Error = ValidationError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self {
            data: value,
            mode: LiteralMode::Sync,
        })
    }
}

impl TryFrom<&str> for Literal {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.as_bytes())
    }
}

impl AsRef<[u8]> for Literal {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// A quoted string.
///
/// "The quoted string form is an alternative that avoids the overhead of
/// processing a literal at the cost of limitations of characters which may be used." (RFC 3501)
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Quoted(pub(crate) String);

impl Quoted {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if let Some(at) = value.iter().position(|b| !is_text_char(*b)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        };

        Ok(())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Quoted {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Quoted {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl AsRef<str> for Quoted {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Either a literal or a quoted string.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum IString {
    Literal(Literal),
    Quoted(Quoted),
}

impl IString {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Literal(literal) => literal.as_ref(),
            Self::Quoted(quoted) => quoted.as_ref().as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Literal(literal) => literal.into_data(),
            Self::Quoted(quoted) => quoted.0.into_bytes(),
        }
    }
}

impl TryFrom<&[u8]> for IString {
    type Error = ValidationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if let Ok(value) = from_utf8(value) {
            if let Ok(quoted) = Quoted::try_from(value) {
                return Ok(IString::Quoted(quoted));
            }
        }

        Ok(IString::Literal(Literal::try_from(value)?))
    }
}

impl TryFrom<Vec<u8>> for IString {
    type Error = ValidationError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from(value.as_slice())
    }
}

impl TryFrom<&str> for IString {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if let Ok(quoted) = Quoted::try_from(value) {
            return Ok(IString::Quoted(quoted));
        }

        Ok(IString::Literal(Literal::try_from(value)?))
    }
}

impl TryFrom<String> for IString {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Literal> for IString {
    fn from(value: Literal) -> Self {
        Self::Literal(value)
    }
}

impl From<Quoted> for IString {
    fn from(value: Quoted) -> Self {
        Self::Quoted(value)
    }
}

impl AsRef<[u8]> for IString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Either `NIL` or a string.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct NString(pub Option<IString>);

impl NString {
    pub fn nil() -> Self {
        Self(None)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.0.as_ref().map(IString::as_bytes)
    }
}

impl From<IString> for NString {
    fn from(value: IString) -> Self {
        Self(Some(value))
    }
}

impl TryFrom<&[u8]> for NString {
    type Error = ValidationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(Some(IString::try_from(value)?)))
    }
}

impl TryFrom<&str> for NString {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(Self(Some(IString::try_from(value)?)))
    }
}

/// Either an (extended) atom or a string.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum AString {
    Atom(AtomExt),
    String(IString),
}

impl AString {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Atom(atom) => atom.as_ref().as_bytes(),
            Self::String(istring) => istring.as_bytes(),
        }
    }

    /// The value as UTF-8, when it is UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        match self {
            Self::Atom(atom) => Some(atom.as_ref()),
            Self::String(istring) => from_utf8(istring.as_bytes()).ok(),
        }
    }
}

impl TryFrom<&str> for AString {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if let Ok(atom) = AtomExt::try_from(value) {
            return Ok(AString::Atom(atom));
        }

        Ok(AString::String(IString::try_from(value)?))
    }
}

impl TryFrom<String> for AString {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl TryFrom<&[u8]> for AString {
    type Error = ValidationError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if let Ok(value) = from_utf8(value) {
            return Self::try_from(value);
        }

        Ok(AString::String(IString::try_from(value)?))
    }
}

impl From<Atom> for AString {
    fn from(value: Atom) -> Self {
        Self::Atom(AtomExt::from(value))
    }
}

impl From<AtomExt> for AString {
    fn from(value: AtomExt) -> Self {
        Self::Atom(value)
    }
}

impl From<IString> for AString {
    fn from(value: IString) -> Self {
        Self::String(value)
    }
}

impl AsRef<[u8]> for AString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Human-readable text in a server response.
///
/// `text = 1*TEXT-CHAR`
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Text(pub(crate) String);

impl Text {
    pub fn verify(value: impl AsRef<[u8]>) -> Result<(), ValidationError> {
        let value = value.as_ref();

        if value.is_empty() {
            return Err(ValidationError::new(ValidationErrorKind::Empty));
        }

        if let Some(at) = value.iter().position(|b| !is_text_char(*b)) {
            return Err(ValidationError::new(ValidationErrorKind::InvalidByteAt {
                byte: value[at],
                at,
            }));
        };

        Ok(())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Text {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Text {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::verify(&value)?;

        Ok(Self(value))
    }
}

impl AsRef<str> for Text {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Text {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A quoted char, e.g., the hierarchy delimiter in a LIST response.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct QuotedChar(char);

impl QuotedChar {
    pub fn verify(value: char) -> Result<(), ValidationError> {
        if value.is_ascii()
            && (is_any_text_char_except_quoted_specials(value as u8)
                || value == '\\'
                || value == '"')
        {
            Ok(())
        } else {
            Err(ValidationError::new(ValidationErrorKind::Invalid))
        }
    }

    pub fn inner(&self) -> char {
        self.0
    }
}

impl TryFrom<char> for QuotedChar {
    type Error = ValidationError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Self::verify(value)?;

        Ok(Self(value))
    }
}

/// A charset, e.g., in SEARCH.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Charset {
    Atom(Atom),
    Quoted(Quoted),
}

impl Charset {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Atom(atom) => atom.as_ref(),
            Self::Quoted(quoted) => quoted.as_ref(),
        }
    }
}

impl TryFrom<&str> for Charset {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if let Ok(atom) = Atom::try_from(value) {
            return Ok(Self::Atom(atom));
        }

        Ok(Self::Quoted(Quoted::try_from(value)?))
    }
}

/// A wrapper that hides its content in `Debug`.
///
/// Used for passwords and authentication exchanges so that they don't end up
/// in trace logs.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    /// Exposes the inner value. Use sparingly.
    pub fn declassify(&self) -> &T {
        &self.0
    }
}

impl<T> From<T> for Secret<T> {
    fn from(inner: T) -> Self {
        Self(inner)
    }
}

impl<T> Debug for Secret<T> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str("/* REDACTED */")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom() {
        assert!(Atom::try_from("example").is_ok());
        assert!(Atom::try_from("ex=am=ple").is_ok());

        for invalid in ["", "ex ample", "example)", "ex\"ample", "ex{ample", "ex]a"] {
            assert!(Atom::try_from(invalid).is_err(), "{invalid:?}");
        }
    }

    #[test]
    fn test_tag_excludes_plus() {
        assert!(Tag::try_from("A001").is_ok());
        assert!(Tag::try_from("A+1").is_err());
    }

    #[test]
    fn test_istring_prefers_quoted() {
        assert_eq!(
            IString::try_from("alice").unwrap(),
            IString::Quoted(Quoted::try_from("alice").unwrap()),
        );
        assert!(matches!(
            IString::try_from("line\r\nbreak").unwrap(),
            IString::Literal(_)
        ));
    }

    #[test]
    fn test_astring_prefers_atom() {
        assert!(matches!(AString::try_from("alice").unwrap(), AString::Atom(_)));
        assert!(matches!(
            AString::try_from("two words").unwrap(),
            AString::String(IString::Quoted(_))
        ));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");

        assert_eq!(format!("{secret:?}"), "/* REDACTED */");
        assert_eq!(*secret.declassify(), "hunter2");
    }
}
