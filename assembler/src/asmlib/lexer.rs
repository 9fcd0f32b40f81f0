//! Tokens of a MIXAL address field.
//!
//! Address fields contain no spaces, so there is nothing to skip:
//! every character must belong to some token.  `*` is produced as a
//! single token and the parser decides from position whether it is
//! the location counter or multiplication.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
pub enum Token {
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Asterisk,
    #[token("//")]
    DoubleSlash,
    #[token("/")]
    Slash,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("=")]
    Equals,
    /// A run of digits and uppercase letters: a number, a symbol, or
    /// a local symbol reference, depending on content and context.
    #[regex("[0-9A-Z]+", |lex| lex.slice().to_owned())]
    Symex(String),
}

/// Tokenize an address field.  The error is the rejected input text.
pub fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(text);
    while let Some(item) = lexer.next() {
        match item {
            Ok(token) => tokens.push(token),
            Err(()) => return Err(lexer.slice().to_string()),
        }
    }
    Ok(tokens)
}
