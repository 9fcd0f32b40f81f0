//! Expression, W-value, and address-field evaluation.
//!
//! MIXAL expressions are strictly left to right, no precedence:
//! `1+2*3` is 9.  The binary operators are `+ - * / // :`, where
//! `//` is division of the left operand scaled by the word radix
//! (`(a * 2^30) / b`, truncated) and `:` packs a field pair as
//! `8*a + b`.  Atoms are decimal numbers, symbols, and `*` (the
//! location counter).

use base::prelude::*;

use crate::lexer::Token;
use crate::symtab::{classify, SymbolRef, SymbolTable};
use crate::types::AsmError;

/// Everything expression evaluation can see.
pub struct EvalContext<'a> {
    pub symbols: &'a SymbolTable,
    pub star: i64,
    pub line: usize,
}

impl EvalContext<'_> {
    fn bad(&self, reason: impl Into<String>) -> AsmError {
        AsmError::BadExpression {
            line: self.line,
            reason: reason.into(),
        }
    }
}

/// The A-part of an instruction address field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum APart {
    /// Empty: assembles as zero.
    Empty,
    /// A fully evaluated expression.
    Value(i64),
    /// `=expr=`: the evaluated literal to be deposited after END.
    Literal(i64),
    /// A single not-yet-defined global symbol.
    ForwardGlobal(String),
    /// `nF`.
    ForwardLocal(u8),
}

#[derive(Debug, PartialEq, Eq)]
pub struct AddressField {
    pub a: APart,
    pub index: i64,
    pub field: Option<i64>,
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Cursor<'a> {
        Cursor { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn at_end(&self) -> bool {
        self.pos == self.tokens.len()
    }
}

/// Evaluate a complete expression; all symbols must be defined.
pub fn eval_expression(tokens: &[Token], ctx: &EvalContext) -> Result<i64, AsmError> {
    let mut cur = Cursor::new(tokens);
    let value = expression(&mut cur, ctx)?;
    if !cur.at_end() {
        return Err(ctx.bad("trailing tokens after expression"));
    }
    Ok(value)
}

fn expression(cur: &mut Cursor, ctx: &EvalContext) -> Result<i64, AsmError> {
    let mut acc = signed_atom(cur, ctx)?;
    while let Some(op) = cur.peek() {
        let op = match op {
            Token::Plus | Token::Minus | Token::Asterisk | Token::Slash
            | Token::DoubleSlash | Token::Colon => op.clone(),
            _ => break,
        };
        cur.next();
        let rhs = signed_atom(cur, ctx)?;
        acc = apply(&op, acc, rhs, ctx)?;
    }
    Ok(acc)
}

fn signed_atom(cur: &mut Cursor, ctx: &EvalContext) -> Result<i64, AsmError> {
    let negate = match cur.peek() {
        Some(Token::Plus) => {
            cur.next();
            false
        }
        Some(Token::Minus) => {
            cur.next();
            true
        }
        _ => false,
    };
    let value = atom(cur, ctx)?;
    Ok(if negate { -value } else { value })
}

fn atom(cur: &mut Cursor, ctx: &EvalContext) -> Result<i64, AsmError> {
    match cur.next() {
        Some(Token::Asterisk) => Ok(ctx.star),
        Some(Token::Symex(text)) => symex_value(text, ctx),
        Some(other) => Err(ctx.bad(format!("expected an atom, found {:?}", other))),
        None => Err(ctx.bad("expected an atom at end of expression")),
    }
}

fn symex_value(text: &str, ctx: &EvalContext) -> Result<i64, AsmError> {
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .map_err(|_| ctx.bad(format!("number '{}' is out of range", text)));
    }
    match classify(text) {
        SymbolRef::Global(name) => {
            ctx.symbols
                .lookup_global(&name)
                .ok_or(AsmError::UndefinedSymbol {
                    line: ctx.line,
                    symbol: name,
                })
        }
        SymbolRef::LocalBack(d) => {
            ctx.symbols
                .lookup_local_back(d)
                .ok_or(AsmError::UndefinedSymbol {
                    line: ctx.line,
                    symbol: format!("{}B", d),
                })
        }
        // A forward local has no value yet, and an nH spelling is a
        // definition, not a reference.
        SymbolRef::LocalForward(_) | SymbolRef::LocalDef(_) => Err(AsmError::LocalMisuse {
            line: ctx.line,
            symbol: text.to_string(),
        }),
    }
}

fn apply(op: &Token, lhs: i64, rhs: i64, ctx: &EvalContext) -> Result<i64, AsmError> {
    let out = match op {
        Token::Plus => lhs.checked_add(rhs),
        Token::Minus => lhs.checked_sub(rhs),
        Token::Asterisk => lhs.checked_mul(rhs),
        Token::Slash => {
            if rhs == 0 {
                return Err(AsmError::DivisionByZero { line: ctx.line });
            }
            lhs.checked_div(rhs)
        }
        Token::DoubleSlash => {
            if rhs == 0 {
                return Err(AsmError::DivisionByZero { line: ctx.line });
            }
            // Left operand scaled by the word radix before dividing.
            let wide = (lhs as i128) * (1i128 << 30) / (rhs as i128);
            i64::try_from(wide).ok()
        }
        Token::Colon => lhs.checked_mul(8).and_then(|v| v.checked_add(rhs)),
        _ => unreachable!("caller only passes binary operators"),
    };
    out.ok_or_else(|| ctx.bad("arithmetic overflow in expression"))
}

/// Evaluate a W-value: comma-separated `expr` or `expr(field)`
/// terms, each overwriting the named field of the accumulating word.
pub fn eval_wvalue(tokens: &[Token], ctx: &EvalContext) -> Result<Word, AsmError> {
    if tokens.is_empty() {
        return Err(ctx.bad("empty W-value"));
    }
    let mut w = Word::ZERO;
    for term in split_terms(tokens) {
        let (value_tokens, spec) = match term.iter().position(|t| *t == Token::LParen) {
            None => (term, FieldSpec::WORD),
            Some(open) => {
                if term.last() != Some(&Token::RParen) {
                    return Err(ctx.bad("field suffix is not closed"));
                }
                let f = eval_expression(&term[open + 1..term.len() - 1], ctx)?;
                let spec = u8::try_from(f)
                    .ok()
                    .and_then(FieldSpec::from_code)
                    .ok_or(AsmError::BadField {
                        line: ctx.line,
                        field: f,
                    })?;
                (&term[..open], spec)
            }
        };
        let value = eval_expression(value_tokens, ctx)?;
        w = w.with_field(Word::from_value(value), spec).without_overflow();
    }
    Ok(w)
}

/// Split on top-level commas.  Parentheses only ever hold a field
/// suffix, but commas never appear inside them anyway.
fn split_terms(tokens: &[Token]) -> Vec<&[Token]> {
    let mut terms = Vec::new();
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if *t == Token::Comma {
            terms.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    terms.push(&tokens[start..]);
    terms
}

/// Parse an instruction's address field `A[,I][(F)]`.
pub fn parse_address_field(tokens: &[Token], ctx: &EvalContext) -> Result<AddressField, AsmError> {
    // The field suffix comes last; strip it first.
    let (body, field) = match tokens.iter().position(|t| *t == Token::LParen) {
        None => (tokens, None),
        Some(open) => {
            if tokens.last() != Some(&Token::RParen) {
                return Err(ctx.bad("field suffix is not closed"));
            }
            let f = eval_expression(&tokens[open + 1..tokens.len() - 1], ctx)?;
            (&tokens[..open], Some(f))
        }
    };

    let (a_tokens, index) = match body.iter().position(|t| *t == Token::Comma) {
        None => (body, 0),
        Some(comma) => {
            let index = eval_expression(&body[comma + 1..], ctx)?;
            (&body[..comma], index)
        }
    };

    let a = parse_a_part(a_tokens, ctx)?;
    Ok(AddressField { a, index, field })
}

fn parse_a_part(tokens: &[Token], ctx: &EvalContext) -> Result<APart, AsmError> {
    if tokens.is_empty() {
        return Ok(APart::Empty);
    }
    // Literal constant: =expr=.
    if tokens.first() == Some(&Token::Equals) {
        if tokens.len() < 3 || tokens.last() != Some(&Token::Equals) {
            return Err(ctx.bad("malformed literal constant"));
        }
        let value = eval_expression(&tokens[1..tokens.len() - 1], ctx)?;
        return Ok(APart::Literal(value));
    }
    // A single symbol may be a reference to the future; anything
    // else must evaluate now.
    if let [Token::Symex(text)] = tokens {
        if !text.bytes().all(|b| b.is_ascii_digit()) {
            match classify(text) {
                SymbolRef::Global(name) => {
                    return Ok(match ctx.symbols.lookup_global(&name) {
                        Some(value) => APart::Value(value),
                        None => APart::ForwardGlobal(name),
                    });
                }
                SymbolRef::LocalBack(d) => {
                    return ctx
                        .symbols
                        .lookup_local_back(d)
                        .map(APart::Value)
                        .ok_or(AsmError::UndefinedSymbol {
                            line: ctx.line,
                            symbol: format!("{}B", d),
                        });
                }
                SymbolRef::LocalForward(d) => return Ok(APart::ForwardLocal(d)),
                SymbolRef::LocalDef(_) => {
                    return Err(AsmError::LocalMisuse {
                        line: ctx.line,
                        symbol: text.clone(),
                    });
                }
            }
        }
    }
    Ok(APart::Value(eval_expression(tokens, ctx)?))
}
