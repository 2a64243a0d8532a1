/* Convert an infix regular expression into postfix using the shunting-yard algorithm.
 * Concatenation may be implicit in the input ("ab"), so it is made explicit before the
 * operators are reordered. */

use color_eyre::eyre::{Report, Result};
use std::fmt;
use tracing::{debug, trace};

use crate::fa::EPSILON_MARKER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(char),
    Epsilon,
    /// Union keeps the character it was written with, `|` or `+`.
    Union(char),
    Concat,
    Star,
    LParen,
    RParen,
}

impl Token {
    fn classify(ch: char, epsilon: char) -> Self {
        if ch == epsilon {
            return Token::Epsilon;
        }
        match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '|' | '+' => Token::Union(ch),
            '.' => Token::Concat,
            '*' => Token::Star,
            _ => Token::Literal(ch),
        }
    }

    // Parentheses never compete on precedence
    fn precedence(self) -> u8 {
        match self {
            Token::Star => 3,
            Token::Concat => 2,
            Token::Union(_) => 1,
            _ => 0,
        }
    }

    fn ends_operand(self) -> bool {
        matches!(
            self,
            Token::Literal(_) | Token::Epsilon | Token::Star | Token::RParen
        )
    }

    fn starts_operand(self) -> bool {
        matches!(self, Token::Literal(_) | Token::Epsilon | Token::LParen)
    }

    fn write(self, f: &mut fmt::Formatter<'_>, epsilon: char) -> fmt::Result {
        match self {
            Token::Literal(ch) | Token::Union(ch) => write!(f, "{}", ch),
            Token::Epsilon => write!(f, "{}", epsilon),
            Token::Concat => write!(f, "."),
            Token::Star => write!(f, "*"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug)]
pub enum RegExError {
    UnbalancedParenthesis(String),
    InvalidEpsilon(char),
}

impl std::fmt::Display for RegExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegExError::UnbalancedParenthesis(regex) => {
                write!(f, "Error: {} has unbalanced parenthesis!", regex)
            }
            RegExError::InvalidEpsilon(epsilon) => {
                write!(f, "Error: {:?} can not be used as the epsilon marker!", epsilon)
            }
        }
    }
}

impl std::error::Error for RegExError {}

/// A regular expression in postfix (reverse Polish) order, ready for Thompson construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Postfix {
    tokens: Vec<Token>,
    epsilon: char,
}

impl Postfix {
    /// Wrap an already ordered token sequence. No validation happens here; a malformed
    /// sequence is rejected when the NFA is built from it.
    pub fn from_tokens(tokens: Vec<Token>, epsilon: char) -> Self {
        Postfix { tokens, epsilon }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn get_epsilon(&self) -> char {
        self.epsilon
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            token.write(f, self.epsilon)?;
        }
        Ok(())
    }
}

/// Split the expression into tokens and insert the implicit concatenations. Whitespace is
/// dropped before concatenations are inserted, so "a b" reads the same as "ab".
pub fn tokenize(regex: &str, epsilon: char) -> Vec<Token> {
    let mut result: Vec<Token> = Vec::with_capacity(regex.len() * 2);

    for ch in regex.chars().filter(|ch| !ch.is_whitespace()) {
        let token = Token::classify(ch, epsilon);

        if let Some(&prev) = result.last() {
            if prev.ends_operand() && token.starts_operand() {
                result.push(Token::Concat);
            }
        }
        result.push(token);
    }
    result
}

/// The epsilon marker must survive tokenizing: whitespace is dropped and operator characters
/// already have a meaning.
pub fn check_epsilon(epsilon: char) -> Result<()> {
    if epsilon.is_whitespace() || matches!(epsilon, '(' | ')' | '|' | '+' | '.' | '*') {
        let err = Report::new(RegExError::InvalidEpsilon(epsilon));
        return Err(err);
    }
    Ok(())
}

/// Convert an infix expression into postfix. `epsilon` is the character that stands for
/// the empty string inside the expression.
pub fn parse(regex: &str, epsilon: char) -> Result<Postfix> {
    check_epsilon(epsilon)?;
    let tokens = tokenize(regex, epsilon);

    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<Token> = Vec::new();

    for token in tokens {
        match token {
            Token::Literal(_) | Token::Epsilon => output.push(token),
            Token::LParen => stack.push(token),
            Token::RParen => loop {
                match stack.pop() {
                    Some(Token::LParen) => break,
                    Some(operator) => output.push(operator),
                    None => {
                        let err = Report::new(RegExError::UnbalancedParenthesis(regex.to_string()));
                        return Err(err);
                    }
                }
            },
            Token::Star | Token::Concat | Token::Union(_) => {
                while let Some(&top) = stack.last() {
                    if top == Token::LParen || top.precedence() < token.precedence() {
                        break;
                    }
                    output.push(top);
                    stack.pop();
                }
                stack.push(token);
            }
        }
        trace!(?token, ?stack, "shunting-yard step");
    }

    while let Some(operator) = stack.pop() {
        if matches!(operator, Token::LParen | Token::RParen) {
            let err = Report::new(RegExError::UnbalancedParenthesis(regex.to_string()));
            return Err(err);
        }
        output.push(operator);
    }

    let postfix = Postfix::from_tokens(output, epsilon);
    debug!(regex, %postfix, "converted expression to postfix");
    Ok(postfix)
}

/// Same as [`parse`] with `ε` as the epsilon marker.
pub fn to_postfix(regex: &str) -> Result<Postfix> {
    parse(regex, EPSILON_MARKER)
}
