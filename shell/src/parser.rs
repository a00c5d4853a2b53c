use log::warn;
use thiserror::Error;

use crate::config::Limits;
use crate::types::*;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
	Word(Vec<u8>),
	Pipe,
	RedirectIn,
	RedirectOut,
	Background,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("empty command")]
	EmptyCommand,
	#[error("missing file name after '{0}'")]
	MissingRedirectTarget(char),
	#[error("unexpected '&'")]
	MisplacedBackground,
	#[error("too many pipeline stages (limit {0})")]
	TooManyStages(usize),
}

pub type ParseResult<T> = Result<T, ParseError>;

struct Tokenizer<'a> {
	line: &'a [u8],
	i: usize,
}

impl<'a> Tokenizer<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n')
	}

	fn is_quote(c: u8) -> bool {
		c == b'"' || c == b'\''
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Tokenizer::is_whitespace);
	}

	// Contents up to the matching quote, or to end of line if there is none.
	fn read_quoted(&mut self, quote: u8, buf: &mut Vec<u8>) {
		self.i += 1;
		let orig = self.i;
		self.proceed_while(|c| c != quote);
		buf.extend_from_slice(&self.line[orig .. self.i]);
		if self.i < self.line.len() {
			self.i += 1;
		}
	}

	fn read_token(&mut self) -> Option<Token> {
		self.skip_whitespaces();
		if self.i >= self.line.len() {
			return None;
		}
		let mut buf: Vec<u8> = vec![];
		let mut quoted = false;
		while let Some(&c) = self.line.get(self.i) {
			if Tokenizer::is_whitespace(c) {
				break;
			} else if Tokenizer::is_quote(c) {
				quoted = true;
				self.read_quoted(c, &mut buf);
			} else {
				let orig = self.i;
				self.proceed_while(|c| !Tokenizer::is_whitespace(c) && !Tokenizer::is_quote(c));
				buf.extend_from_slice(&self.line[orig .. self.i]);
			}
		}
		if quoted {
			return Some(Token::Word(buf));
		}
		let op = match &buf[..] {
			b"|" => Some(Token::Pipe),
			b"<" => Some(Token::RedirectIn),
			b">" => Some(Token::RedirectOut),
			b"&" => Some(Token::Background),
			_ => None,
		};
		Some(op.unwrap_or(Token::Word(buf)))
	}
}

/// Splits a line on unquoted whitespace. Quotes are stripped and their
/// contents kept verbatim; an unterminated quote runs to end of line.
/// Operators are recognised only as whole unquoted tokens. At most
/// `max_args` tokens are returned.
pub fn tokenize(line: &[u8], max_args: usize) -> Vec<Token> {
	let mut tokenizer = Tokenizer { line: line, i: 0 };
	let mut tokens: Vec<Token> = vec![];
	while let Some(token) = tokenizer.read_token() {
		if tokens.len() == max_args {
			warn!("input exceeds {} tokens, dropping the rest", max_args);
			break;
		}
		tokens.push(token);
	}
	tokens
}

/// Partitions tokens at each `|`. Always yields at least one stage;
/// leading, trailing or doubled separators yield empty stages.
pub fn split_pipeline(tokens: Vec<Token>) -> Vec<Vec<Token>> {
	let mut stages: Vec<Vec<Token>> = vec![vec![]];
	for token in tokens {
		match token {
			Token::Pipe => stages.push(vec![]),
			t => stages.last_mut().expect("stages is never empty").push(t),
		}
	}
	stages
}

/// Builds one stage, stripping redirection operators and their file names
/// from the argument list.
fn parse_command(tokens: Vec<Token>) -> ParseResult<Command> {
	let mut words: Vec<Vec<u8>> = vec![];
	let mut redirects: Vec<Redirect> = vec![];
	let mut iter = tokens.into_iter();
	while let Some(token) = iter.next() {
		let (typ, op) = match token {
			Token::Word(w) => {
				words.push(w);
				continue;
			},
			Token::RedirectIn => (RedirectType::Input, '<'),
			Token::RedirectOut => (RedirectType::Output, '>'),
			Token::Background => { return Err(ParseError::MisplacedBackground); },
			Token::Pipe => unreachable!("pipe tokens are consumed by split_pipeline"),
		};
		match iter.next() {
			Some(Token::Word(target)) => redirects.push(Redirect { target: target, typ: typ }),
			_ => { return Err(ParseError::MissingRedirectTarget(op)); },
		}
	}
	let mut words = words.into_iter();
	let name = match words.next() {
		Some(name) => name,
		None => { return Err(ParseError::EmptyCommand); },
	};
	Ok(Command { name: name, arguments: words.collect(), redirects: redirects })
}

/// Parses a whole input line. `Ok(None)` means there was nothing to run.
pub fn parse(line: &[u8], limits: &Limits) -> ParseResult<Option<Pipeline>> {
	let mut tokens = tokenize(line, limits.max_args);
	if tokens.is_empty() {
		return Ok(None);
	}
	let is_background = tokens.last() == Some(&Token::Background);
	if is_background {
		tokens.pop();
	}
	let stages = split_pipeline(tokens);
	if stages.len() > limits.max_stages {
		return Err(ParseError::TooManyStages(limits.max_stages));
	}
	let commands = stages.into_iter().map(parse_command).collect::<ParseResult<Vec<Command>>>()?;
	Ok(Some(Pipeline { commands: commands, is_background: is_background }))
}
