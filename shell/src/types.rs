#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectType { Input, Output }

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Redirect {
	pub target: Vec<u8>,
	pub typ: RedirectType,
}

/// One pipeline stage. `name` is also `argv[0]`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Command {
	pub name: Vec<u8>,
	pub arguments: Vec<Vec<u8>>,
	pub redirects: Vec<Redirect>,
}

impl Command {
	pub fn display_name(&self) -> String {
		String::from_utf8_lossy(&self.name).into_owned()
	}
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pipeline {
	pub commands: Vec<Command>,
	pub is_background: bool,
}
