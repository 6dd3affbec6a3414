use std::fmt;

/// A VM memory segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
    Constant,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Argument => "argument",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
            Segment::Constant => "constant",
        };
        f.write_str(name)
    }
}

/// A VM arithmetic-logical command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Neg => "neg",
            ArithOp::Eq => "eq",
            ArithOp::Gt => "gt",
            ArithOp::Lt => "lt",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Not => "not",
        };
        f.write_str(name)
    }
}

/// VM writer: formats stack-machine instructions one per line, no
/// indentation. Output is buffered so a failed compilation leaves nothing
/// behind.
#[derive(Default)]
pub struct VmWriter {
    lines: Vec<String>,
}

impl VmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_push(&mut self, segment: Segment, index: u16) {
        self.lines.push(format!("push {} {}", segment, index));
    }

    pub fn write_pop(&mut self, segment: Segment, index: u16) {
        debug_assert!(segment != Segment::Constant, "cannot pop to constant");
        self.lines.push(format!("pop {} {}", segment, index));
    }

    pub fn write_arithmetic(&mut self, op: ArithOp) {
        self.lines.push(op.to_string());
    }

    pub fn write_label(&mut self, label: &str) {
        self.lines.push(format!("label {}", label));
    }

    pub fn write_goto(&mut self, label: &str) {
        self.lines.push(format!("goto {}", label));
    }

    pub fn write_if(&mut self, label: &str) {
        self.lines.push(format!("if-goto {}", label));
    }

    pub fn write_call(&mut self, name: &str, n_args: u16) {
        self.lines.push(format!("call {} {}", name, n_args));
    }

    pub fn write_function(&mut self, name: &str, n_locals: u16) {
        self.lines.push(format!("function {} {}", name, n_locals));
    }

    pub fn write_return(&mut self) {
        self.lines.push("return".to_string());
    }

    /// The finished translation unit, newline-terminated.
    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
