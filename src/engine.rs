use crate::diagnostic::Diagnostic;
use crate::emit::{ArithOp, Segment, VmWriter};
use crate::span::{Span, Spanned};
use crate::symtab::{SymbolTable, VarKind};
use crate::token::Token;

/// The three Jack subroutine flavors. The flavor decides the prologue and
/// whether a receiver argument is implicit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubroutineKind {
    Constructor,
    Function,
    Method,
}

/// How a subroutine call resolves at the call site.
enum Callee {
    /// `name(args)` — a method on the current class; receiver is `this`.
    SelfMethod(String),
    /// `var.name(args)` — the left identifier is a variable; the call is a
    /// method on its object, whose class is the variable's declared type.
    VarMethod {
        segment: Segment,
        index: u16,
        class: String,
        method: String,
    },
    /// `Class.name(args)` — the left identifier resolves in no scope and is
    /// taken as a class name; no receiver.
    StaticCall { class: String, method: String },
}

/// A binary operator's emission: a plain VM arithmetic command, or a call
/// into the Math runtime.
enum BinOp {
    Arith(ArithOp),
    MathCall(&'static str),
}

fn binary_op(token: &Token) -> Option<BinOp> {
    match token {
        Token::Plus => Some(BinOp::Arith(ArithOp::Add)),
        Token::Minus => Some(BinOp::Arith(ArithOp::Sub)),
        Token::Star => Some(BinOp::MathCall("Math.multiply")),
        Token::Slash => Some(BinOp::MathCall("Math.divide")),
        Token::Amp => Some(BinOp::Arith(ArithOp::And)),
        Token::Pipe => Some(BinOp::Arith(ArithOp::Or)),
        Token::Lt => Some(BinOp::Arith(ArithOp::Lt)),
        Token::Gt => Some(BinOp::Arith(ArithOp::Gt)),
        Token::Eq => Some(BinOp::Arith(ArithOp::Eq)),
        _ => None,
    }
}

/// Compilation engine: a recursive-descent parser over the Jack grammar
/// that emits VM code in place. No AST is built; each production consumes
/// tokens and writes instructions as it goes, driven by the symbol table.
pub struct Engine {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
    class_name: String,
    symbols: SymbolTable,
    writer: VmWriter,
    // Per-subroutine label counters. The IF_TRUE/IF_FALSE/IF_END trio
    // shares one index, the WHILE_EXP/WHILE_END pair the other.
    if_index: u32,
    while_index: u32,
}

impl Engine {
    /// `tokens` must end with `Token::Eof`, as produced by the lexer.
    pub fn new(tokens: Vec<Spanned<Token>>) -> Self {
        debug_assert!(matches!(tokens.last().map(|t| &t.node), Some(Token::Eof)));
        Self {
            tokens,
            pos: 0,
            class_name: String::new(),
            symbols: SymbolTable::new(),
            writer: VmWriter::new(),
            if_index: 0,
            while_index: 0,
        }
    }

    /// Compile one translation unit (exactly one class) to VM text.
    /// The first error abandons the unit.
    pub fn compile(mut self) -> Result<String, Diagnostic> {
        self.compile_class()?;
        if !self.at(&Token::Eof) {
            return Err(self.error_at_current(&format!(
                "expected end of file, found {}",
                self.peek().description()
            )));
        }
        Ok(self.writer.finish())
    }

    // --- Declarations ---

    fn compile_class(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Class)?;
        let name = self.expect_ident()?;
        self.class_name = name.node;
        self.expect(&Token::LBrace)?;
        while matches!(self.peek(), Token::Static | Token::Field) {
            self.compile_class_var_dec()?;
        }
        while matches!(
            self.peek(),
            Token::Constructor | Token::Function | Token::Method
        ) {
            self.compile_subroutine()?;
        }
        self.expect(&Token::RBrace)?;
        Ok(())
    }

    /// `('static'|'field') type name (',' name)* ';'` — populates class
    /// scope only; nothing is emitted.
    fn compile_class_var_dec(&mut self) -> Result<(), Diagnostic> {
        let kind = if self.eat(&Token::Static) {
            VarKind::Static
        } else {
            self.expect(&Token::Field)?;
            VarKind::Field
        };
        let ty = self.expect_type()?;
        loop {
            let name = self.expect_ident()?;
            self.define(&name, &ty, kind)?;
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Semicolon)?;
        Ok(())
    }

    fn compile_subroutine(&mut self) -> Result<(), Diagnostic> {
        let kind = match self.peek() {
            Token::Constructor => SubroutineKind::Constructor,
            Token::Method => SubroutineKind::Method,
            _ => SubroutineKind::Function,
        };
        self.advance();

        // Return type: 'void' or a type. Jack attaches no checked meaning
        // to it, so only its presence is enforced.
        if !self.eat(&Token::Void) {
            self.expect_type()?;
        }
        let name = self.expect_ident()?;

        self.symbols.start_subroutine();
        self.if_index = 0;
        self.while_index = 0;

        if kind == SubroutineKind::Method {
            let class = self.class_name.clone();
            // Fresh subroutine scope: "this" cannot collide.
            let _ = self.symbols.define("this", &class, VarKind::Argument);
        }

        self.expect(&Token::LParen)?;
        self.compile_parameter_list()?;
        self.expect(&Token::RParen)?;

        self.expect(&Token::LBrace)?;
        while self.at(&Token::Var) {
            self.compile_var_dec()?;
        }

        // All locals are known only now, so the function header waits for
        // the var declarations.
        let full_name = format!("{}.{}", self.class_name, name.node);
        self.writer
            .write_function(&full_name, self.symbols.var_count(VarKind::Local));

        match kind {
            SubroutineKind::Method => {
                // Anchor `this` to the caller-supplied receiver.
                self.writer.write_push(Segment::Argument, 0);
                self.writer.write_pop(Segment::Pointer, 0);
            }
            SubroutineKind::Constructor => {
                // Allocate the object and anchor `this` to its base.
                self.writer
                    .write_push(Segment::Constant, self.symbols.var_count(VarKind::Field));
                self.writer.write_call("Memory.alloc", 1);
                self.writer.write_pop(Segment::Pointer, 0);
            }
            SubroutineKind::Function => {}
        }

        self.compile_statements()?;
        self.expect(&Token::RBrace)?;
        Ok(())
    }

    fn compile_parameter_list(&mut self) -> Result<(), Diagnostic> {
        if self.at(&Token::RParen) {
            return Ok(());
        }
        loop {
            let ty = self.expect_type()?;
            let name = self.expect_ident()?;
            self.define(&name, &ty, VarKind::Argument)?;
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(())
    }

    fn compile_var_dec(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Var)?;
        let ty = self.expect_type()?;
        loop {
            let name = self.expect_ident()?;
            self.define(&name, &ty, VarKind::Local)?;
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::Semicolon)?;
        Ok(())
    }

    // --- Statements ---

    fn compile_statements(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.peek() {
                Token::Let => self.compile_let()?,
                Token::If => self.compile_if()?,
                Token::While => self.compile_while()?,
                Token::Do => self.compile_do()?,
                Token::Return => self.compile_return()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn compile_let(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Let)?;
        let name = self.expect_ident()?;
        let (segment, index) = self.resolve_var(&name)?;

        if self.eat(&Token::LBracket) {
            // Target address = base + offset.
            self.writer.write_push(segment, index);
            self.compile_expression()?;
            self.expect(&Token::RBracket)?;
            self.writer.write_arithmetic(ArithOp::Add);

            self.expect(&Token::Eq)?;
            self.compile_expression()?;
            self.expect(&Token::Semicolon)?;

            // The RHS may itself have used `that`, so the target address
            // is staged in temp 0 until the value is resolved.
            self.writer.write_pop(Segment::Temp, 0);
            self.writer.write_pop(Segment::Pointer, 1);
            self.writer.write_push(Segment::Temp, 0);
            self.writer.write_pop(Segment::That, 0);
        } else {
            self.expect(&Token::Eq)?;
            self.compile_expression()?;
            self.expect(&Token::Semicolon)?;
            self.writer.write_pop(segment, index);
        }
        Ok(())
    }

    fn compile_if(&mut self) -> Result<(), Diagnostic> {
        let k = self.if_index;
        self.if_index += 1;
        let if_true = format!("IF_TRUE{}", k);
        let if_false = format!("IF_FALSE{}", k);
        let if_end = format!("IF_END{}", k);

        self.expect(&Token::If)?;
        self.expect(&Token::LParen)?;
        self.compile_expression()?;
        self.expect(&Token::RParen)?;

        self.writer.write_if(&if_true);
        self.writer.write_goto(&if_false);
        self.writer.write_label(&if_true);

        self.expect(&Token::LBrace)?;
        self.compile_statements()?;
        self.expect(&Token::RBrace)?;

        if self.eat(&Token::Else) {
            self.writer.write_goto(&if_end);
            self.writer.write_label(&if_false);
            self.expect(&Token::LBrace)?;
            self.compile_statements()?;
            self.expect(&Token::RBrace)?;
            self.writer.write_label(&if_end);
        } else {
            self.writer.write_label(&if_false);
        }
        Ok(())
    }

    fn compile_while(&mut self) -> Result<(), Diagnostic> {
        let k = self.while_index;
        self.while_index += 1;
        let exp = format!("WHILE_EXP{}", k);
        let end = format!("WHILE_END{}", k);

        self.writer.write_label(&exp);
        self.expect(&Token::While)?;
        self.expect(&Token::LParen)?;
        self.compile_expression()?;
        self.expect(&Token::RParen)?;

        self.writer.write_arithmetic(ArithOp::Not);
        self.writer.write_if(&end);

        self.expect(&Token::LBrace)?;
        self.compile_statements()?;
        self.expect(&Token::RBrace)?;

        self.writer.write_goto(&exp);
        self.writer.write_label(&end);
        Ok(())
    }

    fn compile_do(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Do)?;
        self.compile_subroutine_call()?;
        self.expect(&Token::Semicolon)?;
        // Every Jack subroutine pushes exactly one value; a do statement
        // discards it.
        self.writer.write_pop(Segment::Temp, 0);
        Ok(())
    }

    fn compile_return(&mut self) -> Result<(), Diagnostic> {
        self.expect(&Token::Return)?;
        if self.at(&Token::Semicolon) {
            self.writer.write_push(Segment::Constant, 0);
        } else {
            self.compile_expression()?;
        }
        self.writer.write_return();
        self.expect(&Token::Semicolon)?;
        Ok(())
    }

    // --- Calls and expressions ---

    fn compile_subroutine_call(&mut self) -> Result<(), Diagnostic> {
        let first = self.expect_ident()?;

        let callee = if self.eat(&Token::Dot) {
            let method = self.expect_ident()?;
            match self.symbols.lookup(&first.node) {
                Some(sym) => Callee::VarMethod {
                    segment: sym.kind.segment(),
                    index: sym.index,
                    class: sym.ty.clone(),
                    method: method.node,
                },
                None => Callee::StaticCall {
                    class: first.node,
                    method: method.node,
                },
            }
        } else {
            Callee::SelfMethod(first.node)
        };

        // The receiver occupies argument 0, so it is pushed before the
        // argument expressions.
        match &callee {
            Callee::SelfMethod(_) => self.writer.write_push(Segment::Pointer, 0),
            Callee::VarMethod { segment, index, .. } => self.writer.write_push(*segment, *index),
            Callee::StaticCall { .. } => {}
        }

        self.expect(&Token::LParen)?;
        let n_args = self.compile_expression_list()?;
        self.expect(&Token::RParen)?;

        match callee {
            Callee::SelfMethod(method) => {
                let full = format!("{}.{}", self.class_name, method);
                self.writer.write_call(&full, n_args + 1);
            }
            Callee::VarMethod { class, method, .. } => {
                self.writer
                    .write_call(&format!("{}.{}", class, method), n_args + 1);
            }
            Callee::StaticCall { class, method } => {
                self.writer
                    .write_call(&format!("{}.{}", class, method), n_args);
            }
        }
        Ok(())
    }

    /// `term (op term)*`. Jack has no operator precedence: evaluation is
    /// strictly left to right, so each operator is emitted right after its
    /// right-hand term.
    fn compile_expression(&mut self) -> Result<(), Diagnostic> {
        self.compile_term()?;
        while let Some(op) = binary_op(self.peek()) {
            self.advance();
            self.compile_term()?;
            match op {
                BinOp::Arith(a) => self.writer.write_arithmetic(a),
                BinOp::MathCall(name) => self.writer.write_call(name, 2),
            }
        }
        Ok(())
    }

    fn compile_term(&mut self) -> Result<(), Diagnostic> {
        match self.peek().clone() {
            Token::IntConst(n) => {
                self.advance();
                self.writer.write_push(Segment::Constant, n);
            }
            Token::StrConst(text) => {
                self.advance();
                self.compile_string_constant(&text);
            }
            Token::True => {
                self.advance();
                self.writer.write_push(Segment::Constant, 0);
                self.writer.write_arithmetic(ArithOp::Not);
            }
            Token::False | Token::Null => {
                self.advance();
                self.writer.write_push(Segment::Constant, 0);
            }
            Token::This => {
                self.advance();
                self.writer.write_push(Segment::Pointer, 0);
            }
            Token::LParen => {
                self.advance();
                self.compile_expression()?;
                self.expect(&Token::RParen)?;
            }
            Token::Minus => {
                self.advance();
                self.compile_term()?;
                self.writer.write_arithmetic(ArithOp::Neg);
            }
            Token::Tilde => {
                self.advance();
                self.compile_term()?;
                self.writer.write_arithmetic(ArithOp::Not);
            }
            Token::Ident(_) => match self.peek_next() {
                Token::LBracket => {
                    let name = self.expect_ident()?;
                    let (segment, index) = self.resolve_var(&name)?;
                    self.writer.write_push(segment, index);
                    self.expect(&Token::LBracket)?;
                    self.compile_expression()?;
                    self.expect(&Token::RBracket)?;
                    self.writer.write_arithmetic(ArithOp::Add);
                    self.writer.write_pop(Segment::Pointer, 1);
                    self.writer.write_push(Segment::That, 0);
                }
                Token::LParen | Token::Dot => self.compile_subroutine_call()?,
                _ => {
                    let name = self.expect_ident()?;
                    let (segment, index) = self.resolve_var(&name)?;
                    self.writer.write_push(segment, index);
                }
            },
            other => {
                return Err(self
                    .error_at_current(&format!("expected a term, found {}", other.description()))
                    .with_help(
                        "a term is a constant, a variable, a call, '(' expression ')', \
                         or a unary '-'/'~' application"
                            .to_string(),
                    ));
            }
        }
        Ok(())
    }

    /// A string constant builds a runtime String object: one `String.new`
    /// call, then one `appendChar` per code unit. `appendChar` returns the
    /// string, leaving the reference on the stack.
    fn compile_string_constant(&mut self, text: &str) {
        self.writer
            .write_push(Segment::Constant, text.chars().count() as u16);
        self.writer.write_call("String.new", 1);
        for ch in text.chars() {
            self.writer.write_push(Segment::Constant, ch as u16);
            self.writer.write_call("String.appendChar", 2);
        }
    }

    fn compile_expression_list(&mut self) -> Result<u16, Diagnostic> {
        let mut n = 0;
        if !self.at(&Token::RParen) {
            self.compile_expression()?;
            n += 1;
            while self.eat(&Token::Comma) {
                self.compile_expression()?;
                n += 1;
            }
        }
        Ok(n)
    }

    // --- Symbol-table bridges ---

    fn define(
        &mut self,
        name: &Spanned<String>,
        ty: &str,
        kind: VarKind,
    ) -> Result<(), Diagnostic> {
        self.symbols
            .define(&name.node, ty, kind)
            .map(|_| ())
            .map_err(|_| {
                Diagnostic::error(
                    format!("'{}' is already defined in this scope", name.node),
                    name.span,
                )
                .with_help("each name may be declared once per scope".to_string())
            })
    }

    fn resolve_var(&self, name: &Spanned<String>) -> Result<(Segment, u16), Diagnostic> {
        match self.symbols.lookup(&name.node) {
            Some(sym) => Ok((sym.kind.segment(), sym.index)),
            None => Err(Diagnostic::error(
                format!("undefined variable '{}'", name.node),
                name.span,
            )
            .with_help(
                "declare it with 'var', 'field', 'static', or as a parameter".to_string(),
            )),
        }
    }

    // --- Cursor utilities ---

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].node
    }

    /// One token of lookahead past the current one; saturates at Eof.
    fn peek_next(&self) -> &Token {
        let i = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[i].node
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn at(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<Span, Diagnostic> {
        if self.at(token) {
            let span = self.current_span();
            self.advance();
            Ok(span)
        } else {
            Err(self.error_at_current(&format!(
                "expected {}, found {}",
                token.description(),
                self.peek().description()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<Spanned<String>, Diagnostic> {
        if let Token::Ident(name) = self.peek().clone() {
            let span = self.current_span();
            self.advance();
            Ok(Spanned::new(name, span))
        } else {
            Err(self.error_at_current(&format!(
                "expected identifier, found {}",
                self.peek().description()
            )))
        }
    }

    /// `int`, `char`, `boolean`, or a class name.
    fn expect_type(&mut self) -> Result<String, Diagnostic> {
        let ty = match self.peek() {
            Token::Int => "int".to_string(),
            Token::Char => "char".to_string(),
            Token::Boolean => "boolean".to_string(),
            Token::Ident(name) => name.clone(),
            other => {
                return Err(self
                    .error_at_current(&format!("expected a type, found {}", other.description()))
                    .with_help(
                        "a type is 'int', 'char', 'boolean', or a class name".to_string(),
                    ));
            }
        };
        self.advance();
        Ok(ty)
    }

    fn error_at_current(&self, msg: &str) -> Diagnostic {
        Diagnostic::error(msg.to_string(), self.current_span())
    }
}
