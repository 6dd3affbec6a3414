pub mod diagnostic;
pub mod driver;
pub mod emit;
pub mod engine;
pub mod lexer;
pub mod span;
pub mod symtab;
pub mod token;

use diagnostic::Diagnostic;
use engine::Engine;
use lexer::Lexer;

/// Compile one Jack translation unit to VM text.
///
/// Lex errors and the first parse/resolution error are fatal for the unit;
/// no partial output is produced.
pub fn compile_source(source: &str) -> Result<String, Vec<Diagnostic>> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }
    Engine::new(tokens).compile().map_err(|diag| vec![diag])
}
