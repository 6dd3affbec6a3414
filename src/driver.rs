use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::compile_source;
use crate::diagnostic::render_diagnostics;

/// Outcome of a batch run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    pub compiled: usize,
    pub failed: usize,
}

/// Expand the CLI path argument to the list of translation units.
///
/// A directory contributes its top-level `.jack` entries, sorted so batch
/// output order is deterministic; subdirectories are ignored. A file must
/// carry the `.jack` extension.
pub fn discover_units(input: &Path) -> io::Result<Vec<PathBuf>> {
    if input.is_dir() {
        let mut units: Vec<PathBuf> = fs::read_dir(input)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|e| e == "jack"))
            .collect();
        units.sort();
        Ok(units)
    } else if input.extension().is_some_and(|e| e == "jack") {
        Ok(vec![input.to_path_buf()])
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' is not a .jack file or directory", input.display()),
        ))
    }
}

/// Compile every unit under `input`, a `.vm` sibling per `.jack` file.
///
/// Units are independent, so the batch is compiled in parallel at the file
/// boundary. A failed unit is reported and the rest of the batch continues.
/// With `check` set the full pipeline runs but nothing is written.
pub fn run(input: &Path, check: bool) -> io::Result<Summary> {
    let units = discover_units(input)?;
    if units.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no .jack files found in '{}'", input.display()),
        ));
    }

    let failed: usize = units
        .par_iter()
        .map(|unit| usize::from(!compile_unit(unit, check)))
        .sum();

    Ok(Summary {
        compiled: units.len() - failed,
        failed,
    })
}

fn compile_unit(unit: &Path, check: bool) -> bool {
    let filename = unit.display().to_string();
    let source = match fs::read_to_string(unit) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", filename, e);
            return false;
        }
    };

    let vm = match compile_source(&source) {
        Ok(vm) => vm,
        Err(diagnostics) => {
            render_diagnostics(&diagnostics, &filename, &source);
            return false;
        }
    };

    if check {
        return true;
    }

    let out_path = unit.with_extension("vm");
    if let Err(e) = fs::write(&out_path, vm) {
        eprintln!("error: cannot write '{}': {}", out_path.display(), e);
        return false;
    }
    eprintln!("Compiled -> {}", out_path.display());
    true
}
