use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{Operation, OperationKind, Workload, WorkloadError};

/// Loads a workload file. Only a failure to open or read the file is fatal;
/// lines with an unknown opcode or missing arguments are logged and skipped.
pub fn load(path: impl AsRef<Path>) -> Result<Workload, WorkloadError> {
    let path = path.as_ref();
    log::info!("Parsing workload {} ...", path.display());

    let file = File::open(path).map_err(|source| WorkloadError::MalformedWorkload {
        path: path.to_path_buf(),
        source,
    })?;
    let mut workload = parse(BufReader::new(file)).map_err(|e| match e {
        WorkloadError::MalformedWorkload { source, .. } => WorkloadError::MalformedWorkload {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    workload.set_path(path);

    log::info!(
        "Parsing complete: {} queries from {}",
        workload.total_num(),
        path.display()
    );
    Ok(workload)
}

/// Parses a workload from any buffered reader, one operation per line.
pub fn parse<R: BufRead>(mut reader: R) -> Result<Workload, WorkloadError> {
    let mut workload = Workload::default();
    let mut buffer = Vec::new();
    let mut line_no = 0;

    loop {
        buffer.clear();
        let read = reader
            .read_until(b'\n', &mut buffer)
            .map_err(|source| WorkloadError::MalformedWorkload {
                path: Default::default(),
                source,
            })?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let line = String::from_utf8_lossy(&buffer);
        match parse_line(line_no, &line) {
            Ok(Some(op)) => workload.push(op),
            Ok(None) => {}
            Err(e) => log::warn!("Skipping workload line: {}", e),
        }
    }

    workload.seal();
    Ok(workload)
}

/// Parses a single line. Blank lines yield `Ok(None)`.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Operation>, WorkloadError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(None);
    }

    let mut opcode_chars = parts[0].chars();
    let kind = match (opcode_chars.next(), opcode_chars.next()) {
        (Some(c), None) => OperationKind::from_opcode(c),
        _ => None,
    }
    .ok_or_else(|| WorkloadError::UnknownOperationCode {
        line: line_no,
        opcode: parts[0].to_string(),
    })?;

    let args = &parts[1..];
    if args.len() < kind.arity() {
        return Err(WorkloadError::MissingArgument {
            line: line_no,
            opcode: kind.opcode(),
        });
    }
    if args.len() > kind.arity() {
        log::debug!(
            "Ignoring {} trailing token(s) on line {}",
            args.len() - kind.arity(),
            line_no
        );
    }

    Ok(Some(Operation::from_args(kind, args)))
}
