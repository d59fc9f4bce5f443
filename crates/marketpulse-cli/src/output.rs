//! JSON rendering to stdout.

use std::io::{self, Write};

use serde::Serialize;

use crate::error::CliError;

/// Writes `value` as one JSON document followed by a newline.
pub fn render<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    write_json(&mut stdout, value, pretty)?;
    stdout.flush()?;
    Ok(())
}

/// Writes one NDJSON line and flushes so consumers see it immediately.
pub fn render_line<T: Serialize>(value: &T) -> Result<(), CliError> {
    render(value, false)
}

fn write_json<W: Write, T: Serialize>(
    writer: &mut W,
    value: &T,
    pretty: bool,
) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, value)?;
    } else {
        serde_json::to_writer(&mut *writer, value)?;
    }
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_output_is_a_single_line() {
        let mut buffer = Vec::new();
        write_json(&mut buffer, &serde_json::json!({"a": [1, 2]}), false).expect("write");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "{\"a\":[1,2]}\n");
    }

    #[test]
    fn pretty_output_is_indented() {
        let mut buffer = Vec::new();
        write_json(&mut buffer, &serde_json::json!({"a": 1}), true).expect("write");
        assert_eq!(String::from_utf8(buffer).expect("utf8"), "{\n  \"a\": 1\n}\n");
    }
}
