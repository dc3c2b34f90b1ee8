//! sdspi-store - Row codec
//!
//! One record per line, fields separated by commas. A field holding a comma
//! or a quote is wrapped in quotes with its own quotes doubled.

const SEPARATOR: char = ',';
const QUOTE: char = '"';

fn needs_quotes(field: &str) -> bool {
    field.contains(SEPARATOR) || field.contains(QUOTE)
}

/// Encode `fields` as one newline-terminated line.
///
/// A record made of a single empty field is written as `""`, so that it does
/// not read back as an empty line.
pub fn encode<S>(fields: &[S]) -> String
where
    S: AsRef<str>,
{
    let mut line = String::new();
    for (idx, field) in fields.iter().enumerate() {
        let field = field.as_ref();
        if idx > 0 {
            line.push(SEPARATOR);
        }
        if needs_quotes(field) || (fields.len() == 1 && field.is_empty()) {
            line.push(QUOTE);
            for c in field.chars() {
                if c == QUOTE {
                    line.push(QUOTE);
                }
                line.push(c);
            }
            line.push(QUOTE);
        } else {
            line.push_str(field);
        }
    }
    line.push('\n');
    line
}

/// Decode one line into its fields. Scanning stops at the first `\r` or `\n`,
/// inside quotes or not. An empty line holds no fields at all.
pub fn decode(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Set once anything, even an empty quoted string, belongs to `field`.
    let mut pending = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            QUOTE if in_quotes && chars.peek() == Some(&QUOTE) => {
                chars.next();
                field.push(QUOTE);
            }
            QUOTE => {
                in_quotes = !in_quotes;
                pending = true;
            }
            SEPARATOR if !in_quotes => {
                fields.push(core::mem::take(&mut field));
                pending = true;
            }
            '\r' | '\n' => break,
            c => {
                field.push(c);
                pending = true;
            }
        }
    }
    if pending {
        fields.push(field);
    }
    fields
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
