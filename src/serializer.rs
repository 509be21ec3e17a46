use crate::map::EnvMap;

/// Characters escaped inside double quotes, in replacement order.
///
/// `$` is left alone so that references survive a write/read round trip.
const DOUBLE_QUOTE_SPECIAL_CHARS: [char; 6] = ['\\', '\n', '\r', '"', '!', '`'];

/// Render `map` as dotenv text, one `KEY="VALUE"` line per entry in map order.
///
/// The output always ends with a newline.
pub fn marshal(map: &EnvMap) -> String {
    let lines: Vec<String> = map
        .iter()
        .map(|(key, value)| format!("{key}=\"{}\"", double_quote_escape(value)))
        .collect();
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn double_quote_escape(value: &str) -> String {
    let mut out = value.to_owned();
    for ch in DOUBLE_QUOTE_SPECIAL_CHARS {
        if !out.contains(ch) {
            continue;
        }
        let escaped = match ch {
            '\n' => "\\n".to_owned(),
            '\r' => "\\r".to_owned(),
            other => format!("\\{other}"),
        };
        out = out.replace(ch, &escaped);
    }
    out
}
