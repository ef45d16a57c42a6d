/// Drops Z and M ordinates from a WKT string.
///
/// Works on the token level: dimension tags (`Z`, `M`, `ZM`) after a geometry
/// keyword are removed and every coordinate tuple keeps its first two numbers.
/// Text that is not WKT passes through with only those two rewrites applied.
pub fn flatten_to_2d(wkt: &str) -> String {
    let mut flattened = String::with_capacity(wkt.len());
    let mut segment = String::new();

    for ch in wkt.chars() {
        if matches!(ch, '(' | ')' | ',') {
            flattened.push_str(&flatten_segment(&segment));
            segment.clear();
            flattened.push(ch);
        } else {
            segment.push(ch);
        }
    }
    flattened.push_str(&flatten_segment(&segment));

    flattened
}

fn flatten_segment(segment: &str) -> String {
    let tokens: Vec<&str> = segment.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return segment.to_string();
    };

    let leading = &segment[..segment.len() - segment.trim_start().len()];
    let trailing = &segment[segment.trim_end().len()..];

    let kept: Vec<&str> = if first.parse::<f64>().is_ok() {
        tokens.into_iter().take(2).collect()
    } else {
        tokens.into_iter().filter(|token| !is_dimension_tag(token)).collect()
    };

    format!("{}{}{}", leading, kept.join(" "), trailing)
}

fn is_dimension_tag(token: &str) -> bool {
    token.eq_ignore_ascii_case("Z") || token.eq_ignore_ascii_case("M") || token.eq_ignore_ascii_case("ZM")
}
