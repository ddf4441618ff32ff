//! RFC 6570 URI template parsing and expansion.
//!
//! Supports level 4 templates: the `+ # . / ; ? &` operators, the explode
//! modifier (`*`), and the prefix modifier (`:N`). Used both to materialize
//! [`crate::types::ResourceTemplate`] URIs and, reduced to an anchored regex,
//! to match subscription templates against concrete resource URIs.

use std::collections::HashMap;
use std::fmt;

/// A value bound to a template variable during expansion.
#[derive(Debug, Clone)]
pub enum TemplateValue {
    /// A single scalar value.
    Scalar(String),
    /// An ordered list, relevant to the explode modifier.
    List(Vec<String>),
    /// An associative map, relevant to the explode modifier.
    AssocList(Vec<(String, String)>),
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::Scalar(s.to_owned())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::Scalar(s)
    }
}

impl From<i64> for TemplateValue {
    fn from(n: i64) -> Self {
        TemplateValue::Scalar(n.to_string())
    }
}

/// Variable bindings supplied to [`UriTemplate::expand`].
pub type Variables = HashMap<String, TemplateValue>;

/// Error returned when a template fails to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParseError(pub String);

impl fmt::Display for TemplateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid URI template: {}", self.0)
    }
}

impl std::error::Error for TemplateParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Simple,
    Plus,
    Hash,
    Dot,
    Slash,
    Semicolon,
    Question,
    Amp,
}

impl Operator {
    fn from_char(c: Option<char>) -> Self {
        match c {
            Some('+') => Operator::Plus,
            Some('#') => Operator::Hash,
            Some('.') => Operator::Dot,
            Some('/') => Operator::Slash,
            Some(';') => Operator::Semicolon,
            Some('?') => Operator::Question,
            Some('&') => Operator::Amp,
            _ => Operator::Simple,
        }
    }

    fn separator(self) -> char {
        match self {
            Operator::Simple | Operator::Plus | Operator::Hash => ',',
            Operator::Dot => '.',
            Operator::Slash => '/',
            Operator::Semicolon => ';',
            Operator::Question | Operator::Amp => '&',
        }
    }

    fn first_prefix(self) -> Option<char> {
        match self {
            Operator::Simple | Operator::Plus => None,
            Operator::Hash => Some('#'),
            Operator::Dot => Some('.'),
            Operator::Slash => Some('/'),
            Operator::Semicolon => Some(';'),
            Operator::Question => Some('?'),
            Operator::Amp => Some('&'),
        }
    }

    /// Whether reserved characters are left unencoded (`+`/`#`).
    fn preserves_reserved(self) -> bool {
        matches!(self, Operator::Plus | Operator::Hash)
    }

    /// Whether an empty-valued named variable still emits `name` or `name=`.
    fn names_values(self) -> bool {
        matches!(self, Operator::Semicolon | Operator::Question | Operator::Amp)
    }
}

#[derive(Debug, Clone)]
enum VarModifier {
    None,
    Explode,
    Prefix(u32),
}

#[derive(Debug, Clone)]
struct VarSpec {
    name: String,
    modifier: VarModifier,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Expression { operator: Operator, vars: Vec<VarSpec> },
}

/// A parsed RFC 6570 URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    original: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parses `pattern`, rejecting mismatched braces, empty expressions,
    /// empty variable names, and invalid prefix lengths.
    pub fn parse(pattern: &str) -> Result<Self, TemplateParseError> {
        let mut segments = Vec::new();
        let mut chars = pattern.chars().peekable();
        let mut literal = String::new();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut expr = String::new();
                    let mut closed = false;
                    for c2 in chars.by_ref() {
                        if c2 == '}' {
                            closed = true;
                            break;
                        }
                        if c2 == '{' {
                            return Err(TemplateParseError("nested '{' in expression".into()));
                        }
                        expr.push(c2);
                    }
                    if !closed {
                        return Err(TemplateParseError("unterminated expression".into()));
                    }
                    if expr.is_empty() {
                        return Err(TemplateParseError("empty expression".into()));
                    }
                    segments.push(Self::parse_expression(&expr)?);
                }
                '}' => {
                    return Err(TemplateParseError("unmatched '}'".into()));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            original: pattern.to_owned(),
            segments,
        })
    }

    fn parse_expression(expr: &str) -> Result<Segment, TemplateParseError> {
        let mut chars = expr.chars().peekable();
        let operator = Operator::from_char(chars.peek().copied().filter(|c| {
            matches!(c, '+' | '#' | '.' | '/' | ';' | '?' | '&')
        }));
        let rest: String = if operator == Operator::Simple {
            expr.to_owned()
        } else {
            chars.next();
            chars.collect()
        };
        if rest.is_empty() {
            return Err(TemplateParseError("expression has no variables".into()));
        }

        let mut vars = Vec::new();
        for raw in rest.split(',') {
            if raw.is_empty() {
                return Err(TemplateParseError("empty variable name".into()));
            }
            let (name, modifier) = if let Some(stripped) = raw.strip_suffix('*') {
                if stripped.is_empty() {
                    return Err(TemplateParseError("empty variable name".into()));
                }
                (stripped.to_owned(), VarModifier::Explode)
            } else if let Some(idx) = raw.find(':') {
                let (name, prefix) = raw.split_at(idx);
                let prefix = &prefix[1..];
                if name.is_empty() {
                    return Err(TemplateParseError("empty variable name".into()));
                }
                let n: u32 = prefix
                    .parse()
                    .map_err(|_| TemplateParseError(format!("invalid prefix length: {prefix}")))?;
                if !(1..=10000).contains(&n) {
                    return Err(TemplateParseError(format!(
                        "prefix length out of range (1..=10000): {n}"
                    )));
                }
                (name.to_owned(), VarModifier::Prefix(n))
            } else {
                (raw.to_owned(), VarModifier::None)
            };
            vars.push(VarSpec { name, modifier });
        }

        Ok(Segment::Expression { operator, vars })
    }

    /// The original template string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.original
    }

    /// The static prefix preceding the first variable expression. Used to
    /// check `Parse(T).Expand(V)`'s variable-free prefix equals `T`'s.
    #[must_use]
    pub fn static_prefix(&self) -> String {
        match self.segments.first() {
            Some(Segment::Literal(s)) => s.clone(),
            _ => String::new(),
        }
    }

    /// Expands the template against `vars`, encoding per RFC 6570.
    ///
    /// Expressions are conceptually substituted right-to-left so earlier
    /// offsets remain stable; since each segment is independent this is
    /// implemented as a single left-to-right pass producing the same result.
    #[must_use]
    pub fn expand(&self, vars: &Variables) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => out.push_str(&encode_literal(lit)),
                Segment::Expression { operator, vars: specs } => {
                    out.push_str(&Self::expand_expression(*operator, specs, vars));
                }
            }
        }
        out
    }

    fn expand_expression(operator: Operator, specs: &[VarSpec], vars: &Variables) -> String {
        let mut rendered = Vec::new();
        for spec in specs {
            let Some(value) = vars.get(&spec.name) else {
                continue;
            };
            if let Some(piece) = render_var(operator, spec, value) {
                rendered.push(piece);
            }
        }
        if rendered.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        if let Some(prefix) = operator.first_prefix() {
            out.push(prefix);
        }
        out.push_str(&rendered.join(&operator.separator().to_string()));
        out
    }
}

fn render_var(operator: Operator, spec: &VarSpec, value: &TemplateValue) -> Option<String> {
    let named = operator.names_values();
    match value {
        TemplateValue::Scalar(s) => {
            if s.is_empty() {
                return Some(if named {
                    format!("{}=", spec.name)
                } else if matches!(operator, Operator::Semicolon) {
                    spec.name.clone()
                } else {
                    String::new()
                });
            }
            let encoded = match &spec.modifier {
                VarModifier::Prefix(n) => {
                    let truncated: String = s.chars().take(*n as usize).collect();
                    encode_value(&truncated, operator)
                }
                _ => encode_value(s, operator),
            };
            Some(if named {
                format!("{}={}", spec.name, encoded)
            } else if matches!(operator, Operator::Semicolon) {
                format!("{}={}", spec.name, encoded)
            } else {
                encoded
            })
        }
        TemplateValue::List(items) => {
            if items.is_empty() {
                return None;
            }
            match spec.modifier {
                VarModifier::Explode => {
                    let parts: Vec<String> = items
                        .iter()
                        .map(|v| {
                            let enc = encode_value(v, operator);
                            if named {
                                format!("{}={}", spec.name, enc)
                            } else {
                                enc
                            }
                        })
                        .collect();
                    Some(parts.join(&operator.separator().to_string()))
                }
                _ => {
                    let joined = items
                        .iter()
                        .map(|v| encode_value(v, operator))
                        .collect::<Vec<_>>()
                        .join(",");
                    Some(if named {
                        format!("{}={}", spec.name, joined)
                    } else {
                        joined
                    })
                }
            }
        }
        TemplateValue::AssocList(pairs) => {
            if pairs.is_empty() {
                return None;
            }
            match spec.modifier {
                VarModifier::Explode => {
                    let parts: Vec<String> = pairs
                        .iter()
                        .map(|(k, v)| {
                            format!("{}={}", encode_value(k, operator), encode_value(v, operator))
                        })
                        .collect();
                    Some(parts.join(&operator.separator().to_string()))
                }
                _ => {
                    let joined = pairs
                        .iter()
                        .flat_map(|(k, v)| {
                            [encode_value(k, operator), encode_value(v, operator)]
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    Some(if named {
                        format!("{}={}", spec.name, joined)
                    } else {
                        joined
                    })
                }
            }
        }
    }
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn is_reserved(c: char) -> bool {
    matches!(
        c,
        ':' | '/' | '?' | '#' | '[' | ']' | '@' | '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+'
            | ',' | ';' | '='
    )
}

fn encode_value(s: &str, operator: Operator) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if is_unreserved(c) || (operator.preserves_reserved() && is_reserved(c)) {
            out.push(c);
        } else {
            for byte in c.to_string().as_bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

fn encode_literal(s: &str) -> String {
    // Literals are emitted as-is except for percent-encoding anything that
    // is not unreserved or already a reserved/pct-encoded sequence.
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if is_unreserved(c) || is_reserved(c) || c == '%' {
            out.push(c);
        } else {
            for byte in c.to_string().as_bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

/// Converts a URI template into an anchored regular expression pattern
/// usable for subscription-template matching, per §4.6: each `{var}` becomes
/// a capturing `([^/]+)` group, `.` is escaped, `*` (outside expressions)
/// becomes `.*`, and the whole pattern is anchored with `^...$`.
///
/// All regex metacharacters in literal segments are escaped (not just `.`
/// and `*`), so literal `?` or `+` in a template match literally rather than
/// as quantifiers.
#[must_use]
pub fn template_to_regex(template: &str) -> String {
    let mut pattern = String::from("^");
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        break;
                    }
                    name.push(c2);
                }
                let _ = name;
                pattern.push_str("([^/]+)");
            }
            _ => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), TemplateValue::from(*v)))
            .collect()
    }

    #[test]
    fn simple_expansion_percent_encodes_and_joins_with_comma() {
        let t = UriTemplate::parse("/users/{id}").unwrap();
        assert_eq!(t.expand(&vars(&[("id", "u 1")])), "/users/u%201");
    }

    #[test]
    fn s4_scenario_query_params_expand_correctly() {
        let t = UriTemplate::parse("/users/{id}/files{?tag,limit}").unwrap();
        let v = vars(&[("id", "u 1"), ("tag", "x"), ("limit", "10")]);
        assert_eq!(t.expand(&v), "/users/u%201/files?tag=x&limit=10");
    }

    #[test]
    fn plus_operator_preserves_reserved_characters() {
        let t = UriTemplate::parse("{+path}").unwrap();
        assert_eq!(t.expand(&vars(&[("path", "/a/b")])), "/a/b");
    }

    #[test]
    fn simple_operator_encodes_reserved_characters() {
        let t = UriTemplate::parse("{path}").unwrap();
        assert_eq!(t.expand(&vars(&[("path", "/a/b")])), "%2Fa%2Fb");
    }

    #[test]
    fn missing_variable_expands_to_empty() {
        let t = UriTemplate::parse("/a{/missing}/b").unwrap();
        assert_eq!(t.expand(&Variables::new()), "/a/b");
    }

    #[test]
    fn prefix_modifier_truncates_before_encoding() {
        let t = UriTemplate::parse("{id:3}").unwrap();
        assert_eq!(t.expand(&vars(&[("id", "hello")])), "hel");
    }

    #[test]
    fn parse_rejects_unterminated_expression() {
        assert!(UriTemplate::parse("/a/{id").is_err());
    }

    #[test]
    fn parse_rejects_empty_expression() {
        assert!(UriTemplate::parse("/a/{}").is_err());
    }

    #[test]
    fn parse_rejects_empty_variable_name() {
        assert!(UriTemplate::parse("/a/{,id}").is_err());
    }

    #[test]
    fn parse_rejects_out_of_range_prefix() {
        assert!(UriTemplate::parse("{id:0}").is_err());
        assert!(UriTemplate::parse("{id:10001}").is_err());
    }

    #[test]
    fn static_prefix_is_the_leading_literal_segment() {
        let t = UriTemplate::parse("/logs/{name}.log").unwrap();
        assert_eq!(t.static_prefix(), "/logs/");
    }

    #[test]
    fn template_to_regex_matches_log_files_but_not_other_extensions() {
        let re = regex::Regex::new(&template_to_regex("file:///logs/{name}.log")).unwrap();
        assert!(re.is_match("file:///logs/app.log"));
        assert!(!re.is_match("file:///logs/app.txt"));
    }

    #[test]
    fn template_to_regex_escapes_literal_metacharacters() {
        let re = regex::Regex::new(&template_to_regex("/a+b/{id}?")).unwrap();
        assert!(re.is_match("/a+b/x?"));
        assert!(!re.is_match("/aab/x?"));
    }
}
