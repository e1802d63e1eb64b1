use crate::error::ConfigError;

/// One piece of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Literal(String),
    Param { name: String, constraint: Option<String>, optional: bool, leading_slash: bool },
    Wildcard { name: String, leading_slash: bool },
}

/// the name a bare `*` binds its value to
pub(crate) const UNNAMED_WILDCARD: &str = "0";

#[inline]
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a route pattern into tokens.
///
/// Grammar:
/// - `:name` binds one segment, `:name(regex)` constrains it and a trailing `?` makes it optional
/// - `*name` (or a bare `*`) binds the rest of the path and must be the last token
/// - everything else is literal text
pub(crate) fn parse(pattern: &str) -> Result<Vec<Token>, ConfigError> {
    if !(pattern.starts_with('/') || pattern.starts_with('*')) {
        return Err(ConfigError::invalid_pattern(pattern, "pattern must start with '/' or '*'"));
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut index = 0;

    while index < chars.len() {
        let c = chars[index];
        match c {
            ':' if chars.get(index + 1).is_some_and(|next| is_name_char(*next)) => {
                index += 1;
                let name = read_name(&chars, &mut index);
                let leading_slash = take_leading_slash(&mut literal);
                flush_literal(&mut literal, &mut tokens);

                let constraint = if chars.get(index) == Some(&'(') {
                    Some(read_constraint(pattern, &name, &chars, &mut index)?)
                } else {
                    None
                };

                let optional = chars.get(index) == Some(&'?');
                if optional {
                    index += 1;
                }

                tokens.push(Token::Param { name, constraint, optional, leading_slash });
            }

            '*' => {
                index += 1;
                let mut name = read_name(&chars, &mut index);
                if name.is_empty() {
                    name = UNNAMED_WILDCARD.to_owned();
                }
                let leading_slash = take_leading_slash(&mut literal);
                flush_literal(&mut literal, &mut tokens);

                if index < chars.len() {
                    return Err(ConfigError::invalid_pattern(pattern, "a wildcard must be the last segment"));
                }
                tokens.push(Token::Wildcard { name, leading_slash });
            }

            _ => {
                literal.push(c);
                index += 1;
            }
        }
    }
    flush_literal(&mut literal, &mut tokens);

    check_unique_names(pattern, &tokens)?;
    Ok(tokens)
}

fn read_name(chars: &[char], index: &mut usize) -> String {
    let start = *index;
    while *index < chars.len() && is_name_char(chars[*index]) {
        *index += 1;
    }
    chars[start..*index].iter().collect()
}

fn take_leading_slash(literal: &mut String) -> bool {
    if literal.ends_with('/') {
        literal.pop();
        true
    } else {
        false
    }
}

fn flush_literal(literal: &mut String, tokens: &mut Vec<Token>) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

/// reads `( ... )` starting at the opening parenthesis, honouring nesting and `\` escapes
fn read_constraint(pattern: &str, name: &str, chars: &[char], index: &mut usize) -> Result<String, ConfigError> {
    let mut depth = 0_usize;
    let mut constraint = String::new();

    while *index < chars.len() {
        let c = chars[*index];
        *index += 1;
        match c {
            '\\' => {
                constraint.push(c);
                if let Some(escaped) = chars.get(*index) {
                    constraint.push(*escaped);
                    *index += 1;
                }
            }
            '(' => {
                if depth > 0 {
                    constraint.push(c);
                }
                depth += 1;
            }
            ')' => {
                depth -= 1;
                if depth == 0 {
                    if constraint.is_empty() {
                        return Err(ConfigError::invalid_pattern(
                            pattern,
                            format!("empty constraint for parameter '{name}'"),
                        ));
                    }
                    return Ok(constraint);
                }
                constraint.push(c);
            }
            _ => constraint.push(c),
        }
    }

    Err(ConfigError::invalid_pattern(pattern, format!("unbalanced parentheses in constraint for parameter '{name}'")))
}

fn check_unique_names(pattern: &str, tokens: &[Token]) -> Result<(), ConfigError> {
    let mut seen: Vec<&str> = Vec::new();
    for token in tokens {
        let name = match token {
            Token::Param { name, .. } | Token::Wildcard { name, .. } => name.as_str(),
            Token::Literal(_) => continue,
        };
        if seen.contains(&name) {
            return Err(ConfigError::duplicate_param(pattern, name));
        }
        seen.push(name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, constraint: Option<&str>, optional: bool, leading_slash: bool) -> Token {
        Token::Param { name: name.into(), constraint: constraint.map(Into::into), optional, leading_slash }
    }

    #[test]
    fn test_literal_only() {
        assert_eq!(parse("/users/list").unwrap(), vec![Token::Literal("/users/list".into())]);
    }

    #[test]
    fn test_params() {
        let tokens = parse("/users/:id(\\d+)/books/:book?").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Literal("/users".into()),
                param("id", Some("\\d+"), false, true),
                Token::Literal("/books".into()),
                param("book", None, true, true),
            ]
        );
    }

    #[test]
    fn test_params_sharing_a_segment() {
        let tokens = parse("/flights/:from-:to").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Literal("/flights".into()),
                param("from", None, false, true),
                Token::Literal("-".into()),
                param("to", None, false, false),
            ]
        );
    }

    #[test]
    fn test_nested_constraint_group() {
        let tokens = parse("/files/:kind(img|(doc|pdf))").unwrap();
        assert_eq!(tokens[1], param("kind", Some("img|(doc|pdf)"), false, true));
    }

    #[test]
    fn test_wildcards() {
        assert_eq!(parse("*").unwrap(), vec![Token::Wildcard { name: "0".into(), leading_slash: false }]);
        assert_eq!(
            parse("/static/*path").unwrap(),
            vec![Token::Literal("/static".into()), Token::Wildcard { name: "path".into(), leading_slash: true }]
        );
    }

    #[test]
    fn test_colon_without_name_is_literal() {
        assert_eq!(parse("/a:/b").unwrap(), vec![Token::Literal("/a:/b".into())]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("/a/:id/:id"), Err(ConfigError::DuplicateParam { .. })));
        assert!(matches!(parse("/a/*rest/:id"), Err(ConfigError::InvalidPattern { .. })));
        assert!(matches!(parse("/a/*one/*two"), Err(ConfigError::InvalidPattern { .. })));
        assert!(matches!(parse("/a/:id(\\d+"), Err(ConfigError::InvalidPattern { .. })));
        assert!(matches!(parse("/a/:id()"), Err(ConfigError::InvalidPattern { .. })));
        assert!(matches!(parse("users"), Err(ConfigError::InvalidPattern { .. })));
        assert!(matches!(parse("/a/*id/:id"), Err(ConfigError::InvalidPattern { .. })));
        assert!(matches!(parse("/:rest/*rest"), Err(ConfigError::DuplicateParam { .. })));
    }
}
