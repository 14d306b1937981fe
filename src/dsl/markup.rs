//! Parser for page template markup.
//!
//! Accepts an HTML-like subset: elements with attributes, self-closing and
//! void elements, text, and `{{ ... }}` interpolations. Capitalized tags are
//! component references; the page parser turns them into name references.

use super::ast::{MarkupElement, MarkupNode};

const VOID_ELEMENTS: &[&str] = &[
    "area", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// A markup fault with its character offset into the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupError {
    pub offset: usize,
    pub message: String,
}

pub fn parse_markup(text: &str) -> Result<Vec<MarkupNode>, MarkupError> {
    let mut parser = MarkupParser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let nodes = parser.parse_children(None)?;
    Ok(nodes)
}

/// Whether `tag` names a component rather than an HTML element.
pub fn is_component_tag(tag: &str) -> bool {
    tag.chars().next().is_some_and(char::is_uppercase)
}

struct MarkupParser {
    chars: Vec<char>,
    pos: usize,
}

impl MarkupParser {
    fn error(&self, message: impl Into<String>) -> MarkupError {
        MarkupError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn skip_space(&mut self) {
        while !self.at_end() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while !self.at_end()
            && (self.chars[self.pos].is_alphanumeric() || matches!(self.chars[self.pos], '-' | '_' | ':' | '.' | '@'))
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_children(&mut self, closing: Option<&str>) -> Result<Vec<MarkupNode>, MarkupError> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        loop {
            if self.at_end() {
                if let Some(tag) = closing {
                    return Err(self.error(format!("missing </{tag}>")));
                }
                break;
            }

            if self.starts_with("{{") {
                flush_text(&mut text, &mut nodes);
                self.pos += 2;
                let start = self.pos;
                while !self.at_end() && !self.starts_with("}}") {
                    self.pos += 1;
                }
                if self.at_end() {
                    return Err(self.error("unterminated interpolation"));
                }
                let expr: String = self.chars[start..self.pos].iter().collect();
                self.pos += 2;
                nodes.push(MarkupNode::Interpolation(expr.trim().to_string()));
                continue;
            }

            if self.starts_with("<!--") {
                while !self.at_end() && !self.starts_with("-->") {
                    self.pos += 1;
                }
                self.pos = (self.pos + 3).min(self.chars.len());
                continue;
            }

            if self.starts_with("</") {
                flush_text(&mut text, &mut nodes);
                self.pos += 2;
                let name = self.read_name();
                self.skip_space();
                if self.at_end() || self.chars[self.pos] != '>' {
                    return Err(self.error(format!("expected '>' after </{name}")));
                }
                self.pos += 1;
                return match closing {
                    Some(tag) if tag == name => Ok(nodes),
                    Some(tag) => Err(self.error(format!("expected </{tag}>, found </{name}>"))),
                    None => Err(self.error(format!("unexpected </{name}>"))),
                };
            }

            if self.chars[self.pos] == '<'
                && self
                    .chars
                    .get(self.pos + 1)
                    .is_some_and(|c| c.is_alphabetic())
            {
                flush_text(&mut text, &mut nodes);
                nodes.push(MarkupNode::Element(self.parse_element()?));
                continue;
            }

            text.push(self.chars[self.pos]);
            self.pos += 1;
        }

        flush_text(&mut text, &mut nodes);
        Ok(nodes)
    }

    fn parse_element(&mut self) -> Result<MarkupElement, MarkupError> {
        self.pos += 1; // '<'
        let tag = self.read_name();
        let mut attrs = Vec::new();

        loop {
            self.skip_space();
            if self.at_end() {
                return Err(self.error(format!("unterminated <{tag}>")));
            }
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(element(tag, attrs, Vec::new()));
            }
            if self.chars[self.pos] == '>' {
                self.pos += 1;
                break;
            }

            let name = self.read_name();
            if name.is_empty() {
                return Err(self.error(format!(
                    "unexpected '{}' in <{tag}>",
                    self.chars[self.pos]
                )));
            }
            self.skip_space();
            let value = if !self.at_end() && self.chars[self.pos] == '=' {
                self.pos += 1;
                self.skip_space();
                Some(self.read_attr_value()?)
            } else {
                None
            };
            attrs.push((name, value));
        }

        if VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str()) {
            return Ok(element(tag, attrs, Vec::new()));
        }

        let children = self.parse_children(Some(&tag))?;
        Ok(element(tag, attrs, children))
    }

    fn read_attr_value(&mut self) -> Result<String, MarkupError> {
        if self.at_end() {
            return Err(self.error("missing attribute value"));
        }
        let quote = self.chars[self.pos];
        if quote == '"' || quote == '\'' {
            self.pos += 1;
            let start = self.pos;
            while !self.at_end() && self.chars[self.pos] != quote {
                self.pos += 1;
            }
            if self.at_end() {
                return Err(self.error("unterminated attribute value"));
            }
            let value = self.chars[start..self.pos].iter().collect();
            self.pos += 1;
            return Ok(value);
        }
        let start = self.pos;
        while !self.at_end() && !self.chars[self.pos].is_whitespace() && !matches!(self.chars[self.pos], '>' | '/') {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

fn element(tag: String, attrs: Vec<(String, Option<String>)>, children: Vec<MarkupNode>) -> MarkupElement {
    MarkupElement {
        tag,
        attrs,
        children,
        component: None,
    }
}

fn flush_text(text: &mut String, nodes: &mut Vec<MarkupNode>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        nodes.push(MarkupNode::Text(trimmed.to_string()));
    }
    text.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_element(nodes: &[MarkupNode]) -> &MarkupElement {
        match &nodes[0] {
            MarkupNode::Element(e) => e,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn nested_elements_with_interpolation() {
        let nodes = parse_markup(r#"<div class="users"><h1>{{ title }}</h1><UserCard/></div>"#).unwrap();
        let div = first_element(&nodes);
        assert_eq!(div.tag, "div");
        assert_eq!(div.attrs, vec![("class".to_string(), Some("users".to_string()))]);
        assert_eq!(div.children.len(), 2);

        let h1 = first_element(&div.children);
        assert_eq!(h1.children, vec![MarkupNode::Interpolation("title".to_string())]);
        match &div.children[1] {
            MarkupNode::Element(card) => {
                assert_eq!(card.tag, "UserCard");
                assert!(card.children.is_empty());
            }
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn void_elements_and_flag_attributes() {
        let nodes = parse_markup("<p>a<br>b<input disabled value=x></p>").unwrap();
        let p = first_element(&nodes);
        assert_eq!(p.children.len(), 4);
        match &p.children[3] {
            MarkupNode::Element(input) => assert_eq!(
                input.attrs,
                vec![
                    ("disabled".to_string(), None),
                    ("value".to_string(), Some("x".to_string()))
                ]
            ),
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn text_is_trimmed_and_comments_dropped() {
        let nodes = parse_markup("  hello <!-- note -->  ").unwrap();
        assert_eq!(nodes, vec![MarkupNode::Text("hello".to_string())]);
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let err = parse_markup("<div><span></div>").unwrap_err();
        assert!(err.message.contains("expected </span>"));
    }

    #[test]
    fn missing_close_is_an_error() {
        assert!(parse_markup("<div>").is_err());
    }

    #[test]
    fn component_tags_are_capitalized() {
        assert!(is_component_tag("UserCard"));
        assert!(!is_component_tag("div"));
    }
}
