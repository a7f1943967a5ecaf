use std::io::Read;
use xml::reader::XmlEvent;

use crate::types::{Diagnostic, FatalError};

pub type XmlEvents<R> = xml::reader::Events<R>;
pub type XmlAttribute = xml::attribute::OwnedAttribute;

/// Dispatches the child elements of the current element. The element itself
/// is consumed up to and including its end tag; an unlisted child tag is a
/// hard failure.
macro_rules! match_elements {
    ($ctx:expr, $attributes:ident, $($p:pat => $e:expr),+ $(,)?) => {
        while let Some(event) = $ctx.events.next() {
            match event? {
                XmlEvent::StartElement { name, $attributes, .. } => {
                    let name = name.local_name.as_str();
                    $ctx.push_element(name);
                    match name {
                        $(
                            $p => $e,
                        )+
                        _ => {
                            return Err($crate::types::FatalError::UnexpectedElement {
                                xpath: $ctx.xpath.clone(),
                                name: String::from(name),
                            });
                        }
                    }
                }
                XmlEvent::EndElement { .. } => {
                    $ctx.pop_element();
                    break;
                }
                _ => {}
            }
        }
    };
}

/// Matches every attribute of an element against the listed names; an
/// unlisted attribute is a hard failure.
macro_rules! match_attributes {
    ($ctx:expr, $a:ident in $attributes:expr, $($p:pat => $e:expr),+ $(,)?) => {
        for $a in $attributes {
            let n = $a.name.local_name.as_str();
            match n {
                $(
                    $p => $e,
                )+
                _ => {
                    return Err($crate::types::FatalError::UnexpectedAttribute {
                        xpath: $ctx.xpath.clone(),
                        name: String::from(n),
                    });
                }
            }
        }
    };
}

/// Unwraps an `Option` holding a required attribute value.
macro_rules! require_attribute {
    ($ctx:expr, $attribute:ident) => {
        match $attribute {
            Some(value) => value,
            None => {
                return Err($crate::types::FatalError::MissingAttribute {
                    xpath: $ctx.xpath.clone(),
                    name: String::from(stringify!($attribute)),
                });
            }
        }
    };
}

//--------------------------------------------------------------------------------------------------
pub struct ParseCtx<R: Read> {
    pub events: XmlEvents<R>,
    pub xpath: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl<R: Read> ParseCtx<R> {
    pub fn push_element(&mut self, name: &str) {
        self.xpath.push('/');
        self.xpath.push_str(name);
    }

    pub fn pop_element(&mut self) {
        if let Some(separator_pos) = self.xpath.rfind('/') {
            self.xpath.truncate(separator_pos);
        }
    }
}

/// Skips the rest of the current element, nested elements included.
pub fn consume_current_element<R: Read>(ctx: &mut ParseCtx<R>) -> Result<(), FatalError> {
    let mut depth = 1;
    while depth > 0 {
        match ctx.events.next() {
            Some(event) => match event? {
                XmlEvent::StartElement { name, .. } => {
                    ctx.push_element(name.local_name.as_str());
                    depth += 1;
                }
                XmlEvent::EndElement { .. } => {
                    depth -= 1;
                    ctx.pop_element();
                }
                _ => {}
            },
            None => break,
        }
    }
    Ok(())
}

/// Concatenates every piece of text inside the current element, descending
/// into nested markup in document order, so `<type>foo <name>bar</name>
/// baz</type>` comes back as `"foo bar baz"`.
pub fn parse_inner_text<R: Read>(ctx: &mut ParseCtx<R>) -> Result<String, FatalError> {
    let mut result = String::new();
    let mut depth = 1;
    while depth > 0 {
        match ctx.events.next() {
            Some(event) => match event? {
                XmlEvent::StartElement { name, .. } => {
                    ctx.push_element(name.local_name.as_str());
                    depth += 1;
                }
                XmlEvent::Characters(text) | XmlEvent::Whitespace(text) | XmlEvent::CData(text) => {
                    result.push_str(&text);
                }
                XmlEvent::EndElement { .. } => {
                    depth -= 1;
                    ctx.pop_element();
                }
                _ => {}
            },
            None => break,
        }
    }
    Ok(result)
}
