//! Validation of processed topic documents against the output DTD.
//!
//! [`DtdValidator`] checks what a topic author can actually get wrong in a
//! fragment: undeclared elements and attributes the declared element does
//! not accept. Content models are not enforced.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::xml::{Element, XmlDocument};

lazy_static! {
    static ref PARAMETER_ENTITY_REF: Regex = Regex::new(r"%([A-Za-z_][A-Za-z0-9._:-]*);").unwrap();
}

/// Upper bound on nested parameter-entity expansion.
const MAX_EXPANSION_DEPTH: usize = 16;

/// Result of a single validation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the validation passed
    pub passed: bool,
    /// Error message if validation failed
    pub error_message: Option<String>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            passed: true,
            error_message: None,
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            passed: false,
            error_message: Some(message),
        }
    }
}

/// Validates a document against a schema given as text.
pub trait XmlValidator {
    fn validate(&self, doc: &XmlDocument, schema: &str) -> ValidationResult;
}

/// Element and attribute declarations read from a DTD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dtd {
    elements: HashSet<String>,
    attributes: HashMap<String, HashSet<String>>,
}

/// Splits a declaration body on whitespace, keeping quoted strings and
/// parenthesised groups whole.
fn tokenize(body: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in body.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
                continue;
            }
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                current.push(c);
                continue;
            }
            None => {}
        }
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start + 4..].find("-->") {
            Some(end) => rest = &rest[start + 4 + end + 3..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// `(keyword, body)` for every `<!KEYWORD body>` markup declaration.
fn declarations(text: &str) -> Vec<(&str, &str)> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<!") {
        let after = &rest[start + 2..];
        let keyword_len = after
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(after.len());
        let keyword = &after[..keyword_len];
        if keyword.is_empty() {
            // conditional section markers
            rest = after;
            continue;
        }

        let body_start = keyword_len;
        let mut quote: Option<char> = None;
        let mut end = None;
        for (i, c) in after[body_start..].char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '"' || c == '\'' => quote = Some(c),
                None if c == '>' => {
                    end = Some(body_start + i);
                    break;
                }
                None => {}
            }
        }
        let Some(end) = end else {
            break;
        };
        found.push((keyword, &after[body_start..end]));
        rest = &after[end + 1..];
    }
    found
}

fn unquote(token: &str) -> Option<&str> {
    let first = token.chars().next()?;
    if (first == '"' || first == '\'') && token.len() >= 2 && token.ends_with(first) {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}

impl Dtd {
    pub fn parse(text: &str) -> Self {
        let text = strip_comments(text);
        let declarations = declarations(&text);

        let mut entities: HashMap<String, String> = HashMap::new();
        for (keyword, body) in &declarations {
            if *keyword != "ENTITY" {
                continue;
            }
            let tokens = tokenize(body);
            if tokens.len() >= 3 && tokens[0] == "%" {
                if let Some(value) = unquote(&tokens[2]) {
                    // the first declaration of an entity is binding
                    entities
                        .entry(tokens[1].clone())
                        .or_insert_with(|| value.to_string());
                }
            }
        }

        let mut dtd = Dtd::default();
        for (keyword, body) in &declarations {
            match *keyword {
                "ELEMENT" => {
                    let expanded = expand(body, &entities);
                    if let Some(name) = tokenize(&expanded).into_iter().next() {
                        dtd.elements.insert(name);
                    }
                }
                "ATTLIST" => {
                    let expanded = expand(body, &entities);
                    dtd.add_attlist(&tokenize(&expanded));
                }
                _ => {}
            }
        }
        debug!(
            "Loaded DTD with {} elements and {} attribute lists",
            dtd.elements.len(),
            dtd.attributes.len()
        );
        dtd
    }

    fn add_attlist(&mut self, tokens: &[String]) {
        let Some((element, defs)) = tokens.split_first() else {
            return;
        };
        let declared = self.attributes.entry(element.clone()).or_default();
        let mut iter = defs.iter();
        while let Some(name) = iter.next() {
            declared.insert(name.clone());
            // attribute type
            match iter.next().map(String::as_str) {
                Some("NOTATION") => {
                    iter.next();
                }
                Some(_) => {}
                None => break,
            }
            // default declaration
            if iter.next().map(String::as_str) == Some("#FIXED") {
                iter.next();
            }
        }
    }

    pub fn declares_element(&self, name: &str) -> bool {
        self.elements.contains(name)
    }

    pub fn declares_attribute(&self, element: &str, attribute: &str) -> bool {
        self.attributes
            .get(element)
            .is_some_and(|attrs| attrs.contains(attribute))
    }

    fn check_element(&self, element: &Element) -> Result<(), String> {
        if !self.elements.is_empty() && !self.declares_element(&element.name) {
            return Err(format!(
                "Element type \"{}\" must be declared.",
                element.name
            ));
        }
        if self.attributes.is_empty() {
            return Ok(());
        }
        for (attribute, _) in &element.attributes {
            if attribute.starts_with("xmlns") || attribute.starts_with("xml:") {
                continue;
            }
            if !self.declares_attribute(&element.name, attribute) {
                return Err(format!(
                    "Attribute \"{}\" must be declared for element type \"{}\".",
                    attribute, element.name
                ));
            }
        }
        Ok(())
    }

    /// First problem found in document order.
    pub fn check(&self, doc: &XmlDocument) -> Result<(), String> {
        let mut outcome = Ok(());
        doc.root.visit_elements(&mut |e: &Element| {
            if outcome.is_ok() {
                outcome = self.check_element(e);
            }
        });
        outcome
    }
}

fn expand(body: &str, entities: &HashMap<String, String>) -> String {
    let mut expanded = body.to_string();
    for _ in 0..MAX_EXPANSION_DEPTH {
        if !PARAMETER_ENTITY_REF.is_match(&expanded) {
            break;
        }
        expanded = PARAMETER_ENTITY_REF
            .replace_all(&expanded, |caps: &regex::Captures| {
                entities.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned();
    }
    expanded
}

/// Validator keeping the most recently parsed DTD.
#[derive(Debug, Default)]
pub struct DtdValidator {
    cache: Mutex<Option<(String, Arc<Dtd>)>>,
}

impl DtdValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn dtd(&self, schema: &str) -> Arc<Dtd> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((source, dtd)) = cache.as_ref() {
            if source == schema {
                return Arc::clone(dtd);
            }
        }
        let dtd = Arc::new(Dtd::parse(schema));
        *cache = Some((schema.to_string(), Arc::clone(&dtd)));
        dtd
    }
}

impl XmlValidator for DtdValidator {
    fn validate(&self, doc: &XmlDocument, schema: &str) -> ValidationResult {
        match self.dtd(schema).check(doc) {
            Ok(()) => ValidationResult::success(),
            Err(message) => ValidationResult::failure(message),
        }
    }
}
