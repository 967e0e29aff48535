// src/notify/template.rs
//! `{field}` placeholder substitution. `{{` and `}}` are literal braces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Embed, Payload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("template references unknown field `{0}`")]
    UnknownField(String),
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
    #[error("unmatched `}}` at byte {0}")]
    UnmatchedClose(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
}

/// Render `template` against `fields`.
pub fn render_str(template: &str, fields: &BTreeMap<String, String>) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(RenderError::Unterminated(pos));
                }
                let key = name.trim();
                if key.is_empty() {
                    return Err(RenderError::EmptyPlaceholder(pos));
                }
                match fields.get(key) {
                    Some(v) => out.push_str(v),
                    None => return Err(RenderError::UnknownField(key.to_string())),
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(RenderError::UnmatchedClose(pos));
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Syntax-only check (placeholders resolve to an empty value).
pub fn check_syntax(template: &str) -> Result<(), RenderError> {
    let mut chars = template.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(RenderError::Unterminated(pos));
                }
                if name.trim().is_empty() {
                    return Err(RenderError::EmptyPlaceholder(pos));
                }
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
            }
            '}' => return Err(RenderError::UnmatchedClose(pos)),
            _ => {}
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedTemplate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub footer: Option<String>,
}

/// Same shape as [`Payload`], every string may contain placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadTemplate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub embed: Option<EmbedTemplate>,
}

impl PayloadTemplate {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.embed.is_none()
    }

    fn parts(&self) -> impl Iterator<Item = &String> {
        let embed_parts = self.embed.iter().flat_map(|e| {
            [&e.title, &e.description, &e.url, &e.footer]
                .into_iter()
                .flatten()
        });
        self.content.iter().chain(embed_parts)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        self.parts().try_for_each(|p| check_syntax(p))
    }

    pub fn render(&self, fields: &BTreeMap<String, String>) -> Result<Payload, RenderError> {
        let opt = |s: &Option<String>| -> Result<Option<String>, RenderError> {
            s.as_deref().map(|t| render_str(t, fields)).transpose()
        };
        let embed = match &self.embed {
            Some(e) => Some(Embed {
                title: opt(&e.title)?,
                description: opt(&e.description)?,
                url: opt(&e.url)?,
                footer: opt(&e.footer)?,
            }),
            None => None,
        };
        Ok(Payload {
            content: opt(&self.content)?,
            embed,
        })
    }
}
