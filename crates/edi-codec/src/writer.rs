//! Grammar-driven EDI writing
//!
//! Renders a node tree back to delimited text by walking the grammar and
//! the tree side by side. Rendering is positional: every declared position
//! gets a token, and truncatable nodes drop the removable tail. Value text
//! is re-encoded per its declared data type, so decimals pick up the
//! active decimal separator on the way out.

use std::io::Write;

use edi_grammar::{Component, DataType, Delimiters, Edimap, Field, GroupChild, Segment};
use edi_ir::Node;
use tracing::{debug, trace};

use crate::{Error, Result};

/// Join already-escaped tokens, dropping the removable tail when allowed
///
/// A trailing token is removable when every character in it is a
/// separator, the empty token included. Escaped separators carry their
/// escape character and therefore survive.
pub(crate) fn join_tokens(
    mut tokens: Vec<String>,
    separator: char,
    truncatable: bool,
    delimiters: &Delimiters,
) -> String {
    if truncatable {
        while tokens
            .last()
            .is_some_and(|token| token.chars().all(|c| delimiters.is_separator(c)))
        {
            tokens.pop();
        }
    }
    let mut out = String::new();
    for (index, token) in tokens.iter().enumerate() {
        if index > 0 {
            out.push(separator);
        }
        out.push_str(token);
    }
    out
}

/// Writer turning node trees back into delimited segment text
///
/// The tree must follow the grammar: children in declared order, names
/// matching output names, occurrence bounds respected. Absent optional
/// positions render as empty tokens; structural mismatches fail with
/// [`Error::WriteMismatch`].
#[derive(Debug)]
pub struct EdiWriter<'g> {
    edimap: &'g Edimap,
    delimiters: Delimiters,
}

impl<'g> EdiWriter<'g> {
    /// Create a writer for `edimap` using its declared delimiters
    pub fn new(edimap: &'g Edimap) -> Self {
        Self {
            edimap,
            delimiters: edimap.delimiters,
        }
    }

    /// Override the grammar's declared delimiters
    #[must_use]
    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Render `root` to `out`, returning the number of segments written
    pub fn write<W: Write>(&self, root: &Node, out: &mut W) -> Result<usize> {
        let grammar_root = &self.edimap.segments;
        if root.name != grammar_root.output_name {
            return Err(Error::write_mismatch(
                &root.name,
                format!("expected root element '{}'", grammar_root.output_name),
            ));
        }
        debug!(
            name = %self.edimap.description.name,
            version = %self.edimap.description.version,
            "writing message"
        );
        self.write_children(&grammar_root.children, &root.children, out)
    }

    /// Render `root` into a string
    pub fn write_to_string(&self, root: &Node) -> Result<String> {
        let mut out = Vec::new();
        self.write(root, &mut out)?;
        String::from_utf8(out)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e).into())
    }

    fn write_children<W: Write>(
        &self,
        children: &[GroupChild],
        nodes: &[Node],
        out: &mut W,
    ) -> Result<usize> {
        let mut next = 0usize;
        let mut segments = 0usize;
        for child in children {
            let mut count = 0usize;
            while child.max_occurs().allows(count) {
                let Some(node) = nodes.get(next) else {
                    break;
                };
                if node.name != child.output_name() {
                    break;
                }
                segments += match child {
                    GroupChild::Segment(def) => self.write_segment(def, node, out)?,
                    GroupChild::Group(def) => {
                        trace!(group = %def.output_name, "writing group");
                        self.write_children(&def.children, &node.children, out)?
                    }
                };
                next += 1;
                count += 1;
            }
            if count < child.min_occurs() {
                return Err(Error::write_mismatch(
                    child.output_name(),
                    "mandatory element is missing from the tree",
                ));
            }
        }
        if let Some(extra) = nodes.get(next) {
            return Err(Error::write_mismatch(
                &extra.name,
                "element does not match any grammar position",
            ));
        }
        Ok(segments)
    }

    fn write_segment<W: Write>(&self, def: &Segment, node: &Node, out: &mut W) -> Result<usize> {
        trace!(tag = %def.segcode, "writing segment");
        let mut next = 0usize;
        let mut tokens = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            match node.children.get(next) {
                Some(child) if child.name == field.output_name => {
                    tokens.push(self.render_field(field, child)?);
                    next += 1;
                }
                _ => tokens.push(String::new()),
            }
        }
        let rest = &node.children[next..];
        if def.children.is_empty() {
            if let Some(extra) = rest.first() {
                return Err(Error::write_mismatch(
                    &extra.name,
                    format!("element does not match any field of segment '{}'", def.segcode),
                ));
            }
        }
        let body = join_tokens(
            tokens,
            self.delimiters.field,
            def.truncatable,
            &self.delimiters,
        );
        let mut segment = String::with_capacity(def.segcode.len() + body.len() + 2);
        segment.push_str(&def.segcode);
        if !body.is_empty() {
            segment.push(self.delimiters.field);
            segment.push_str(&body);
        }
        segment.push(self.delimiters.segment);
        out.write_all(segment.as_bytes())?;
        let mut written = 1usize;
        if !def.children.is_empty() {
            written += self.write_children(&def.children, rest, out)?;
        }
        Ok(written)
    }

    fn render_field(&self, def: &Field, node: &Node) -> Result<String> {
        if !def.is_composite() {
            return self.render_value(&def.output_name, &def.data_type, node);
        }
        let mut next = 0usize;
        let mut parts = Vec::with_capacity(def.components.len());
        for component in &def.components {
            match node.children.get(next) {
                Some(child) if child.name == component.output_name => {
                    parts.push(self.render_component(component, child)?);
                    next += 1;
                }
                _ => parts.push(String::new()),
            }
        }
        if let Some(extra) = node.children.get(next) {
            return Err(Error::write_mismatch(
                &extra.name,
                format!(
                    "element does not match any component of '{}'",
                    def.output_name
                ),
            ));
        }
        Ok(join_tokens(
            parts,
            self.delimiters.component,
            def.truncatable,
            &self.delimiters,
        ))
    }

    fn render_component(&self, def: &Component, node: &Node) -> Result<String> {
        if def.sub_components.is_empty() {
            return self.render_value(&def.output_name, &def.data_type, node);
        }
        let mut next = 0usize;
        let mut parts = Vec::with_capacity(def.sub_components.len());
        for sub in &def.sub_components {
            match node.children.get(next) {
                Some(child) if child.name == sub.output_name => {
                    parts.push(self.render_value(&sub.output_name, &sub.data_type, child)?);
                    next += 1;
                }
                _ => parts.push(String::new()),
            }
        }
        if let Some(extra) = node.children.get(next) {
            return Err(Error::write_mismatch(
                &extra.name,
                format!(
                    "element does not match any sub-component of '{}'",
                    def.output_name
                ),
            ));
        }
        Ok(join_tokens(
            parts,
            self.delimiters.sub_component,
            def.truncatable,
            &self.delimiters,
        ))
    }

    fn render_value(&self, name: &str, data_type: &DataType, node: &Node) -> Result<String> {
        if !node.children.is_empty() {
            return Err(Error::write_mismatch(
                name,
                "expected a value, found child elements",
            ));
        }
        let text = node.value.as_deref().unwrap_or("");
        if text.is_empty() || matches!(data_type, DataType::String) {
            return Ok(self.delimiters.escape(text));
        }
        // tree text is canonical; re-encode for the active delimiters
        let value = data_type
            .decode(text, &Delimiters::default())
            .map_err(|e| Error::write_mismatch(name, e.to_string()))?;
        let encoded = data_type
            .encode(&value, &self.delimiters)
            .map_err(|e| Error::write_mismatch(name, e.to_string()))?;
        Ok(self.delimiters.escape(&encoded))
    }
}
