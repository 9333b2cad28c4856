//! Grammar model types
//!
//! An [`Edimap`] describes one message structure: a delimiter set plus a root
//! [`SegmentGroup`] whose descendants are segments, fields, components and
//! sub-components. Node kinds are distinct structs joined by [`GroupChild`],
//! so matching code stays exhaustive. Grammars are built with the chainable
//! constructors here and validated once via [`Edimap::validate`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::delimiters::Delimiters;
use crate::types::DataType;
use crate::{validate, Result};

/// Upper occurrence bound of a segment or group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxOccurs {
    /// At most this many occurrences
    Bounded(usize),
    /// No upper bound
    Unbounded,
}

impl MaxOccurs {
    /// True while another occurrence is still allowed after `count` matches
    pub fn allows(self, count: usize) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count < max,
            MaxOccurs::Unbounded => true,
        }
    }
}

impl Default for MaxOccurs {
    fn default() -> Self {
        MaxOccurs::Bounded(1)
    }
}

/// Identity of a grammar document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Message name (e.g. `ORDERS`)
    pub name: String,
    /// Message version (e.g. `D:03B`)
    pub version: String,
    /// Namespace applied to every node that does not declare its own
    pub namespace: Option<String>,
}

impl Description {
    /// Create a description without a namespace
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            namespace: None,
        }
    }

    /// Set the grammar namespace
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// A complete grammar document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edimap {
    /// Name/version/namespace identity
    pub description: Description,
    /// Delimiters this grammar was written against
    pub delimiters: Delimiters,
    /// Root group holding the message structure
    pub segments: SegmentGroup,
}

impl Edimap {
    /// Assemble a grammar document
    ///
    /// The description's namespace is propagated onto every node that has no
    /// namespace of its own.
    pub fn new(description: Description, delimiters: Delimiters, mut segments: SegmentGroup) -> Self {
        if let Some(ns) = description.namespace.clone() {
            segments.propagate_namespace(&ns);
        }
        Self {
            description,
            delimiters,
            segments,
        }
    }

    /// Run the eager configuration checks (delimiter distinctness, sibling
    /// tag ambiguity, empty groups)
    pub fn validate(&self) -> Result<()> {
        validate::check_edimap(self)
    }

    /// Every segment code reachable in this grammar
    pub fn segment_codes(&self) -> HashSet<String> {
        let mut codes = HashSet::new();
        collect_codes_group(&self.segments, &mut codes);
        codes
    }
}

fn collect_codes_group(group: &SegmentGroup, codes: &mut HashSet<String>) {
    for child in &group.children {
        collect_codes_child(child, codes);
    }
}

fn collect_codes_child(child: &GroupChild, codes: &mut HashSet<String>) {
    match child {
        GroupChild::Segment(s) => {
            codes.insert(s.segcode.clone());
            for nested in &s.children {
                collect_codes_child(nested, codes);
            }
        }
        GroupChild::Group(g) => collect_codes_group(g, codes),
    }
}

/// One child position inside a group or segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupChild {
    /// A concrete segment matched by tag
    Segment(Segment),
    /// A nested group entered via its leading segment tags
    Group(SegmentGroup),
}

impl GroupChild {
    /// Emitted element name of this child
    pub fn output_name(&self) -> &str {
        match self {
            GroupChild::Segment(s) => &s.output_name,
            GroupChild::Group(g) => &g.output_name,
        }
    }

    /// Emitted element namespace of this child
    pub fn namespace(&self) -> Option<&str> {
        match self {
            GroupChild::Segment(s) => s.namespace.as_deref(),
            GroupChild::Group(g) => g.namespace.as_deref(),
        }
    }

    /// Identifier used in failure reports: a segment's code, a group's
    /// output name
    pub fn grammar_name(&self) -> &str {
        match self {
            GroupChild::Segment(s) => &s.segcode,
            GroupChild::Group(g) => &g.output_name,
        }
    }

    /// Lower occurrence bound
    pub fn min_occurs(&self) -> usize {
        match self {
            GroupChild::Segment(s) => s.min_occurs,
            GroupChild::Group(g) => g.min_occurs,
        }
    }

    /// Upper occurrence bound
    pub fn max_occurs(&self) -> MaxOccurs {
        match self {
            GroupChild::Segment(s) => s.max_occurs,
            GroupChild::Group(g) => g.max_occurs,
        }
    }

    /// Can a raw segment with this tag start this child?
    pub fn matches_tag(&self, tag: &str) -> bool {
        match self {
            GroupChild::Segment(s) => s.segcode == tag,
            GroupChild::Group(g) => g.entry_tags().iter().any(|t| *t == tag),
        }
    }

    /// Tags that can open this child, in declaration order
    pub fn collect_entry_tags<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            GroupChild::Segment(s) => out.push(&s.segcode),
            GroupChild::Group(g) => g.collect_entry_tags(out),
        }
    }

    fn propagate_namespace(&mut self, ns: &str) {
        match self {
            GroupChild::Segment(s) => s.propagate_namespace(ns),
            GroupChild::Group(g) => g.propagate_namespace(ns),
        }
    }
}

/// A grammar group: segments and sub-groups with shared repeat semantics
///
/// Groups are structural only; no literal tag for the group appears in the
/// input. A group is entered when the next raw segment's tag is one of its
/// entry tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentGroup {
    /// Emitted element name
    pub output_name: String,
    /// Emitted element namespace
    pub namespace: Option<String>,
    /// Lower occurrence bound
    pub min_occurs: usize,
    /// Upper occurrence bound
    pub max_occurs: MaxOccurs,
    /// Ordered children, tried in declaration order
    pub children: Vec<GroupChild>,
}

impl SegmentGroup {
    /// Create an empty group occurring exactly once
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            namespace: None,
            min_occurs: 1,
            max_occurs: MaxOccurs::default(),
            children: Vec::new(),
        }
    }

    /// Set both occurrence bounds
    #[must_use]
    pub fn occurs(mut self, min: usize, max: MaxOccurs) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    /// Set the namespace for this group
    #[must_use]
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Append a segment child
    #[must_use]
    pub fn segment(mut self, segment: Segment) -> Self {
        self.children.push(GroupChild::Segment(segment));
        self
    }

    /// Append a nested group child
    #[must_use]
    pub fn group(mut self, group: SegmentGroup) -> Self {
        self.children.push(GroupChild::Group(group));
        self
    }

    /// Tags that can open this group
    ///
    /// Children contribute in declaration order up to and including the first
    /// mandatory child; anything later can never be the first segment of the
    /// group.
    pub fn entry_tags(&self) -> Vec<&str> {
        let mut tags = Vec::new();
        self.collect_entry_tags(&mut tags);
        tags
    }

    fn collect_entry_tags<'a>(&'a self, out: &mut Vec<&'a str>) {
        for child in &self.children {
            child.collect_entry_tags(out);
            if child.min_occurs() > 0 {
                break;
            }
        }
    }

    fn propagate_namespace(&mut self, ns: &str) {
        if self.namespace.is_none() {
            self.namespace = Some(ns.to_string());
        }
        for child in &mut self.children {
            child.propagate_namespace(ns);
        }
    }
}

/// A segment: one tagged record of ordered fields, possibly with nested
/// segments or groups below it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Tag matched against raw input segments
    pub segcode: String,
    /// Emitted element name
    pub output_name: String,
    /// Emitted element namespace
    pub namespace: Option<String>,
    /// Lower occurrence bound
    pub min_occurs: usize,
    /// Upper occurrence bound
    pub max_occurs: MaxOccurs,
    /// Drop trailing empty field positions when writing
    pub truncatable: bool,
    /// Accept raw fields beyond the declared list instead of failing
    pub ignore_unmapped_fields: bool,
    /// Human-readable note carried through from the grammar source
    pub description: Option<String>,
    /// Declared fields, matched positionally
    pub fields: Vec<Field>,
    /// Nested segments/groups parsed after this segment's own record
    pub children: Vec<GroupChild>,
}

impl Segment {
    /// Create a segment occurring exactly once, with no fields yet
    pub fn new(segcode: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            segcode: segcode.into(),
            output_name: output_name.into(),
            namespace: None,
            min_occurs: 1,
            max_occurs: MaxOccurs::default(),
            truncatable: false,
            ignore_unmapped_fields: false,
            description: None,
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Set both occurrence bounds
    #[must_use]
    pub fn occurs(mut self, min: usize, max: MaxOccurs) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    /// Set the namespace for this segment
    #[must_use]
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Allow trailing empty field positions to be dropped on write
    #[must_use]
    pub fn truncatable(mut self) -> Self {
        self.truncatable = true;
        self
    }

    /// Tolerate raw fields beyond the declared list
    #[must_use]
    pub fn ignore_unmapped_fields(mut self) -> Self {
        self.ignore_unmapped_fields = true;
        self
    }

    /// Attach a description note
    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Append a declared field
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a nested segment child
    #[must_use]
    pub fn segment(mut self, segment: Segment) -> Self {
        self.children.push(GroupChild::Segment(segment));
        self
    }

    /// Append a nested group child
    #[must_use]
    pub fn group(mut self, group: SegmentGroup) -> Self {
        self.children.push(GroupChild::Group(group));
        self
    }

    /// Apply `ns` to this segment and every descendant that has no
    /// explicit namespace of its own
    pub fn propagate_namespace(&mut self, ns: &str) {
        if self.namespace.is_none() {
            self.namespace = Some(ns.to_string());
        }
        for field in &mut self.fields {
            field.propagate_namespace(ns);
        }
        for child in &mut self.children {
            child.propagate_namespace(ns);
        }
    }
}

/// A field within a segment, simple or composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Emitted element name
    pub output_name: String,
    /// Emitted element namespace
    pub namespace: Option<String>,
    /// A present segment must carry a non-empty value at this position
    pub required: bool,
    /// Drop trailing empty component positions when writing
    pub truncatable: bool,
    /// Decode/encode semantics for simple fields
    pub data_type: DataType,
    /// Minimum decoded length, when bounded
    pub min_length: Option<usize>,
    /// Maximum decoded length, when bounded
    pub max_length: Option<usize>,
    /// Component list; empty for simple fields
    pub components: Vec<Component>,
}

impl Field {
    /// Create an optional simple string field
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            namespace: None,
            required: false,
            truncatable: false,
            data_type: DataType::default(),
            min_length: None,
            max_length: None,
            components: Vec::new(),
        }
    }

    /// Mark the field mandatory
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Allow trailing empty component positions to be dropped on write
    #[must_use]
    pub fn truncatable(mut self) -> Self {
        self.truncatable = true;
        self
    }

    /// Set the namespace for this field
    #[must_use]
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Set the data type
    #[must_use]
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Set the minimum value length
    #[must_use]
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Set the maximum value length
    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Append a component, making this a composite field
    #[must_use]
    pub fn component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// True when the field has declared components
    pub fn is_composite(&self) -> bool {
        !self.components.is_empty()
    }

    fn propagate_namespace(&mut self, ns: &str) {
        if self.namespace.is_none() {
            self.namespace = Some(ns.to_string());
        }
        for component in &mut self.components {
            component.propagate_namespace(ns);
        }
    }
}

/// A component within a composite field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Emitted element name
    pub output_name: String,
    /// Emitted element namespace
    pub namespace: Option<String>,
    /// A present field must carry a non-empty value at this position
    pub required: bool,
    /// Drop trailing empty sub-component positions when writing
    pub truncatable: bool,
    /// Decode/encode semantics for simple components
    pub data_type: DataType,
    /// Minimum decoded length, when bounded
    pub min_length: Option<usize>,
    /// Maximum decoded length, when bounded
    pub max_length: Option<usize>,
    /// Sub-component list; empty for simple components
    pub sub_components: Vec<SubComponent>,
}

impl Component {
    /// Create an optional simple string component
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            namespace: None,
            required: false,
            truncatable: false,
            data_type: DataType::default(),
            min_length: None,
            max_length: None,
            sub_components: Vec::new(),
        }
    }

    /// Mark the component mandatory
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Allow trailing empty sub-component positions to be dropped on write
    #[must_use]
    pub fn truncatable(mut self) -> Self {
        self.truncatable = true;
        self
    }

    /// Set the namespace for this component
    #[must_use]
    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Set the data type
    #[must_use]
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Set the minimum value length
    #[must_use]
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Set the maximum value length
    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Append a sub-component
    #[must_use]
    pub fn sub_component(mut self, sub: SubComponent) -> Self {
        self.sub_components.push(sub);
        self
    }

    /// True when the component has declared sub-components
    pub fn is_composite(&self) -> bool {
        !self.sub_components.is_empty()
    }

    fn propagate_namespace(&mut self, ns: &str) {
        if self.namespace.is_none() {
            self.namespace = Some(ns.to_string());
        }
        for sub in &mut self.sub_components {
            sub.propagate_namespace(ns);
        }
    }
}

/// A sub-component, the finest-grained value node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubComponent {
    /// Emitted element name
    pub output_name: String,
    /// Emitted element namespace
    pub namespace: Option<String>,
    /// A present component must carry a non-empty value at this position
    pub required: bool,
    /// Decode/encode semantics
    pub data_type: DataType,
    /// Minimum decoded length, when bounded
    pub min_length: Option<usize>,
    /// Maximum decoded length, when bounded
    pub max_length: Option<usize>,
}

impl SubComponent {
    /// Create an optional string sub-component
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            namespace: None,
            required: false,
            data_type: DataType::default(),
            min_length: None,
            max_length: None,
        }
    }

    /// Mark the sub-component mandatory
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the data type
    #[must_use]
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Set the minimum value length
    #[must_use]
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Set the maximum value length
    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    fn propagate_namespace(&mut self, ns: &str) {
        if self.namespace.is_none() {
            self.namespace = Some(ns.to_string());
        }
    }
}
