//! Eager grammar checks
//!
//! Configuration problems are caught once, when a grammar is built or
//! registered, never at parse time: duplicate delimiter characters, sibling
//! children sharing a distinguishing tag (the parser's one-segment lookahead
//! could not tell them apart), empty groups and empty segment codes.

use std::collections::HashSet;

use crate::model::{Edimap, GroupChild, Segment, SegmentGroup};
use crate::{Error, Result};

/// Validate a grammar document
pub fn check_edimap(edimap: &Edimap) -> Result<()> {
    edimap.delimiters.validate()?;
    check_group(&edimap.segments)
}

fn check_group(group: &SegmentGroup) -> Result<()> {
    if group.children.is_empty() {
        return Err(Error::EmptyGroup {
            name: group.output_name.clone(),
        });
    }
    check_children(&group.output_name, &group.children)
}

fn check_segment(segment: &Segment) -> Result<()> {
    if segment.segcode.is_empty() {
        return Err(Error::EmptySegcode {
            name: segment.output_name.clone(),
        });
    }
    if !segment.children.is_empty() {
        check_children(&segment.output_name, &segment.children)?;
    }
    Ok(())
}

fn check_children(container: &str, children: &[GroupChild]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for child in children {
        let mut tags = Vec::new();
        child.collect_entry_tags(&mut tags);
        for tag in tags {
            if !seen.insert(tag) {
                return Err(Error::AmbiguousGrammar {
                    container: container.to_string(),
                    tag: tag.to_string(),
                });
            }
        }
        match child {
            GroupChild::Segment(s) => check_segment(s)?,
            GroupChild::Group(g) => check_group(g)?,
        }
    }
    Ok(())
}
