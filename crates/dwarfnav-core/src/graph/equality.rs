//! Structural type equality.
//!
//! Types can be recursive (a list node pointing at its own type), so the
//! comparison is coinductive: a pair currently being compared is assumed
//! equal, and the assumption is only discharged if nothing else differs.
//!
//! Results are memoized on the graph. A negative answer never depends on an
//! assumption and is always kept. A positive answer is only kept when it was
//! reached with no assumption outstanding, since one made inside an enclosing
//! comparison may later turn out false.

use std::collections::HashSet;

use gimli::DwTag;

use super::{Cursor, DieGraph};
use crate::attr::AttributeValue;
use crate::error::DwarfResult;
use crate::types::DieOffset;

/// Children that take part in a type's structure
const STRUCTURAL_CHILDREN: [DwTag; 6] = [
    gimli::DW_TAG_member,
    gimli::DW_TAG_enumerator,
    gimli::DW_TAG_subrange_type,
    gimli::DW_TAG_formal_parameter,
    gimli::DW_TAG_inheritance,
    gimli::DW_TAG_variant_part,
];

type Pair = (DieOffset, DieOffset);

impl DieGraph<'_>
{
    /// Whether the types at `a` and `b` are structurally equal.
    ///
    /// Compares tag, name, byte size, encoding, referenced types, array
    /// bounds, member locations and constant values, then the structural
    /// children pairwise in declaration order.
    pub fn types_equal(&self, a: &Cursor, b: &Cursor) -> DwarfResult<bool>
    {
        let mut assumed = HashSet::new();
        self.equal_under(a.offset(), b.offset(), &mut assumed)
    }

    fn equal_under(&self, a: DieOffset, b: DieOffset, assumed: &mut HashSet<Pair>) -> DwarfResult<bool>
    {
        if a == b {
            return Ok(true);
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(known) = self.type_equality.borrow().get(&(key.0.value(), key.1.value())).copied() {
            return Ok(known);
        }
        if assumed.contains(&key) {
            return Ok(true);
        }

        assumed.insert(key);
        let result = self.structurally_equal(a, b, assumed);
        assumed.remove(&key);
        let result = result?;

        if !result || assumed.is_empty() {
            self.type_equality.borrow_mut().insert((key.0.value(), key.1.value()), result);
        }
        Ok(result)
    }

    fn structurally_equal(&self, a: DieOffset, b: DieOffset, assumed: &mut HashSet<Pair>) -> DwarfResult<bool>
    {
        let (a, b) = (self.find(a)?, self.find(b)?);
        let (Some(left), Some(right)) = (self.die(&a)?, self.die(&b)?) else {
            return Ok(a == b);
        };
        if left.tag != right.tag {
            return Ok(false);
        }
        for at in [
            gimli::DW_AT_name,
            gimli::DW_AT_byte_size,
            gimli::DW_AT_bit_size,
            gimli::DW_AT_encoding,
            gimli::DW_AT_lower_bound,
            gimli::DW_AT_upper_bound,
            gimli::DW_AT_count,
            gimli::DW_AT_const_value,
            gimli::DW_AT_data_member_location,
            gimli::DW_AT_data_bit_offset,
        ] {
            if !same_value(left.attr(at), right.attr(at)) {
                return Ok(false);
            }
        }

        match (left.attr(gimli::DW_AT_type), right.attr(gimli::DW_AT_type)) {
            (AttributeValue::NotPresent, AttributeValue::NotPresent) => {}
            (l, r) => match (l.as_reference(), r.as_reference()) {
                (Some(l), Some(r)) => {
                    if !self.equal_under(l, r, assumed)? {
                        return Ok(false);
                    }
                }
                _ => {
                    if l != r {
                        return Ok(false);
                    }
                }
            },
        }

        let left_children = self.structural_children(&a)?;
        let right_children = self.structural_children(&b)?;
        if left_children.len() != right_children.len() {
            return Ok(false);
        }
        for (l, r) in left_children.iter().zip(&right_children) {
            if !self.equal_under(l.offset(), r.offset(), assumed)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn structural_children(&self, cursor: &Cursor) -> DwarfResult<Vec<Cursor>>
    {
        let mut out = Vec::new();
        for child in self.children(cursor) {
            let child = child?;
            if let Some(tag) = self.tag(&child)? {
                if STRUCTURAL_CHILDREN.contains(&tag) {
                    out.push(child);
                }
            }
        }
        Ok(out)
    }
}

/// Attribute equality that treats signed and unsigned encodings of the same constant alike
fn same_value(left: &AttributeValue, right: &AttributeValue) -> bool
{
    match (left.as_signed(), right.as_signed()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}
