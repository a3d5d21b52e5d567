//! Field-type (FT) trees (§3, §4.B).
//!
//! Field types form a DAG of nodes, but ownership is arena-based rather
//! than refcounted: every FT belongs to exactly one [`Arena`], and children
//! are referenced by [`FieldTypeId`] index rather than by pointer. This
//! sidesteps the reference-cycle bookkeeping a refcounted tree needs for
//! `struct`/`variant` nesting and mirrors how `TraceClass` (in
//! [`crate::trace_ir`]) owns the field types for every stream/event class
//! it exposes.

use crate::clock::ClockClassId;
use crate::error::ErrorKind;
use std::collections::HashSet;
use std::fmt::Write as _;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("field type is frozen and cannot be mutated")]
    Frozen,

    #[error("duplicate field name '{0}' in struct/variant")]
    DuplicateFieldName(String),

    #[error("'{0}' is not a valid CTF identifier")]
    InvalidIdentifier(String),

    #[error("variant arm '{0}' does not match any mapping of its tag enum")]
    ArmNotInTag(String),

    #[error("variant tag type must be an enum without overlapping ranges")]
    InvalidVariantTag,

    #[error("signed integer field types must not have a mapped clock class")]
    SignedIntegerWithClock,

    #[error("array length must be positive")]
    NonPositiveArrayLength,

    #[error("sequence length field name must not be empty")]
    EmptySequenceLengthField,

    #[error("float field type must use one of the three IEEE 754 exponent/mantissa pairs")]
    InvalidFloatShape,

    #[error("malformed TSDL metadata at byte {pos}: {reason}")]
    Parse { pos: usize, reason: String },

    #[error("unknown field type id {0:?} referenced")]
    UnknownId(FieldTypeId),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Frozen => ErrorKind::InvalidState,
            Error::DuplicateFieldName(_)
            | Error::InvalidIdentifier(_)
            | Error::ArmNotInTag(_)
            | Error::InvalidVariantTag
            | Error::SignedIntegerWithClock
            | Error::NonPositiveArrayLength
            | Error::EmptySequenceLengthField
            | Error::InvalidFloatShape => ErrorKind::InvalidArgument,
            Error::Parse { .. } => ErrorKind::DecodeMalformed,
            Error::UnknownId(_) => ErrorKind::NotFound,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FieldTypeId(pub usize);

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ByteOrder {
    Native,
    Le,
    Be,
    Network,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum IntegerBase {
    Bin,
    Oct,
    Dec,
    Hex,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum IntegerEncoding {
    None,
    Ascii,
    Utf8,
}

#[derive(Clone, Debug)]
pub struct IntegerFt {
    pub size: u8,
    pub signed: bool,
    pub base: IntegerBase,
    pub encoding: IntegerEncoding,
    pub mapped_clock_class: Option<ClockClassId>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FloatFt {
    pub exp_bits: u8,
    pub mant_bits: u8,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EnumRange {
    Signed(i64, i64),
    Unsigned(u64, u64),
}

impl EnumRange {
    fn overlaps(&self, other: &EnumRange) -> bool {
        match (self, other) {
            (EnumRange::Signed(a0, a1), EnumRange::Signed(b0, b1)) => a0 <= b1 && b0 <= a1,
            (EnumRange::Unsigned(a0, a1), EnumRange::Unsigned(b0, b1)) => a0 <= b1 && b0 <= a1,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EnumFt {
    pub container: FieldTypeId,
    pub mappings: Vec<(String, EnumRange)>,
    pub has_overlapping_ranges: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct StructFt {
    pub fields: Vec<(String, FieldTypeId)>,
}

#[derive(Clone, Debug)]
pub struct VariantFt {
    pub tag_field_name: String,
    pub tag_type: FieldTypeId,
    pub arms: Vec<(String, FieldTypeId)>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ArrayFt {
    pub element: FieldTypeId,
    pub length: u64,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SequenceFt {
    pub element: FieldTypeId,
    pub length_field_name: String,
}

#[derive(Clone, Debug)]
pub enum Kind {
    Integer(IntegerFt),
    Float(FloatFt),
    Enum(EnumFt),
    String,
    Struct(StructFt),
    Variant(VariantFt),
    Array(ArrayFt),
    Sequence(SequenceFt),
}

impl Kind {
    fn name(&self) -> &'static str {
        match self {
            Kind::Integer(_) => "integer",
            Kind::Float(_) => "float",
            Kind::Enum(_) => "enum",
            Kind::String => "string",
            Kind::Struct(_) => "struct",
            Kind::Variant(_) => "variant",
            Kind::Array(_) => "array",
            Kind::Sequence(_) => "sequence",
        }
    }
}

#[derive(Clone, Debug)]
struct Node {
    alignment: u32,
    byte_order: ByteOrder,
    frozen: bool,
    kind: Kind,
}

/// Owns every field type reachable from the trace/stream/event classes
/// that were built from the same piece of metadata (§4.B, §9 Design
/// Notes).
#[derive(Clone, Debug, Default)]
pub struct Arena {
    nodes: Vec<Node>,
}

const CHAR_BIT: u32 = 8;

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, alignment: u32, byte_order: ByteOrder, kind: Kind) -> FieldTypeId {
        self.nodes.push(Node {
            alignment,
            byte_order,
            frozen: false,
            kind,
        });
        FieldTypeId(self.nodes.len() - 1)
    }

    fn node(&self, id: FieldTypeId) -> Result<&Node, Error> {
        self.nodes.get(id.0).ok_or(Error::UnknownId(id))
    }

    fn node_mut(&mut self, id: FieldTypeId) -> Result<&mut Node, Error> {
        self.nodes.get_mut(id.0).ok_or(Error::UnknownId(id))
    }

    pub fn alignment(&self, id: FieldTypeId) -> Result<u32, Error> {
        Ok(self.node(id)?.alignment)
    }

    pub fn is_frozen(&self, id: FieldTypeId) -> Result<bool, Error> {
        Ok(self.node(id)?.frozen)
    }

    pub fn byte_order(&self, id: FieldTypeId) -> Result<ByteOrder, Error> {
        Ok(self.node(id)?.byte_order)
    }

    pub fn kind(&self, id: FieldTypeId) -> Result<&Kind, Error> {
        Ok(&self.node(id)?.kind)
    }

    pub fn integer(
        &mut self,
        size: u8,
        signed: bool,
        base: IntegerBase,
        encoding: IntegerEncoding,
        byte_order: ByteOrder,
        mapped_clock_class: Option<ClockClassId>,
    ) -> Result<FieldTypeId, Error> {
        if signed && mapped_clock_class.is_some() {
            return Err(Error::SignedIntegerWithClock);
        }
        let alignment = 1;
        Ok(self.push(
            alignment,
            byte_order,
            Kind::Integer(IntegerFt {
                size,
                signed,
                base,
                encoding,
                mapped_clock_class,
            }),
        ))
    }

    pub fn float(&mut self, exp_bits: u8, mant_bits: u8, byte_order: ByteOrder) -> Result<FieldTypeId, Error> {
        match (exp_bits, mant_bits) {
            (8, 24) | (11, 53) | (15, 64) => {}
            _ => return Err(Error::InvalidFloatShape),
        }
        Ok(self.push(1, byte_order, Kind::Float(FloatFt { exp_bits, mant_bits })))
    }

    pub fn string(&mut self) -> FieldTypeId {
        self.push(CHAR_BIT, ByteOrder::Native, Kind::String)
    }

    pub fn enum_(&mut self, container: FieldTypeId) -> Result<FieldTypeId, Error> {
        let alignment = self.alignment(container)?;
        Ok(self.push(
            alignment,
            ByteOrder::Native,
            Kind::Enum(EnumFt {
                container,
                mappings: Vec::new(),
                has_overlapping_ranges: None,
            }),
        ))
    }

    pub fn enum_add_mapping(
        &mut self,
        id: FieldTypeId,
        label: impl Into<String>,
        range: EnumRange,
    ) -> Result<(), Error> {
        let label = label.into();
        validate_identifier(&label)?;
        let node = self.node_mut(id)?;
        if node.frozen {
            return Err(Error::Frozen);
        }
        match &mut node.kind {
            Kind::Enum(e) => {
                e.mappings.push((label, range));
                e.has_overlapping_ranges = None;
                Ok(())
            }
            _ => Err(Error::UnknownId(id)),
        }
    }

    pub fn struct_(&mut self) -> FieldTypeId {
        self.push(1, ByteOrder::Native, Kind::Struct(StructFt::default()))
    }

    /// Adds a named field to a struct, recomputing the struct's alignment
    /// as the max of its children's (§3).
    pub fn add_field(
        &mut self,
        struct_id: FieldTypeId,
        name: impl Into<String>,
        field_id: FieldTypeId,
    ) -> Result<(), Error> {
        let name = name.into();
        validate_identifier(&name)?;
        let field_alignment = self.alignment(field_id)?;
        let node = self.node_mut(struct_id)?;
        if node.frozen {
            return Err(Error::Frozen);
        }
        match &mut node.kind {
            Kind::Struct(s) => {
                if s.fields.iter().any(|(n, _)| *n == name || *n == format!("_{name}")) {
                    return Err(Error::DuplicateFieldName(name));
                }
                s.fields.push((name, field_id));
                node.alignment = node.alignment.max(field_alignment);
                Ok(())
            }
            _ => Err(Error::UnknownId(struct_id)),
        }
    }

    pub fn variant(
        &mut self,
        tag_field_name: impl Into<String>,
        tag_type: FieldTypeId,
    ) -> Result<FieldTypeId, Error> {
        let tag_field_name = tag_field_name.into();
        validate_identifier(&tag_field_name)?;
        match self.kind(tag_type)? {
            Kind::Enum(_) => {}
            _ => return Err(Error::InvalidVariantTag),
        }
        Ok(self.push(
            1,
            ByteOrder::Native,
            Kind::Variant(VariantFt {
                tag_field_name,
                tag_type,
                arms: Vec::new(),
            }),
        ))
    }

    pub fn variant_add_arm(
        &mut self,
        variant_id: FieldTypeId,
        label: impl Into<String>,
        arm_id: FieldTypeId,
    ) -> Result<(), Error> {
        let label = label.into();
        let arm_alignment = self.alignment(arm_id)?;
        let tag_type = match self.kind(variant_id)? {
            Kind::Variant(v) => v.tag_type,
            _ => return Err(Error::UnknownId(variant_id)),
        };
        let tag_has_label = match self.kind(tag_type)? {
            Kind::Enum(e) => e.mappings.iter().any(|(l, _)| *l == label),
            _ => false,
        };
        if !tag_has_label {
            return Err(Error::ArmNotInTag(label));
        }
        let node = self.node_mut(variant_id)?;
        if node.frozen {
            return Err(Error::Frozen);
        }
        node.alignment = node.alignment.max(arm_alignment);
        match &mut node.kind {
            Kind::Variant(v) => {
                v.arms.push((label, arm_id));
                Ok(())
            }
            _ => unreachable!(),
        }
    }

    pub fn array(&mut self, element: FieldTypeId, length: u64) -> Result<FieldTypeId, Error> {
        if length == 0 {
            return Err(Error::NonPositiveArrayLength);
        }
        let alignment = self.alignment(element)?;
        Ok(self.push(alignment, ByteOrder::Native, Kind::Array(ArrayFt { element, length })))
    }

    pub fn sequence(
        &mut self,
        element: FieldTypeId,
        length_field_name: impl Into<String>,
    ) -> Result<FieldTypeId, Error> {
        let length_field_name = length_field_name.into();
        if length_field_name.is_empty() {
            return Err(Error::EmptySequenceLengthField);
        }
        let alignment = self.alignment(element)?;
        Ok(self.push(
            alignment,
            ByteOrder::Native,
            Kind::Sequence(SequenceFt {
                element,
                length_field_name,
            }),
        ))
    }

    /// Deep-freezes `id` and everything it transitively references,
    /// computing `has_overlapping_ranges` for any enum along the way
    /// (§4.B, §3).
    pub fn freeze(&mut self, id: FieldTypeId) -> Result<(), Error> {
        let children = self.children_of(id)?;
        for child in children {
            self.freeze(child)?;
        }
        if let Kind::Enum(e) = &self.node(id)?.kind {
            let overlap = has_overlap(&e.mappings);
            if let Kind::Enum(e) = &mut self.node_mut(id)?.kind {
                e.has_overlapping_ranges = Some(overlap);
            }
        }
        self.node_mut(id)?.frozen = true;
        Ok(())
    }

    fn children_of(&self, id: FieldTypeId) -> Result<Vec<FieldTypeId>, Error> {
        Ok(match self.kind(id)? {
            Kind::Integer(_) | Kind::Float(_) | Kind::String => vec![],
            Kind::Enum(e) => vec![e.container],
            Kind::Struct(s) => s.fields.iter().map(|(_, id)| *id).collect(),
            Kind::Variant(v) => {
                let mut c = vec![v.tag_type];
                c.extend(v.arms.iter().map(|(_, id)| *id));
                c
            }
            Kind::Array(a) => vec![a.element],
            Kind::Sequence(s) => vec![s.element],
        })
    }

    /// Validates structural invariants top-down, returning the first
    /// offending node's id (§4.B).
    pub fn validate(&self, id: FieldTypeId) -> Result<(), Error> {
        match self.kind(id)? {
            Kind::Variant(v) => {
                let tag_overlaps = match self.kind(v.tag_type)? {
                    Kind::Enum(e) => self.is_frozen(v.tag_type)? && has_overlap(&e.mappings),
                    _ => return Err(Error::InvalidVariantTag),
                };
                if tag_overlaps {
                    return Err(Error::InvalidVariantTag);
                }
                for (label, _) in &v.arms {
                    self.validate(v.tag_type)?;
                    let in_tag = match self.kind(v.tag_type)? {
                        Kind::Enum(e) => e.mappings.iter().any(|(l, _)| l == label),
                        _ => false,
                    };
                    if !in_tag {
                        return Err(Error::ArmNotInTag(label.clone()));
                    }
                }
                for (_, arm) in &v.arms {
                    self.validate(*arm)?;
                }
                Ok(())
            }
            Kind::Struct(s) => {
                let mut seen = HashSet::new();
                for (name, field) in &s.fields {
                    if !seen.insert(name.clone()) {
                        return Err(Error::DuplicateFieldName(name.clone()));
                    }
                    self.validate(*field)?;
                }
                Ok(())
            }
            Kind::Array(a) => {
                if a.length == 0 {
                    return Err(Error::NonPositiveArrayLength);
                }
                self.validate(a.element)
            }
            Kind::Sequence(s) => {
                if s.length_field_name.is_empty() {
                    return Err(Error::EmptySequenceLengthField);
                }
                self.validate(s.element)
            }
            Kind::Enum(e) => self.validate(e.container),
            Kind::Integer(i) => {
                if i.signed && i.mapped_clock_class.is_some() {
                    Err(Error::SignedIntegerWithClock)
                } else {
                    Ok(())
                }
            }
            Kind::Float(f) => match (f.exp_bits, f.mant_bits) {
                (8, 24) | (11, 53) | (15, 64) => Ok(()),
                _ => Err(Error::InvalidFloatShape),
            },
            Kind::String => Ok(()),
        }
    }

    /// Deep copy of the subtree rooted at `id` into `dest`, returning the
    /// new root id. Frozenness is never copied (§4.B).
    pub fn copy_into(&self, id: FieldTypeId, dest: &mut Arena) -> Result<FieldTypeId, Error> {
        let node = self.node(id)?;
        let kind = match &node.kind {
            Kind::Integer(i) => Kind::Integer(i.clone()),
            Kind::Float(f) => Kind::Float(*f),
            Kind::String => Kind::String,
            Kind::Enum(e) => {
                let container = self.copy_into(e.container, dest)?;
                Kind::Enum(EnumFt {
                    container,
                    mappings: e.mappings.clone(),
                    has_overlapping_ranges: None,
                })
            }
            Kind::Struct(s) => {
                let mut fields = Vec::with_capacity(s.fields.len());
                for (name, field) in &s.fields {
                    fields.push((name.clone(), self.copy_into(*field, dest)?));
                }
                Kind::Struct(StructFt { fields })
            }
            Kind::Variant(v) => {
                let tag_type = self.copy_into(v.tag_type, dest)?;
                let mut arms = Vec::with_capacity(v.arms.len());
                for (label, arm) in &v.arms {
                    arms.push((label.clone(), self.copy_into(*arm, dest)?));
                }
                Kind::Variant(VariantFt {
                    tag_field_name: v.tag_field_name.clone(),
                    tag_type,
                    arms,
                })
            }
            Kind::Array(a) => {
                let element = self.copy_into(a.element, dest)?;
                Kind::Array(ArrayFt { element, length: a.length })
            }
            Kind::Sequence(s) => {
                let element = self.copy_into(s.element, dest)?;
                Kind::Sequence(SequenceFt {
                    element,
                    length_field_name: s.length_field_name.clone(),
                })
            }
        };
        Ok(dest.push(node.alignment, node.byte_order, kind))
    }

    /// Deep structural equality, ignoring `frozen` (§4.B).
    pub fn compare(&self, a: FieldTypeId, other: &Arena, b: FieldTypeId) -> Result<bool, Error> {
        let na = self.node(a)?;
        let nb = other.node(b)?;
        if na.alignment != nb.alignment || na.byte_order != nb.byte_order {
            return Ok(false);
        }
        Ok(match (&na.kind, &nb.kind) {
            (Kind::Integer(x), Kind::Integer(y)) => {
                x.size == y.size
                    && x.signed == y.signed
                    && x.base == y.base
                    && x.encoding == y.encoding
                    && x.mapped_clock_class == y.mapped_clock_class
            }
            (Kind::Float(x), Kind::Float(y)) => x == y,
            (Kind::String, Kind::String) => true,
            (Kind::Enum(x), Kind::Enum(y)) => {
                x.mappings == y.mappings && self.compare(x.container, other, y.container)?
            }
            (Kind::Struct(x), Kind::Struct(y)) => {
                x.fields.len() == y.fields.len()
                    && x.fields
                        .iter()
                        .zip(y.fields.iter())
                        .try_fold(true, |acc, ((na, fa), (nb, fb))| {
                            Ok::<_, Error>(acc && na == nb && self.compare(*fa, other, *fb)?)
                        })?
            }
            (Kind::Variant(x), Kind::Variant(y)) => {
                x.tag_field_name == y.tag_field_name
                    && self.compare(x.tag_type, other, y.tag_type)?
                    && x.arms.len() == y.arms.len()
                    && x.arms
                        .iter()
                        .zip(y.arms.iter())
                        .try_fold(true, |acc, ((la, fa), (lb, fb))| {
                            Ok::<_, Error>(acc && la == lb && self.compare(*fa, other, *fb)?)
                        })?
            }
            (Kind::Array(x), Kind::Array(y)) => {
                x.length == y.length && self.compare(x.element, other, y.element)?
            }
            (Kind::Sequence(x), Kind::Sequence(y)) => {
                x.length_field_name == y.length_field_name
                    && self.compare(x.element, other, y.element)?
            }
            _ => false,
        })
    }

    /// Writes TSDL-compatible textual metadata for the subtree at `id`
    /// (§4.B `serialize`).
    pub fn serialize(&self, id: FieldTypeId, out: &mut String, indent: usize) -> Result<(), Error> {
        let pad = "\t".repeat(indent);
        match self.kind(id)? {
            Kind::Integer(i) => {
                let _ = write!(
                    out,
                    "integer {{ size = {}; signed = {}; base = {}; encoding = {}; byte_order = {}; }}",
                    i.size,
                    i.signed as u8,
                    base_str(i.base),
                    encoding_str(i.encoding),
                    byte_order_str(self.node(id)?.byte_order),
                );
            }
            Kind::Float(f) => {
                let _ = write!(out, "floating_point {{ exp_dig = {}; mant_dig = {}; }}", f.exp_bits, f.mant_bits);
            }
            Kind::String => {
                let _ = write!(out, "string");
            }
            Kind::Enum(e) => {
                let _ = writeln!(out, "enum : ");
                self.serialize(e.container, out, indent)?;
                let _ = writeln!(out, " {{");
                for (label, range) in &e.mappings {
                    let _ = match range {
                        EnumRange::Signed(lo, hi) if lo == hi => {
                            writeln!(out, "{pad}\t\"{label}\" = {lo},")
                        }
                        EnumRange::Signed(lo, hi) => writeln!(out, "{pad}\t\"{label}\" = {lo} ... {hi},"),
                        EnumRange::Unsigned(lo, hi) if lo == hi => {
                            writeln!(out, "{pad}\t\"{label}\" = {lo},")
                        }
                        EnumRange::Unsigned(lo, hi) => writeln!(out, "{pad}\t\"{label}\" = {lo} ... {hi},"),
                    };
                }
                let _ = write!(out, "{pad}}}");
            }
            Kind::Struct(s) => {
                let _ = writeln!(out, "struct {{");
                for (name, field) in &s.fields {
                    let _ = write!(out, "{pad}\t");
                    self.serialize(*field, out, indent + 1)?;
                    let _ = writeln!(out, " {name};");
                }
                let _ = write!(out, "{pad}}}");
            }
            Kind::Variant(v) => {
                let _ = writeln!(out, "variant <{}> {{", v.tag_field_name);
                for (label, arm) in &v.arms {
                    let _ = write!(out, "{pad}\t");
                    self.serialize(*arm, out, indent + 1)?;
                    let _ = writeln!(out, " {label};");
                }
                let _ = write!(out, "{pad}}}");
            }
            Kind::Array(a) => {
                self.serialize(a.element, out, indent)?;
                let _ = write!(out, "[{}]", a.length);
            }
            Kind::Sequence(s) => {
                self.serialize(s.element, out, indent)?;
                let _ = write!(out, "[{}]", s.length_field_name);
            }
        }
        Ok(())
    }
}

fn has_overlap(mappings: &[(String, EnumRange)]) -> bool {
    for i in 0..mappings.len() {
        for j in (i + 1)..mappings.len() {
            if mappings[i].1.overlaps(&mappings[j].1) {
                return true;
            }
        }
    }
    false
}

fn base_str(b: IntegerBase) -> &'static str {
    match b {
        IntegerBase::Bin => "2",
        IntegerBase::Oct => "8",
        IntegerBase::Dec => "10",
        IntegerBase::Hex => "16",
    }
}

fn encoding_str(e: IntegerEncoding) -> &'static str {
    match e {
        IntegerEncoding::None => "none",
        IntegerEncoding::Ascii => "ASCII",
        IntegerEncoding::Utf8 => "UTF8",
    }
}

fn byte_order_str(b: ByteOrder) -> &'static str {
    match b {
        ByteOrder::Native => "native",
        ByteOrder::Le => "le",
        ByteOrder::Be => "be",
        ByteOrder::Network => "network",
    }
}

/// CTF identifiers: `[A-Za-z_][A-Za-z0-9_]*`, not a bare reserved word,
/// and (§3) never the synthesised `_name` form of another field in the
/// same scope — that check happens at `add_field` time since it's scope
/// relative.
pub fn validate_identifier(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if ok && !name.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_alignment_is_max_of_children() {
        let mut a = Arena::new();
        let i8f = a
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let strct = a.struct_();
        a.add_field(strct, "x", i8f).unwrap();
        assert_eq!(a.alignment(strct).unwrap(), 8);
    }

    #[test]
    fn duplicate_field_name_rejected() {
        let mut a = Arena::new();
        let i8f = a
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let strct = a.struct_();
        a.add_field(strct, "x", i8f).unwrap();
        let i8f2 = a
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        assert!(matches!(
            a.add_field(strct, "x", i8f2),
            Err(Error::DuplicateFieldName(_))
        ));
    }

    #[test]
    fn signed_integer_with_clock_rejected() {
        let mut a = Arena::new();
        let cc = crate::clock::ClockClassId(0);
        assert!(matches!(
            a.integer(64, true, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Le, Some(cc)),
            Err(Error::SignedIntegerWithClock)
        ));
    }

    #[test]
    fn freeze_computes_overlap() {
        let mut a = Arena::new();
        let c = a
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let e = a.enum_(c).unwrap();
        a.enum_add_mapping(e, "A", EnumRange::Unsigned(0, 5)).unwrap();
        a.enum_add_mapping(e, "B", EnumRange::Unsigned(3, 8)).unwrap();
        a.freeze(e).unwrap();
        match a.kind(e).unwrap() {
            Kind::Enum(ft) => assert_eq!(ft.has_overlapping_ranges, Some(true)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn variant_arm_must_match_tag_mapping() {
        let mut a = Arena::new();
        let c = a
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let tag = a.enum_(c).unwrap();
        a.enum_add_mapping(tag, "A", EnumRange::Unsigned(0, 0)).unwrap();
        let v = a.variant("tag", tag).unwrap();
        let s = a.string();
        assert!(matches!(a.variant_add_arm(v, "B", s), Err(Error::ArmNotInTag(_))));
        assert!(a.variant_add_arm(v, "A", s).is_ok());
    }

    #[test]
    fn deep_copy_and_compare_round_trip() {
        let mut a = Arena::new();
        let i8f = a
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let strct = a.struct_();
        a.add_field(strct, "x", i8f).unwrap();

        let mut b = Arena::new();
        let copied = a.copy_into(strct, &mut b).unwrap();
        assert!(a.compare(strct, &b, copied).unwrap());
        assert!(!b.is_frozen(copied).unwrap());
    }

    #[test]
    fn serialize_struct_emits_tsdl_like_text() {
        let mut a = Arena::new();
        let i8f = a
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let strct = a.struct_();
        a.add_field(strct, "x", i8f).unwrap();
        let mut out = String::new();
        a.serialize(strct, &mut out, 0).unwrap();
        assert!(out.contains("struct {"));
        assert!(out.contains("integer {"));
        assert!(out.contains("x;"));
    }

    #[test]
    fn identifier_validation() {
        assert!(validate_identifier("_foo_1").is_ok());
        assert!(validate_identifier("1foo").is_err());
        assert!(validate_identifier("").is_err());
    }
}
