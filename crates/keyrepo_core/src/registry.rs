//! Handler-code dispatch for reading and writing keys and auxiliary values.
//!
//! # Key record
//!
//! ```text
//! i16 handler | i32 unit | fields
//!
//! Project, containers   (none)
//! Namespace             str qualified name
//! File                  str path
//! offset-anchored       str file | str name | i32 start | i32 end
//! ```
//!
//! The handler code alone selects the variant, including the offset kind.
//! An absent optional key is written as the bare [`HandlerCode::Null`] code.
//! Every key read back is interned unless its kind is a declaration.

use crate::codec::{KeyInput, KeyOutput};
use crate::error::{KeyRepoError, Result};
use crate::handler::{HandlerCode, KeyShape};
use crate::key::{Key, KeyData, SharedKey, Visibility, NON_INITIALIZED};
use crate::pool::{KeyPool, NamePool};
use crate::unit::UnitId;
use crate::values::{
    AuxValue, CompoundBody, Expression, Param, ParamList, SpecializationDescriptor,
    TemplateDescriptor, TypeRef, ValueTag,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Whether per-key trace logging applies to `key`.
///
/// Without a filter every key is traced; with one, only keys whose name or
/// file contains the filter.
pub fn is_tracing_key(key: &Key, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(filter) => {
            key.name().is_some_and(|n| n.contains(filter))
                || key.file_path().is_some_and(|f| f.contains(filter))
        }
    }
}

/// Sort key of offset-sorted maps: start offset, then name.
///
/// Orders offset-anchored keys of one file the way [`Key::offset_order`]
/// does.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OffsetSortedKey {
    /// Start offset.
    pub start: i32,
    /// Full name.
    pub name: Arc<str>,
}

impl OffsetSortedKey {
    /// Sort key of an offset-anchored key; `None` for other kinds.
    pub fn of(key: &Key) -> Option<Self> {
        match key.data() {
            KeyData::Offset(o) => Some(Self {
                start: o.start(),
                name: o.name_arc().clone(),
            }),
            _ => None,
        }
    }
}

/// Reads and writes keys and auxiliary values, interning what it reads.
pub struct KeyRegistry {
    keys: Arc<KeyPool>,
    names: Arc<NamePool>,
    key_filter: Option<String>,
}

impl KeyRegistry {
    /// Creates a registry over the given pools.
    pub fn new(keys: Arc<KeyPool>, names: Arc<NamePool>) -> Self {
        Self {
            keys,
            names,
            key_filter: None,
        }
    }

    /// Restricts per-key tracing to keys matching `filter`.
    pub fn with_key_filter(mut self, filter: Option<String>) -> Self {
        self.key_filter = filter;
        self
    }

    /// Pool keys are interned into.
    pub fn key_pool(&self) -> &Arc<KeyPool> {
        &self.keys
    }

    /// Whether per-key trace logging applies to `key`.
    pub fn is_tracing_key(&self, key: &Key) -> bool {
        is_tracing_key(key, self.key_filter.as_deref())
    }

    /// Canonical instance of `key`, or a fresh `Arc` for declaration keys.
    pub fn intern(&self, key: Key) -> SharedKey {
        if key.is_interned() {
            self.keys.intern(key)
        } else {
            Arc::new(key)
        }
    }

    // ---- keys ----

    /// Writes one key.
    pub fn write_key(&self, key: &Key, out: &mut KeyOutput) -> Result<()> {
        self.write_record(key, false, out)
    }

    fn write_record(&self, key: &Key, identity_only: bool, out: &mut KeyOutput) -> Result<()> {
        out.write_i16(key.handler().code());
        out.write_i32(key.unit().get());
        match key.data() {
            KeyData::Project | KeyData::Container(_) => {}
            KeyData::Namespace { name } => out.write_str(name)?,
            KeyData::File { path } => out.write_str(path)?,
            KeyData::Offset(o) => {
                out.write_str(o.file())?;
                out.write_str(o.name())?;
                out.write_i32(o.start());
                out.write_i32(if identity_only { NON_INITIALIZED } else { o.end() });
            }
        }
        Ok(())
    }

    /// Writes an optional key.
    pub fn write_opt_key(&self, key: Option<&Key>, out: &mut KeyOutput) -> Result<()> {
        match key {
            Some(key) => self.write_key(key, out),
            None => {
                out.write_i16(HandlerCode::Null.code());
                Ok(())
            }
        }
    }

    /// Writes a count followed by each key.
    pub fn write_keys<'k, I>(&self, keys: I, out: &mut KeyOutput) -> Result<()>
    where
        I: IntoIterator<Item = &'k Key>,
        I::IntoIter: ExactSizeIterator,
    {
        let keys = keys.into_iter();
        out.write_count(keys.len())?;
        for key in keys {
            self.write_key(key, out)?;
        }
        Ok(())
    }

    /// Reads an optional key.
    ///
    /// # Panics
    ///
    /// Panics on an unknown handler code or a reserved unit id; both mean
    /// the stream is corrupt or from another format version.
    pub fn read_opt_key(&self, input: &mut KeyInput<'_>) -> Result<Option<SharedKey>> {
        let offset = input.position();
        let code = input.read_i16()?;
        let handler = HandlerCode::from_code(code)
            .unwrap_or_else(|| panic!("unknown key handler code {code} at offset {offset}"));
        let Some(shape) = handler.shape() else {
            return Ok(None);
        };
        let unit = UnitId::new(input.read_i32()?);
        let key = match shape {
            KeyShape::Project => Key::project(unit),
            KeyShape::Namespace => Key::namespace(unit, self.read_name(input)?),
            KeyShape::File => Key::file(unit, self.read_name(input)?),
            KeyShape::Container(kind) => Key::container(unit, kind),
            KeyShape::Offset(kind) => {
                let file = self.read_name(input)?;
                let name = self.read_name(input)?;
                let start = input.read_i32()?;
                let end = input.read_i32()?;
                Key::offset(unit, kind, file, name, start, end)
            }
        };
        if self.is_tracing_key(&key) {
            trace!(key = %key, "read key");
        }
        Ok(Some(self.intern(key)))
    }

    /// Reads a key that must be present.
    pub fn read_key(&self, input: &mut KeyInput<'_>) -> Result<SharedKey> {
        let offset = input.position();
        self.read_opt_key(input)?.ok_or_else(|| {
            KeyRepoError::Corrupted(format!("unexpected null key at offset {offset}"))
        })
    }

    /// Reads a count followed by that many keys.
    pub fn read_keys(&self, input: &mut KeyInput<'_>) -> Result<Vec<SharedKey>> {
        let count = input.read_count()?;
        // each key takes at least six bytes
        let mut keys = Vec::with_capacity(count.min(input.remaining() / 6));
        for _ in 0..count {
            keys.push(self.read_key(input)?);
        }
        Ok(keys)
    }

    // ---- keyed collections ----

    /// Writes a count followed by `name | key` entries.
    pub fn write_name_key_map(
        &self,
        map: &BTreeMap<Arc<str>, SharedKey>,
        out: &mut KeyOutput,
    ) -> Result<()> {
        out.write_count(map.len())?;
        for (name, key) in map {
            out.write_str(name)?;
            self.write_key(key, out)?;
        }
        Ok(())
    }

    /// Reads a map written by [`write_name_key_map`](Self::write_name_key_map).
    pub fn read_name_key_map(&self, input: &mut KeyInput<'_>) -> Result<BTreeMap<Arc<str>, SharedKey>> {
        let count = input.read_count()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let name = self.read_name(input)?;
            let key = self.read_key(input)?;
            map.insert(name, key);
        }
        Ok(map)
    }

    /// Writes a count followed by `name | count | key*` entries.
    pub fn write_name_key_set_map(
        &self,
        map: &BTreeMap<Arc<str>, HashSet<SharedKey>>,
        out: &mut KeyOutput,
    ) -> Result<()> {
        out.write_count(map.len())?;
        for (name, keys) in map {
            out.write_str(name)?;
            self.write_keys(keys.iter().map(|k| &**k), out)?;
        }
        Ok(())
    }

    /// Reads a map written by
    /// [`write_name_key_set_map`](Self::write_name_key_set_map).
    pub fn read_name_key_set_map(
        &self,
        input: &mut KeyInput<'_>,
    ) -> Result<BTreeMap<Arc<str>, HashSet<SharedKey>>> {
        let count = input.read_count()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let name = self.read_name(input)?;
            let keys = self.read_keys(input)?.into_iter().collect();
            map.insert(name, keys);
        }
        Ok(map)
    }

    /// Writes a count followed by `start | name | key` entries.
    pub fn write_offset_sorted_map(
        &self,
        map: &BTreeMap<OffsetSortedKey, SharedKey>,
        out: &mut KeyOutput,
    ) -> Result<()> {
        out.write_count(map.len())?;
        for (sort_key, key) in map {
            out.write_i32(sort_key.start);
            out.write_str(&sort_key.name)?;
            self.write_key(key, out)?;
        }
        Ok(())
    }

    /// Reads a map written by
    /// [`write_offset_sorted_map`](Self::write_offset_sorted_map).
    pub fn read_offset_sorted_map(
        &self,
        input: &mut KeyInput<'_>,
    ) -> Result<BTreeMap<OffsetSortedKey, SharedKey>> {
        let count = input.read_count()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let start = input.read_i32()?;
            let name = self.read_name(input)?;
            let key = self.read_key(input)?;
            map.insert(OffsetSortedKey { start, name }, key);
        }
        Ok(map)
    }

    /// Encodes one key into a fresh buffer.
    pub fn encode_key(&self, key: &Key) -> Result<Vec<u8>> {
        let mut out = KeyOutput::with_capacity(64);
        self.write_key(key, &mut out)?;
        Ok(out.into_bytes())
    }

    /// Encodes only the identity of `key`: the end offset is written as
    /// [`NON_INITIALIZED`], so equal keys always encode to the same bytes.
    pub fn encode_identity(&self, key: &Key) -> Result<Vec<u8>> {
        let mut out = KeyOutput::with_capacity(64);
        self.write_record(key, true, &mut out)?;
        Ok(out.into_bytes())
    }

    /// Decodes a buffer holding exactly one key.
    pub fn decode_key(&self, bytes: &[u8]) -> Result<SharedKey> {
        let mut input = KeyInput::new(bytes);
        let key = self.read_key(&mut input)?;
        input.expect_end()?;
        Ok(key)
    }

    fn read_name(&self, input: &mut KeyInput<'_>) -> Result<Arc<str>> {
        let s = input.read_string()?;
        Ok(self.names.intern(&s))
    }

    // ---- auxiliary values ----

    /// Writes an optional auxiliary value with its tag.
    pub fn write_value(&self, value: Option<&AuxValue>, out: &mut KeyOutput) -> Result<()> {
        let Some(value) = value else {
            out.write_u8(ValueTag::Null as u8);
            return Ok(());
        };
        out.write_u8(value.tag() as u8);
        match value {
            AuxValue::Param(p) => self.write_param(p, out),
            AuxValue::ParamList(list) => {
                out.write_count(list.params.len())?;
                for p in &list.params {
                    self.write_param(p, out)?;
                }
                out.write_bool(list.varargs);
                Ok(())
            }
            AuxValue::TypeRef(ty) => self.write_type(ty, out),
            AuxValue::Expression(e) => write_expression(e, out),
            AuxValue::Visibility(v) => {
                out.write_u8(*v as u8);
                Ok(())
            }
            AuxValue::CompoundBody(body) => {
                out.write_i32(body.start);
                out.write_i32(body.end);
                self.write_keys(body.declarations.iter().map(|k| &**k), out)
            }
            AuxValue::TemplateDescriptor(t) => {
                self.write_keys(t.parameters.iter().map(|k| &**k), out)?;
                out.write_str(&t.suffix)?;
                out.write_bool(t.specialization);
                Ok(())
            }
            AuxValue::SpecializationDescriptor(s) => {
                self.write_opt_key(s.primary.as_deref(), out)?;
                out.write_count(s.arguments.len())?;
                for ty in &s.arguments {
                    self.write_type(ty, out)?;
                }
                Ok(())
            }
        }
    }

    /// Reads an optional auxiliary value.
    ///
    /// # Panics
    ///
    /// Panics on an unknown value tag.
    pub fn read_value(&self, input: &mut KeyInput<'_>) -> Result<Option<AuxValue>> {
        let offset = input.position();
        let raw = input.read_u8()?;
        let tag = ValueTag::from_u8(raw)
            .unwrap_or_else(|| panic!("unknown value tag {raw} at offset {offset}"));
        let value = match tag {
            ValueTag::Null => return Ok(None),
            ValueTag::Param => AuxValue::Param(self.read_param(input)?),
            ValueTag::ParamList => {
                let count = input.read_count()?;
                let mut params = Vec::with_capacity(count.min(input.remaining()));
                for _ in 0..count {
                    params.push(self.read_param(input)?);
                }
                let varargs = input.read_bool()?;
                AuxValue::ParamList(ParamList { params, varargs })
            }
            ValueTag::TypeRef => AuxValue::TypeRef(self.read_type(input)?),
            ValueTag::Expression => AuxValue::Expression(read_expression(input)?),
            ValueTag::Visibility => AuxValue::Visibility(read_visibility(input)?),
            ValueTag::CompoundBody => AuxValue::CompoundBody(CompoundBody {
                start: input.read_i32()?,
                end: input.read_i32()?,
                declarations: self.read_keys(input)?,
            }),
            ValueTag::TemplateDescriptor => AuxValue::TemplateDescriptor(TemplateDescriptor {
                parameters: self.read_keys(input)?,
                suffix: input.read_string()?,
                specialization: input.read_bool()?,
            }),
            ValueTag::SpecializationDescriptor => {
                let primary = self.read_opt_key(input)?;
                let count = input.read_count()?;
                let mut arguments = Vec::with_capacity(count.min(input.remaining()));
                for _ in 0..count {
                    arguments.push(self.read_type(input)?);
                }
                AuxValue::SpecializationDescriptor(SpecializationDescriptor { primary, arguments })
            }
        };
        Ok(Some(value))
    }

    fn write_type(&self, ty: &TypeRef, out: &mut KeyOutput) -> Result<()> {
        out.write_str(&ty.text)?;
        self.write_opt_key(ty.classifier.as_deref(), out)?;
        out.write_u8(ty.pointer_depth);
        out.write_bool(ty.reference);
        out.write_bool(ty.is_const);
        Ok(())
    }

    fn read_type(&self, input: &mut KeyInput<'_>) -> Result<TypeRef> {
        Ok(TypeRef {
            text: input.read_string()?,
            classifier: self.read_opt_key(input)?,
            pointer_depth: input.read_u8()?,
            reference: input.read_bool()?,
            is_const: input.read_bool()?,
        })
    }

    fn write_param(&self, p: &Param, out: &mut KeyOutput) -> Result<()> {
        out.write_opt_str(p.name.as_deref())?;
        out.write_bool(p.ty.is_some());
        if let Some(ty) = &p.ty {
            self.write_type(ty, out)?;
        }
        out.write_bool(p.default.is_some());
        if let Some(e) = &p.default {
            write_expression(e, out)?;
        }
        Ok(())
    }

    fn read_param(&self, input: &mut KeyInput<'_>) -> Result<Param> {
        let name = input.read_opt_string()?;
        let ty = if input.read_bool()? {
            Some(self.read_type(input)?)
        } else {
            None
        };
        let default = if input.read_bool()? {
            Some(read_expression(input)?)
        } else {
            None
        };
        Ok(Param { name, ty, default })
    }
}

fn write_expression(e: &Expression, out: &mut KeyOutput) -> Result<()> {
    out.write_str(&e.text)?;
    out.write_i32(e.start);
    out.write_i32(e.end);
    Ok(())
}

fn read_expression(input: &mut KeyInput<'_>) -> Result<Expression> {
    Ok(Expression {
        text: input.read_string()?,
        start: input.read_i32()?,
        end: input.read_i32()?,
    })
}

fn read_visibility(input: &mut KeyInput<'_>) -> Result<Visibility> {
    let offset = input.position();
    let raw = input.read_u8()?;
    Visibility::from_u8(raw)
        .ok_or_else(|| KeyRepoError::Corrupted(format!("invalid visibility {raw} at offset {offset}")))
}
