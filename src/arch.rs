//! Architecture descriptors
//!
//! The analyzer does not know anything about a concrete instruction set. All it needs is the set
//! of architectural registers, their widths and the way sub-registers overlap their base
//! registers (e.g. `ax` living in the low 16 bits of `eax`). [`ArchInfo`] bundles exactly that.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArchError {
    #[error("alias {alias} refers to unknown base register {base}")]
    UnknownBase { alias: String, base: String },

    #[error("alias {alias} does not fit into {base} (bits {offset}..{end})")]
    AliasOutOfRange {
        alias: String,
        base: String,
        offset: u32,
        end: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchPreset {
    X86,
    X86_64,
}

/// Read-only description of the registers of an architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchInfo {
    address_size: u32,
    registers_all: BTreeSet<String>,
    registers_size: BTreeMap<String, u32>,
    alias_mapper: BTreeMap<String, (String, u32)>,
    flags_all: BTreeSet<String>,
}

impl ArchInfo {
    pub fn builder(address_size: u32) -> ArchInfoBuilder {
        ArchInfoBuilder {
            info: ArchInfo {
                address_size,
                registers_all: BTreeSet::new(),
                registers_size: BTreeMap::new(),
                alias_mapper: BTreeMap::new(),
                flags_all: BTreeSet::new(),
            },
        }
    }

    pub fn preset(preset: ArchPreset) -> Self {
        match preset {
            ArchPreset::X86 => Self::x86(),
            ArchPreset::X86_64 => Self::x86_64(),
        }
    }

    /// 32-bit x86 with the usual 16 and 8 bit views of the general purpose registers.
    pub fn x86() -> Self {
        let mut builder = Self::builder(32);

        for base in &["eax", "ebx", "ecx", "edx"] {
            let letter = &base[1..2];

            builder = builder
                .register(base, 32)
                .alias(&format!("{}x", letter), base, 0, 16)
                .alias(&format!("{}l", letter), base, 0, 8)
                .alias(&format!("{}h", letter), base, 8, 8);
        }

        for base in &["esi", "edi", "esp", "ebp"] {
            builder = builder.register(base, 32).alias(&base[1..], base, 0, 16);
        }

        builder
            .register("eip", 32)
            .flags(&["cf", "pf", "af", "zf", "sf", "df", "of"])
            .build()
            .expect("x86 register layout is consistent")
    }

    /// 64-bit x86 including the 32 bit views of every general purpose register.
    pub fn x86_64() -> Self {
        let mut builder = Self::builder(64);

        for letter in &["a", "b", "c", "d"] {
            let base = format!("r{}x", letter);

            builder = builder
                .register(&base, 64)
                .alias(&format!("e{}x", letter), &base, 0, 32)
                .alias(&format!("{}x", letter), &base, 0, 16)
                .alias(&format!("{}l", letter), &base, 0, 8)
                .alias(&format!("{}h", letter), &base, 8, 8);
        }

        for suffix in &["si", "di", "sp", "bp"] {
            let base = format!("r{}", suffix);

            builder = builder
                .register(&base, 64)
                .alias(&format!("e{}", suffix), &base, 0, 32)
                .alias(suffix, &base, 0, 16);
        }

        for index in 8..16 {
            let base = format!("r{}", index);

            builder = builder
                .register(&base, 64)
                .alias(&format!("r{}d", index), &base, 0, 32)
                .alias(&format!("r{}w", index), &base, 0, 16)
                .alias(&format!("r{}b", index), &base, 0, 8);
        }

        builder
            .register("rip", 64)
            .flags(&["cf", "pf", "af", "zf", "sf", "df", "of"])
            .build()
            .expect("x86-64 register layout is consistent")
    }

    pub fn address_size(&self) -> u32 {
        self.address_size
    }

    pub fn registers_all(&self) -> &BTreeSet<String> {
        &self.registers_all
    }

    pub fn registers_size(&self) -> &BTreeMap<String, u32> {
        &self.registers_size
    }

    pub fn alias_mapper(&self) -> &BTreeMap<String, (String, u32)> {
        &self.alias_mapper
    }

    pub fn flags_all(&self) -> &BTreeSet<String> {
        &self.flags_all
    }

    pub fn is_architectural(&self, name: &str) -> bool {
        self.registers_all.contains(name)
    }

    pub fn is_flag(&self, name: &str) -> bool {
        self.flags_all.contains(name)
    }

    pub fn register_size(&self, name: &str) -> Option<u32> {
        self.registers_size.get(name).copied()
    }

    /// Base register and bit offset of a sub-register.
    pub fn alias(&self, name: &str) -> Option<(&str, u32)> {
        self.alias_mapper
            .get(name)
            .map(|(base, offset)| (base.as_str(), *offset))
    }
}

pub struct ArchInfoBuilder {
    info: ArchInfo,
}

impl ArchInfoBuilder {
    pub fn register(mut self, name: &str, width: u32) -> Self {
        self.info.registers_all.insert(name.to_owned());
        self.info.registers_size.insert(name.to_owned(), width);
        self
    }

    pub fn alias(mut self, name: &str, base: &str, offset: u32, width: u32) -> Self {
        self.info.registers_all.insert(name.to_owned());
        self.info.registers_size.insert(name.to_owned(), width);
        self.info
            .alias_mapper
            .insert(name.to_owned(), (base.to_owned(), offset));
        self
    }

    /// Flags are architectural registers with a width of one bit.
    pub fn flags(mut self, names: &[&str]) -> Self {
        for name in names {
            self.info.flags_all.insert((*name).to_owned());
            self = self.register(name, 1);
        }
        self
    }

    pub fn build(self) -> Result<ArchInfo, ArchError> {
        for (alias, (base, offset)) in self.info.alias_mapper.iter() {
            let base_size = self
                .info
                .registers_size
                .get(base)
                .ok_or_else(|| ArchError::UnknownBase {
                    alias: alias.clone(),
                    base: base.clone(),
                })?;

            let end = offset + self.info.registers_size[alias];

            if end > *base_size {
                return Err(ArchError::AliasOutOfRange {
                    alias: alias.clone(),
                    base: base.clone(),
                    offset: *offset,
                    end,
                });
            }
        }

        Ok(self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_aliases_resolve_to_base_registers() {
        let arch = ArchInfo::x86();

        assert_eq!(arch.alias("al"), Some(("eax", 0)));
        assert_eq!(arch.alias("ah"), Some(("eax", 8)));
        assert_eq!(arch.alias("si"), Some(("esi", 0)));
        assert_eq!(arch.alias("eax"), None);
        assert_eq!(arch.register_size("ah"), Some(8));
        assert_eq!(arch.address_size(), 32);
    }

    #[test]
    fn every_alias_has_a_sized_base() {
        for arch in &[ArchInfo::x86(), ArchInfo::x86_64()] {
            for (base, _) in arch.alias_mapper().values() {
                assert!(arch.registers_size().contains_key(base), "{}", base);
            }
        }
    }

    #[test]
    fn flags_are_architectural() {
        let arch = ArchInfo::x86_64();

        assert!(arch.is_flag("zf"));
        assert!(arch.is_architectural("zf"));
        assert_eq!(arch.register_size("zf"), Some(1));
        assert!(!arch.is_flag("rax"));
    }

    #[test]
    fn alias_to_unknown_base_is_rejected() {
        let result = ArchInfo::builder(32).alias("ax", "eax", 0, 16).build();

        assert_eq!(
            result,
            Err(ArchError::UnknownBase {
                alias: String::from("ax"),
                base: String::from("eax")
            })
        );
    }

    #[test]
    fn alias_past_the_base_is_rejected() {
        let result = ArchInfo::builder(32)
            .register("eax", 32)
            .alias("bad", "eax", 24, 16)
            .build();

        assert!(matches!(result, Err(ArchError::AliasOutOfRange { end: 40, .. })));
    }
}
