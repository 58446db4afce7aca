use std::collections::HashMap;

use crate::{push_u16, push_u32};

/// Interning constant-pool writer. Indices are assigned on first intern and
/// stay stable, so callers can embed them in member bytes before the pool is
/// serialised.
#[derive(Debug, Default)]
pub(crate) struct PoolWriter {
    entries: Vec<Vec<u8>>,
    // Long/Double entries occupy two slots; track the extra padding.
    slots: u16,
    interned: HashMap<PoolKey, u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Long(i64),
    Class(String),
    Str(String),
    NameAndType(String, String),
    MemberRef(String, String, String, bool),
    MethodHandle(u8, String, String, String, bool),
    MethodType(String),
    InvokeDynamic(u16, String, String),
}

impl PoolWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, key: PoolKey, encode: impl FnOnce(&mut Self) -> (Vec<u8>, u16)) -> u16 {
        if let Some(&index) = self.interned.get(&key) {
            return index;
        }
        let (bytes, width) = encode(self);
        let index = self.slots + 1;
        self.entries.push(bytes);
        self.slots += width;
        self.interned.insert(key, index);
        index
    }

    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        self.intern(PoolKey::Utf8(value.to_string()), |_| {
            let mut out = vec![1u8];
            // Test names stay in the ASCII/BMP subset where modified UTF-8 and
            // UTF-8 coincide.
            push_u16(&mut out, value.len() as u16);
            out.extend_from_slice(value.as_bytes());
            (out, 1)
        })
    }

    pub(crate) fn integer(&mut self, value: i32) -> u16 {
        self.intern(PoolKey::Integer(value), |_| {
            let mut out = vec![3u8];
            push_u32(&mut out, value as u32);
            (out, 1)
        })
    }

    pub(crate) fn long(&mut self, value: i64) -> u16 {
        self.intern(PoolKey::Long(value), |_| {
            let mut out = vec![5u8];
            out.extend_from_slice(&value.to_be_bytes());
            (out, 2)
        })
    }

    pub(crate) fn class(&mut self, name: &str) -> u16 {
        let internal = name.replace('.', "/");
        let name_index = self.utf8(&internal);
        self.intern(PoolKey::Class(internal), |_| {
            let mut out = vec![7u8];
            push_u16(&mut out, name_index);
            (out, 1)
        })
    }

    pub(crate) fn string(&mut self, value: &str) -> u16 {
        let value_index = self.utf8(value);
        self.intern(PoolKey::Str(value.to_string()), |_| {
            let mut out = vec![8u8];
            push_u16(&mut out, value_index);
            (out, 1)
        })
    }

    pub(crate) fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.intern(
            PoolKey::NameAndType(name.to_string(), descriptor.to_string()),
            |_| {
                let mut out = vec![12u8];
                push_u16(&mut out, name_index);
                push_u16(&mut out, descriptor_index);
                (out, 1)
            },
        )
    }

    pub(crate) fn member_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> u16 {
        let class_index = self.class(owner);
        let nat_index = self.name_and_type(name, descriptor);
        self.intern(
            PoolKey::MemberRef(
                owner.to_string(),
                name.to_string(),
                descriptor.to_string(),
                interface,
            ),
            |_| {
                let tag = if interface { 11u8 } else { 10u8 };
                let mut out = vec![tag];
                push_u16(&mut out, class_index);
                push_u16(&mut out, nat_index);
                (out, 1)
            },
        )
    }

    pub(crate) fn method_handle(
        &mut self,
        kind: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> u16 {
        let ref_index = self.member_ref(owner, name, descriptor, interface);
        self.intern(
            PoolKey::MethodHandle(
                kind,
                owner.to_string(),
                name.to_string(),
                descriptor.to_string(),
                interface,
            ),
            |_| {
                let mut out = vec![15u8, kind];
                push_u16(&mut out, ref_index);
                (out, 1)
            },
        )
    }

    pub(crate) fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor_index = self.utf8(descriptor);
        self.intern(PoolKey::MethodType(descriptor.to_string()), |_| {
            let mut out = vec![16u8];
            push_u16(&mut out, descriptor_index);
            (out, 1)
        })
    }

    pub(crate) fn invoke_dynamic(&mut self, bootstrap_slot: u16, name: &str, descriptor: &str) -> u16 {
        let nat_index = self.name_and_type(name, descriptor);
        self.intern(
            PoolKey::InvokeDynamic(bootstrap_slot, name.to_string(), descriptor.to_string()),
            |_| {
                let mut out = vec![18u8];
                push_u16(&mut out, bootstrap_slot);
                push_u16(&mut out, nat_index);
                (out, 1)
            },
        )
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        push_u16(out, self.slots + 1);
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}
