//! Naming a class from its class file.
//!
//! The VM passes a null name to `ClassFileLoadHook` for some anonymous and
//! hidden classes, and the archive still needs a key for them. Only the
//! header up to `super_class` is read; of the constant pool, only `Utf8` and
//! `Class` entries are kept and everything else is skipped by size.

use thiserror::Error;

const MAGIC: u32 = 0xCAFE_BABE;

const TAG_UTF8: u8 = 1;
const TAG_CLASS: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    #[error("class file truncated")]
    UnexpectedEof,
    #[error("not a class file (magic {0:#010x})")]
    InvalidMagic(u32),
    #[error("constant pool index {0} is not usable here")]
    InvalidConstantPoolIndex(u16),
    #[error("unknown constant pool tag {0}")]
    InvalidConstantPoolTag(u8),
}

/// One constant pool slot, reduced to what naming a class needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpEntry {
    Utf8(String),
    Class { name_index: u16 },
    /// Any other constant, by tag.
    Other(u8),
    /// Index 0, and the second slot of a `Long` or `Double`.
    Unusable,
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    slots: Vec<CpEntry>,
}

impl ConstantPool {
    pub fn get(&self, index: u16) -> Result<&CpEntry, ClassFileError> {
        match self.slots.get(usize::from(index)) {
            Some(CpEntry::Unusable) | None => Err(ClassFileError::InvalidConstantPoolIndex(index)),
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            CpEntry::Utf8(s) => Ok(s),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    /// Resolves a `CONSTANT_Class` entry to its internal name.
    pub fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            CpEntry::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    /// Slot count as declared in the class file.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.len() <= 1
    }
}

#[derive(Debug, Clone)]
pub struct ClassHeader {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
}

impl ClassHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ClassFileError> {
        let mut input = Input(bytes);
        let magic = input.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }
        let minor_version = input.u16()?;
        let major_version = input.u16()?;
        let constant_pool = read_pool(&mut input)?;
        Ok(ClassHeader {
            minor_version,
            major_version,
            constant_pool,
            access_flags: input.u16()?,
            this_class: input.u16()?,
            super_class: input.u16()?,
        })
    }

    /// Internal name, `app/plugins/Plugin$Loader`.
    pub fn name(&self) -> Result<&str, ClassFileError> {
        self.constant_pool.class_name(self.this_class)
    }
}

/// Reads the internal class name out of class file bytes.
pub fn class_name(bytes: &[u8]) -> Result<String, ClassFileError> {
    ClassHeader::parse(bytes)?.name().map(str::to_owned)
}

struct Input<'a>(&'a [u8]);

impl<'a> Input<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ClassFileError> {
        if self.0.len() < n {
            return Err(ClassFileError::UnexpectedEof);
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFileError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFileError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Payload size of a fixed-size constant and how many slots it occupies.
fn fixed_size(tag: u8) -> Option<(usize, usize)> {
    match tag {
        // Integer, Float
        3 | 4 => Some((4, 1)),
        // Long, Double
        5 | 6 => Some((8, 2)),
        // String, MethodType, Module, Package
        8 | 16 | 19 | 20 => Some((2, 1)),
        // field/method refs, NameAndType, Dynamic, InvokeDynamic
        9..=12 | 17 | 18 => Some((4, 1)),
        // MethodHandle
        15 => Some((3, 1)),
        _ => None,
    }
}

fn read_pool(input: &mut Input<'_>) -> Result<ConstantPool, ClassFileError> {
    let count = usize::from(input.u16()?);
    let mut slots = Vec::with_capacity(count);
    slots.push(CpEntry::Unusable);

    while slots.len() < count {
        let tag = input.u8()?;
        match tag {
            TAG_UTF8 => {
                let len = usize::from(input.u16()?);
                let text = String::from_utf8_lossy(input.take(len)?).into_owned();
                slots.push(CpEntry::Utf8(text));
            }
            TAG_CLASS => slots.push(CpEntry::Class { name_index: input.u16()? }),
            _ => {
                let (size, width) = fixed_size(tag).ok_or(ClassFileError::InvalidConstantPoolTag(tag))?;
                input.take(size)?;
                slots.push(CpEntry::Other(tag));
                if width == 2 {
                    slots.push(CpEntry::Unusable);
                }
            }
        }
    }
    Ok(ConstantPool { slots })
}
