//! Parser and decoder for JVM class files.
//!
//! The wire format is a big-endian, length-prefixed tree rooted at the
//! constant pool; everything else in the file points back into the pool by
//! one-based index. Decoding is purely structural: cross-references are
//! stored as indices and resolved lazily against the finished pool.
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;

/// Magic bytes of a JVM class file.
pub const CLASS_FILE_MAGIC: u32 = 0xCAFE_BABE;

/// Failures raised while decoding class file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassError {
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("class format error: {0}")]
    ClassFormat(String),
    #[error("malformed modified UTF-8 around byte {0}")]
    MalformedString(usize),
    #[error("truncated class file")]
    Truncated,
}

/// Big-endian, position-advancing view over the class file bytes.
///
/// Every successful read advances the position by the read width; reading
/// past the end of input fails with [`ClassError::Truncated`].
pub struct ClassReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Current offset from the start of the input.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn read_u8(&mut self) -> Result<u8, ClassError> {
        self.cursor.read_u8().map_err(|_| ClassError::Truncated)
    }

    pub fn read_u16(&mut self) -> Result<u16, ClassError> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| ClassError::Truncated)
    }

    pub fn read_u32(&mut self) -> Result<u32, ClassError> {
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| ClassError::Truncated)
    }

    pub fn read_u64(&mut self) -> Result<u64, ClassError> {
        self.cursor
            .read_u64::<BigEndian>()
            .map_err(|_| ClassError::Truncated)
    }

    /// Reads a u16 count followed by that many u16 values.
    pub fn read_u16_table(&mut self) -> Result<Vec<u16>, ClassError> {
        let count = self.read_u16()?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.read_u16()?);
        }
        Ok(values)
    }

    /// Reads exactly `size` bytes.
    pub fn read_bytes(&mut self, size: usize) -> Result<Vec<u8>, ClassError> {
        let mut buf = vec![0u8; size];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| ClassError::Truncated)?;
        Ok(buf)
    }
}

/// Decodes the modified UTF-8 used by class files.
///
/// Code units are 1 to 3 bytes wide; the resulting u16 sequence is
/// interpreted as UTF-16, joining surrogate pairs. The NUL character is
/// encoded as `0xC0 0x80` and supplementary characters as two 3-byte
/// surrogate encodings, so a plain UTF-8 decoder will not do.
pub fn decode_mutf8(bytes: &[u8]) -> Result<String, ClassError> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b1 = u16::from(bytes[i]);
        match b1 >> 4 {
            // 0xxxxxxx
            0x0..=0x7 => {
                units.push(b1);
                i += 1;
            }
            // 110xxxxx 10xxxxxx
            0xC | 0xD => {
                if i + 2 > bytes.len() {
                    return Err(ClassError::MalformedString(i));
                }
                let b2 = u16::from(bytes[i + 1]);
                if b2 & 0xC0 != 0x80 {
                    return Err(ClassError::MalformedString(i + 1));
                }
                units.push((b1 & 0x1F) << 6 | (b2 & 0x3F));
                i += 2;
            }
            // 1110xxxx 10xxxxxx 10xxxxxx
            0xE => {
                if i + 3 > bytes.len() {
                    return Err(ClassError::MalformedString(i));
                }
                let b2 = u16::from(bytes[i + 1]);
                let b3 = u16::from(bytes[i + 2]);
                if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                    return Err(ClassError::MalformedString(i + 1));
                }
                units.push((b1 & 0x0F) << 12 | (b2 & 0x3F) << 6 | (b3 & 0x3F));
                i += 3;
            }
            // 10xxxxxx or 1111xxxx cannot lead a code unit.
            _ => return Err(ClassError::MalformedString(i)),
        }
    }
    Ok(char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

// Constant pool tag values.
const CONSTANT_UTF8: u8 = 1;
const CONSTANT_INTEGER: u8 = 3;
const CONSTANT_FLOAT: u8 = 4;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_DOUBLE: u8 = 6;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_STRING: u8 = 8;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACE_METHODREF: u8 = 11;
const CONSTANT_NAME_AND_TYPE: u8 = 12;
const CONSTANT_METHOD_HANDLE: u8 = 15;
const CONSTANT_METHOD_TYPE: u8 = 16;
const CONSTANT_INVOKE_DYNAMIC: u8 = 18;

/// One constant pool entry. Reference entries store indices only; resolving
/// them goes through [`ConstantPool`] once the whole pool is decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    /// Placeholder for index 0 and for the slot after a Long or Double.
    Reserved,
}

/// One-based table of constants. Index 0 is reserved and a Long or Double
/// at index `n` makes index `n + 1` permanently unusable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(reader: &mut ClassReader) -> Result<Self, ClassError> {
        let count = reader.read_u16()? as usize;
        let mut entries = vec![Constant::Reserved; count];
        let mut i = 1;
        while i < count {
            let tag = reader.read_u8()?;
            let entry = Self::read_entry(reader, tag)?;
            let wide = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries[i] = entry;
            // 8-byte constants take up two entries in the table.
            i += if wide { 2 } else { 1 };
        }
        Ok(Self { entries })
    }

    fn read_entry(reader: &mut ClassReader, tag: u8) -> Result<Constant, ClassError> {
        let entry = match tag {
            CONSTANT_UTF8 => {
                let size = reader.read_u16()?;
                let bytes = reader.read_bytes(size as usize)?;
                Constant::Utf8(decode_mutf8(&bytes)?)
            }
            CONSTANT_INTEGER => Constant::Integer(reader.read_u32()? as i32),
            CONSTANT_FLOAT => Constant::Float(f32::from_bits(reader.read_u32()?)),
            CONSTANT_LONG => Constant::Long(reader.read_u64()? as i64),
            CONSTANT_DOUBLE => Constant::Double(f64::from_bits(reader.read_u64()?)),
            CONSTANT_CLASS => Constant::Class {
                name_index: reader.read_u16()?,
            },
            CONSTANT_STRING => Constant::String {
                string_index: reader.read_u16()?,
            },
            CONSTANT_FIELDREF => Constant::FieldRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            CONSTANT_METHODREF => Constant::MethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            CONSTANT_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            CONSTANT_NAME_AND_TYPE => Constant::NameAndType {
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
            },
            CONSTANT_METHOD_HANDLE => Constant::MethodHandle {
                reference_kind: reader.read_u8()?,
                reference_index: reader.read_u16()?,
            },
            CONSTANT_METHOD_TYPE => Constant::MethodType {
                descriptor_index: reader.read_u16()?,
            },
            CONSTANT_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap_method_attr_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            },
            _ => {
                return Err(ClassError::ClassFormat(format!(
                    "unknown constant pool tag {tag}"
                )))
            }
        };
        Ok(entry)
    }

    /// Number of slots in the table, including index 0 and reserved slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the pool holds no usable entries.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Looks up a usable entry. Index 0, out-of-range indices and the slot
    /// after a Long or Double are class format errors.
    pub fn get(&self, index: u16) -> Result<&Constant, ClassError> {
        match self.entries.get(index as usize) {
            Some(Constant::Reserved) | None => Err(ClassError::ClassFormat(format!(
                "constant pool index {index} is unusable"
            ))),
            Some(entry) => Ok(entry),
        }
    }

    /// Resolves a Utf8 entry to its text.
    pub fn utf8(&self, index: u16) -> Result<&str, ClassError> {
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text),
            other => Err(ClassError::ClassFormat(format!(
                "expected Utf8 at constant {index}, found {other:?}"
            ))),
        }
    }

    /// Resolves a Class entry to its fully qualified name.
    pub fn class_name(&self, index: u16) -> Result<&str, ClassError> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(ClassError::ClassFormat(format!(
                "expected Class at constant {index}, found {other:?}"
            ))),
        }
    }

    /// Resolves a NameAndType entry to its (name, descriptor) pair.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassError> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(ClassError::ClassFormat(format!(
                "expected NameAndType at constant {index}, found {other:?}"
            ))),
        }
    }
}

/// One row of a Code attribute's exception table. A `catch_type` of zero
/// catches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// A decoded attribute, selected by the Utf8 name the wire format points at.
/// Names outside the recognized set land in [`Attribute::Unparsed`] with
/// their raw body; they are never a parse failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Code {
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
        exception_table: Vec<ExceptionTableEntry>,
        attributes: Vec<Attribute>,
    },
    ConstantValue {
        constant_value_index: u16,
    },
    Deprecated,
    Exceptions {
        index_table: Vec<u16>,
    },
    LineNumberTable {
        entries: Vec<LineNumberEntry>,
    },
    LocalVariableTable {
        entries: Vec<LocalVariableEntry>,
    },
    SourceFile {
        sourcefile_index: u16,
    },
    Synthetic,
    Unparsed {
        name: String,
        data: Vec<u8>,
    },
}

fn read_attributes(
    reader: &mut ClassReader,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, ClassError> {
    let count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attributes.push(read_attribute(reader, pool)?);
    }
    Ok(attributes)
}

fn read_attribute(reader: &mut ClassReader, pool: &ConstantPool) -> Result<Attribute, ClassError> {
    let name_index = reader.read_u16()?;
    let length = reader.read_u32()?;
    let name = pool.utf8(name_index)?;
    let start = reader.position();
    let attribute = match name {
        "Code" => {
            let max_stack = reader.read_u16()?;
            let max_locals = reader.read_u16()?;
            let code_length = reader.read_u32()?;
            let code = reader.read_bytes(code_length as usize)?;
            let table_length = reader.read_u16()?;
            let mut exception_table = Vec::with_capacity(table_length as usize);
            for _ in 0..table_length {
                exception_table.push(ExceptionTableEntry {
                    start_pc: reader.read_u16()?,
                    end_pc: reader.read_u16()?,
                    handler_pc: reader.read_u16()?,
                    catch_type: reader.read_u16()?,
                });
            }
            let attributes = read_attributes(reader, pool)?;
            Attribute::Code {
                max_stack,
                max_locals,
                code,
                exception_table,
                attributes,
            }
        }
        "ConstantValue" => Attribute::ConstantValue {
            constant_value_index: reader.read_u16()?,
        },
        "Deprecated" => Attribute::Deprecated,
        "Exceptions" => Attribute::Exceptions {
            index_table: reader.read_u16_table()?,
        },
        "LineNumberTable" => {
            let count = reader.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LineNumberEntry {
                    start_pc: reader.read_u16()?,
                    line_number: reader.read_u16()?,
                });
            }
            Attribute::LineNumberTable { entries }
        }
        "LocalVariableTable" => {
            let count = reader.read_u16()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LocalVariableEntry {
                    start_pc: reader.read_u16()?,
                    length: reader.read_u16()?,
                    name_index: reader.read_u16()?,
                    descriptor_index: reader.read_u16()?,
                    index: reader.read_u16()?,
                });
            }
            Attribute::LocalVariableTable { entries }
        }
        "SourceFile" => Attribute::SourceFile {
            sourcefile_index: reader.read_u16()?,
        },
        "Synthetic" => Attribute::Synthetic,
        _ => Attribute::Unparsed {
            name: name.to_string(),
            data: reader.read_bytes(length as usize)?,
        },
    };
    // Every shape must consume exactly the body its length field declared.
    let consumed = reader.position() - start;
    if consumed != u64::from(length) {
        return Err(ClassError::ClassFormat(format!(
            "attribute {name} declared {length} bytes but decoded {consumed}"
        )));
    }
    Ok(attribute)
}

/// A field or method. The wire shape is identical for both; the containing
/// table decides which one a member is.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Member {
    fn read(reader: &mut ClassReader, pool: &ConstantPool) -> Result<Self, ClassError> {
        Ok(Self {
            access_flags: reader.read_u16()?,
            name_index: reader.read_u16()?,
            descriptor_index: reader.read_u16()?,
            attributes: read_attributes(reader, pool)?,
        })
    }

    fn read_all(reader: &mut ClassReader, pool: &ConstantPool) -> Result<Vec<Self>, ClassError> {
        let count = reader.read_u16()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            members.push(Self::read(reader, pool)?);
        }
        Ok(members)
    }

    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ClassError> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ClassError> {
        pool.utf8(self.descriptor_index)
    }

    /// The member's Code attribute, if it has one.
    pub fn code_attribute(&self) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|attribute| matches!(attribute, Attribute::Code { .. }))
    }
}

/// A decoded class file. Produced once per byte blob and immutable after.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Fully qualified name of this class.
    pub fn class_name(&self) -> Result<&str, ClassError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Fully qualified name of the superclass; `None` for java/lang/Object.
    pub fn super_class_name(&self) -> Result<Option<&str>, ClassError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ClassError> {
        self.interfaces
            .iter()
            .map(|&index| self.constant_pool.class_name(index))
            .collect()
    }

    /// Finds the first method with the given name.
    pub fn find_method(&self, name: &str) -> Option<&Member> {
        self.methods
            .iter()
            .find(|method| method.name(&self.constant_pool) == Ok(name))
    }
}

fn check_version(major: u16, minor: u16) -> Result<(), ClassError> {
    match major {
        45 => Ok(()),
        46..=52 if minor == 0 => Ok(()),
        _ => Err(ClassError::UnsupportedVersion { major, minor }),
    }
}

/// Decodes a class file from raw bytes.
///
/// This is the parse boundary: any format violation inside the tree comes
/// back as a single [`ClassError`] instead of surfacing mid-traversal.
pub fn parse_class_bytes(bytes: &[u8]) -> Result<ClassFile, ClassError> {
    let mut reader = ClassReader::new(bytes);
    let magic = reader.read_u32()?;
    if magic != CLASS_FILE_MAGIC {
        return Err(ClassError::BadMagic(magic));
    }
    let minor_version = reader.read_u16()?;
    let major_version = reader.read_u16()?;
    debug!(major_version, minor_version, "class file version");
    check_version(major_version, minor_version)?;
    let constant_pool = ConstantPool::read(&mut reader)?;
    let access_flags = reader.read_u16()?;
    let this_class = reader.read_u16()?;
    let super_class = reader.read_u16()?;
    let interfaces = reader.read_u16_table()?;
    let fields = Member::read_all(&mut reader, &constant_pool)?;
    let methods = Member::read_all(&mut reader, &constant_pool)?;
    let attributes = read_attributes(&mut reader, &constant_pool)?;
    Ok(ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Appends the fixed tail of a class file: access flags, this/super,
    // and empty interface, field, method and attribute tables.
    fn append_empty_body(bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&[0x00, 0x21]); // access_flags
        bytes.extend_from_slice(&[0x00, 0x00]); // this_class
        bytes.extend_from_slice(&[0x00, 0x00]); // super_class
        bytes.extend_from_slice(&[0x00, 0x00]); // interfaces
        bytes.extend_from_slice(&[0x00, 0x00]); // fields
        bytes.extend_from_slice(&[0x00, 0x00]); // methods
        bytes.extend_from_slice(&[0x00, 0x00]); // attributes
    }

    fn utf8_entry(text: &str) -> Vec<u8> {
        let mut bytes = vec![CONSTANT_UTF8];
        bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
        bytes.extend_from_slice(text.as_bytes());
        bytes
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0x00, 0x00, 0x00, 0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(parse_class_bytes(&bytes), Err(ClassError::BadMagic(0)));
    }

    #[test]
    fn accepts_minimal_class() {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34, 0x00, 0x01];
        append_empty_body(&mut bytes);
        let class = parse_class_bytes(&bytes).unwrap();
        assert_eq!(class.minor_version, 0);
        assert_eq!(class.major_version, 52);
        assert!(class.constant_pool.is_empty());
        assert!(class.methods.is_empty());
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00];
        assert_eq!(parse_class_bytes(&bytes), Err(ClassError::Truncated));
    }

    #[test]
    fn version_policy() {
        // Major 45 is accepted with any minor version.
        assert!(check_version(45, 3).is_ok());
        assert!(check_version(45, 0).is_ok());
        for major in 46..=52 {
            assert!(check_version(major, 0).is_ok());
            assert_eq!(
                check_version(major, 1),
                Err(ClassError::UnsupportedVersion { major, minor: 1 })
            );
        }
        assert_eq!(
            check_version(53, 0),
            Err(ClassError::UnsupportedVersion {
                major: 53,
                minor: 0
            })
        );
    }

    #[test]
    fn mutf8_ascii_and_empty() {
        assert_eq!(decode_mutf8(b"").unwrap(), "");
        assert_eq!(decode_mutf8(b"main").unwrap(), "main");
        assert_eq!(decode_mutf8(b"(I)V").unwrap(), "(I)V");
    }

    #[test]
    fn mutf8_encoded_nul() {
        assert_eq!(decode_mutf8(&[0xC0, 0x80]).unwrap(), "\u{0}");
    }

    #[test]
    fn mutf8_two_and_three_byte_units() {
        // U+00E9 and U+4E2D.
        assert_eq!(decode_mutf8(&[0xC3, 0xA9]).unwrap(), "é");
        assert_eq!(decode_mutf8(&[0xE4, 0xB8, 0xAD]).unwrap(), "中");
    }

    #[test]
    fn mutf8_surrogate_pair() {
        // U+1D11E as two 3-byte surrogate encodings.
        let bytes = [0xED, 0xA0, 0xB4, 0xED, 0xB4, 0x9E];
        assert_eq!(decode_mutf8(&bytes).unwrap(), "\u{1D11E}");
    }

    #[test]
    fn mutf8_rejects_bad_sequences() {
        // Continuation byte without its mask.
        assert_eq!(
            decode_mutf8(&[0xC2, 0x00]),
            Err(ClassError::MalformedString(1))
        );
        // Truncated three-byte sequence.
        assert_eq!(
            decode_mutf8(&[0xE4, 0xB8]),
            Err(ClassError::MalformedString(0))
        );
        // Lone continuation byte and a four-byte UTF-8 lead byte.
        assert_eq!(decode_mutf8(&[0x80]), Err(ClassError::MalformedString(0)));
        assert_eq!(
            decode_mutf8(&[0xF0, 0x9F, 0x92, 0xA9]),
            Err(ClassError::MalformedString(0))
        );
    }

    #[test]
    fn pool_long_occupies_two_slots() {
        let mut bytes = vec![0x00, 0x04]; // count 4: indices 1..=3
        bytes.extend_from_slice(&utf8_entry("x"));
        bytes.push(CONSTANT_LONG);
        bytes.extend_from_slice(&0x0123_4567_89AB_CDEFu64.to_be_bytes());
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::read(&mut reader).unwrap();
        assert_eq!(pool.get(1).unwrap(), &Constant::Utf8("x".to_string()));
        assert_eq!(pool.get(2).unwrap(), &Constant::Long(0x0123_4567_89AB_CDEF));
        // The slot after a Long exists but is unusable, as is index 0.
        assert!(pool.get(3).is_err());
        assert!(pool.get(0).is_err());
        assert!(pool.get(4).is_err());
    }

    #[test]
    fn pool_rejects_unknown_tag() {
        let bytes = [0x00, 0x02, 0x13];
        let mut reader = ClassReader::new(&bytes);
        assert!(matches!(
            ConstantPool::read(&mut reader),
            Err(ClassError::ClassFormat(_))
        ));
    }

    fn reference_pool() -> ConstantPool {
        let mut bytes = vec![0x00, 0x06]; // count 6: indices 1..=5
        bytes.extend_from_slice(&utf8_entry("java/lang/Object"));
        bytes.extend_from_slice(&[CONSTANT_CLASS, 0x00, 0x01]);
        bytes.extend_from_slice(&utf8_entry("main"));
        bytes.extend_from_slice(&utf8_entry("([Ljava/lang/String;)V"));
        bytes.extend_from_slice(&[CONSTANT_NAME_AND_TYPE, 0x00, 0x03, 0x00, 0x04]);
        let mut reader = ClassReader::new(&bytes);
        ConstantPool::read(&mut reader).unwrap()
    }

    #[test]
    fn pool_resolves_cross_references() {
        let pool = reference_pool();
        assert_eq!(pool.class_name(2).unwrap(), "java/lang/Object");
        assert_eq!(
            pool.name_and_type(5).unwrap(),
            ("main", "([Ljava/lang/String;)V")
        );
    }

    #[test]
    fn pool_rejects_tag_mismatch() {
        let pool = reference_pool();
        // Index 1 is Utf8, not Class.
        assert!(matches!(
            pool.class_name(1),
            Err(ClassError::ClassFormat(_))
        ));
        assert!(matches!(pool.utf8(2), Err(ClassError::ClassFormat(_))));
    }

    #[test]
    fn method_handle_keeps_its_own_shape() {
        let mut bytes = vec![0x00, 0x03];
        bytes.extend_from_slice(&[CONSTANT_METHOD_HANDLE, 0x06, 0x00, 0x02]);
        bytes.extend_from_slice(&[CONSTANT_METHOD_TYPE, 0x00, 0x01]);
        let mut reader = ClassReader::new(&bytes);
        let pool = ConstantPool::read(&mut reader).unwrap();
        assert_eq!(
            pool.get(1).unwrap(),
            &Constant::MethodHandle {
                reference_kind: 6,
                reference_index: 2
            }
        );
        assert_eq!(
            pool.get(2).unwrap(),
            &Constant::MethodType {
                descriptor_index: 1
            }
        );
    }

    fn attribute_name_pool(name: &str) -> ConstantPool {
        let mut bytes = vec![0x00, 0x02];
        bytes.extend_from_slice(&utf8_entry(name));
        let mut reader = ClassReader::new(&bytes);
        ConstantPool::read(&mut reader).unwrap()
    }

    #[test]
    fn unknown_attribute_consumes_declared_length() {
        let pool = attribute_name_pool("RuntimeVisibleAnnotations");
        let mut bytes = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0xAA, 0xBB, 0xCC];
        bytes.push(0x5A); // trailing sentinel the attribute must not touch
        let mut reader = ClassReader::new(&bytes);
        let attribute = read_attribute(&mut reader, &pool).unwrap();
        assert_eq!(
            attribute,
            Attribute::Unparsed {
                name: "RuntimeVisibleAnnotations".to_string(),
                data: vec![0xAA, 0xBB, 0xCC],
            }
        );
        assert_eq!(reader.read_u8().unwrap(), 0x5A);
    }

    #[test]
    fn attribute_length_mismatch_is_rejected() {
        let pool = attribute_name_pool("ConstantValue");
        // ConstantValue reads two bytes but four are declared.
        let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x00, 0x07, 0x00, 0x00];
        let mut reader = ClassReader::new(&bytes);
        assert!(matches!(
            read_attribute(&mut reader, &pool),
            Err(ClassError::ClassFormat(_))
        ));
    }

    #[test]
    fn code_attribute_decodes_nested_attributes() {
        let mut pool_bytes = vec![0x00, 0x03];
        pool_bytes.extend_from_slice(&utf8_entry("Code"));
        pool_bytes.extend_from_slice(&utf8_entry("LineNumberTable"));
        let mut reader = ClassReader::new(&pool_bytes);
        let pool = ConstantPool::read(&mut reader).unwrap();

        let mut body = Vec::new();
        body.extend_from_slice(&[0x00, 0x02]); // max_stack
        body.extend_from_slice(&[0x00, 0x01]); // max_locals
        body.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, 0x03, 0x3C, 0x00]); // code
        body.extend_from_slice(&[0x00, 0x01]); // one exception table row
        body.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, 0x00, 0x03, 0x00, 0x00]);
        // Nested LineNumberTable with one entry.
        body.extend_from_slice(&[0x00, 0x01]);
        body.extend_from_slice(&[0x00, 0x02, 0x00, 0x00, 0x00, 0x06]);
        body.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x04]);

        let mut bytes = vec![0x00, 0x01];
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);
        let mut reader = ClassReader::new(&bytes);
        let attribute = read_attribute(&mut reader, &pool).unwrap();
        match attribute {
            Attribute::Code {
                max_stack,
                max_locals,
                code,
                exception_table,
                attributes,
            } => {
                assert_eq!(max_stack, 2);
                assert_eq!(max_locals, 1);
                assert_eq!(code, vec![0x03, 0x3C, 0x00]);
                assert_eq!(
                    exception_table,
                    vec![ExceptionTableEntry {
                        start_pc: 0,
                        end_pc: 3,
                        handler_pc: 3,
                        catch_type: 0,
                    }]
                );
                assert_eq!(
                    attributes,
                    vec![Attribute::LineNumberTable {
                        entries: vec![LineNumberEntry {
                            start_pc: 0,
                            line_number: 4
                        }]
                    }]
                );
            }
            other => panic!("expected Code attribute, got {other:?}"),
        }
    }

    #[test]
    fn parses_class_with_method_and_code() {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        bytes.extend_from_slice(&[0x00, 0x06]); // pool count: indices 1..=5
        bytes.extend_from_slice(&utf8_entry("Adder"));
        bytes.extend_from_slice(&[CONSTANT_CLASS, 0x00, 0x01]);
        bytes.extend_from_slice(&utf8_entry("main"));
        bytes.extend_from_slice(&utf8_entry("([Ljava/lang/String;)V"));
        bytes.extend_from_slice(&utf8_entry("Code"));
        bytes.extend_from_slice(&[0x00, 0x21]); // access_flags
        bytes.extend_from_slice(&[0x00, 0x02]); // this_class
        bytes.extend_from_slice(&[0x00, 0x00]); // super_class
        bytes.extend_from_slice(&[0x00, 0x00]); // interfaces
        bytes.extend_from_slice(&[0x00, 0x00]); // fields
        bytes.extend_from_slice(&[0x00, 0x01]); // one method
        bytes.extend_from_slice(&[0x00, 0x09]); // method access_flags
        bytes.extend_from_slice(&[0x00, 0x03]); // name_index -> "main"
        bytes.extend_from_slice(&[0x00, 0x04]); // descriptor_index
        bytes.extend_from_slice(&[0x00, 0x01]); // one method attribute
        bytes.extend_from_slice(&[0x00, 0x05]); // "Code"
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x10]); // length 16
        bytes.extend_from_slice(&[0x00, 0x02]); // max_stack
        bytes.extend_from_slice(&[0x00, 0x01]); // max_locals
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x04, 0x04, 0x05, 0x60, 0x57]); // code
        bytes.extend_from_slice(&[0x00, 0x00]); // exception table
        bytes.extend_from_slice(&[0x00, 0x00]); // nested attributes
        bytes.extend_from_slice(&[0x00, 0x00]); // class attributes

        let class = parse_class_bytes(&bytes).unwrap();
        assert_eq!(class.class_name().unwrap(), "Adder");
        assert_eq!(class.super_class_name().unwrap(), None);
        let main = class.find_method("main").unwrap();
        assert_eq!(
            main.descriptor(&class.constant_pool).unwrap(),
            "([Ljava/lang/String;)V"
        );
        match main.code_attribute().unwrap() {
            Attribute::Code {
                max_stack,
                max_locals,
                code,
                ..
            } => {
                assert_eq!((*max_stack, *max_locals), (2, 1));
                assert_eq!(code, &[0x04, 0x05, 0x60, 0x57]);
            }
            other => panic!("expected Code attribute, got {other:?}"),
        }
    }
}
