//! Opcode byte values and mnemonics for the implemented instruction subset.
use std::fmt;

macro_rules! opcodes {
    ($(($name:ident, $byte:literal, $mnemonic:literal),)+) => {
        /// Mnemonics for the implemented opcode subset, one variant per
        /// opcode byte.
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OPCode {
            $($name = $byte,)+
        }

        impl TryFrom<u8> for OPCode {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, u8> {
                match byte {
                    $($byte => Ok(Self::$name),)+
                    other => Err(other),
                }
            }
        }

        impl fmt::Display for OPCode {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$name => $mnemonic,)+
                })
            }
        }
    };
}

opcodes! {
    (NOP, 0x00, "nop"),
    (AConstNull, 0x01, "aconst_null"),
    (IconstM1, 0x02, "iconst_m1"),
    (Iconst0, 0x03, "iconst_0"),
    (Iconst1, 0x04, "iconst_1"),
    (Iconst2, 0x05, "iconst_2"),
    (Iconst3, 0x06, "iconst_3"),
    (Iconst4, 0x07, "iconst_4"),
    (Iconst5, 0x08, "iconst_5"),
    (Lconst0, 0x09, "lconst_0"),
    (Lconst1, 0x0A, "lconst_1"),
    (Fconst0, 0x0B, "fconst_0"),
    (Fconst1, 0x0C, "fconst_1"),
    (Fconst2, 0x0D, "fconst_2"),
    (Dconst0, 0x0E, "dconst_0"),
    (Dconst1, 0x0F, "dconst_1"),
    (BiPush, 0x10, "bipush"),
    (SiPush, 0x11, "sipush"),
    (ILoad, 0x15, "iload"),
    (LLoad, 0x16, "lload"),
    (FLoad, 0x17, "fload"),
    (DLoad, 0x18, "dload"),
    (ALoad, 0x19, "aload"),
    (ILoad0, 0x1A, "iload_0"),
    (ILoad1, 0x1B, "iload_1"),
    (ILoad2, 0x1C, "iload_2"),
    (ILoad3, 0x1D, "iload_3"),
    (LLoad0, 0x1E, "lload_0"),
    (LLoad1, 0x1F, "lload_1"),
    (LLoad2, 0x20, "lload_2"),
    (LLoad3, 0x21, "lload_3"),
    (FLoad0, 0x22, "fload_0"),
    (FLoad1, 0x23, "fload_1"),
    (FLoad2, 0x24, "fload_2"),
    (FLoad3, 0x25, "fload_3"),
    (DLoad0, 0x26, "dload_0"),
    (DLoad1, 0x27, "dload_1"),
    (DLoad2, 0x28, "dload_2"),
    (DLoad3, 0x29, "dload_3"),
    (ALoad0, 0x2A, "aload_0"),
    (ALoad1, 0x2B, "aload_1"),
    (ALoad2, 0x2C, "aload_2"),
    (ALoad3, 0x2D, "aload_3"),
    (IStore, 0x36, "istore"),
    (LStore, 0x37, "lstore"),
    (FStore, 0x38, "fstore"),
    (DStore, 0x39, "dstore"),
    (AStore, 0x3A, "astore"),
    (IStore0, 0x3B, "istore_0"),
    (IStore1, 0x3C, "istore_1"),
    (IStore2, 0x3D, "istore_2"),
    (IStore3, 0x3E, "istore_3"),
    (LStore0, 0x3F, "lstore_0"),
    (LStore1, 0x40, "lstore_1"),
    (LStore2, 0x41, "lstore_2"),
    (LStore3, 0x42, "lstore_3"),
    (FStore0, 0x43, "fstore_0"),
    (FStore1, 0x44, "fstore_1"),
    (FStore2, 0x45, "fstore_2"),
    (FStore3, 0x46, "fstore_3"),
    (DStore0, 0x47, "dstore_0"),
    (DStore1, 0x48, "dstore_1"),
    (DStore2, 0x49, "dstore_2"),
    (DStore3, 0x4A, "dstore_3"),
    (AStore0, 0x4B, "astore_0"),
    (AStore1, 0x4C, "astore_1"),
    (AStore2, 0x4D, "astore_2"),
    (AStore3, 0x4E, "astore_3"),
    (Pop, 0x57, "pop"),
    (Pop2, 0x58, "pop2"),
    (Dup, 0x59, "dup"),
    (DupX1, 0x5A, "dup_x1"),
    (DupX2, 0x5B, "dup_x2"),
    (Dup2, 0x5C, "dup2"),
    (Dup2X1, 0x5D, "dup2_x1"),
    (Dup2X2, 0x5E, "dup2_x2"),
    (Swap, 0x5F, "swap"),
    (IAdd, 0x60, "iadd"),
    (LAdd, 0x61, "ladd"),
    (FAdd, 0x62, "fadd"),
    (DAdd, 0x63, "dadd"),
    (ISub, 0x64, "isub"),
    (LSub, 0x65, "lsub"),
    (FSub, 0x66, "fsub"),
    (DSub, 0x67, "dsub"),
    (IMul, 0x68, "imul"),
    (LMul, 0x69, "lmul"),
    (FMul, 0x6A, "fmul"),
    (DMul, 0x6B, "dmul"),
    (IDiv, 0x6C, "idiv"),
    (LDiv, 0x6D, "ldiv"),
    (FDiv, 0x6E, "fdiv"),
    (DDiv, 0x6F, "ddiv"),
    (IRem, 0x70, "irem"),
    (LRem, 0x71, "lrem"),
    (FRem, 0x72, "frem"),
    (DRem, 0x73, "drem"),
    (INeg, 0x74, "ineg"),
    (LNeg, 0x75, "lneg"),
    (FNeg, 0x76, "fneg"),
    (DNeg, 0x77, "dneg"),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_opcode_bytes() {
        for byte in 0u8..=0xFF {
            if let Ok(opcode) = OPCode::try_from(byte) {
                assert_eq!(opcode as u8, byte);
            }
        }
    }

    #[test]
    fn rejects_unimplemented_bytes() {
        // ldc and goto are outside the implemented subset.
        assert_eq!(OPCode::try_from(0x12), Err(0x12));
        assert_eq!(OPCode::try_from(0xA7), Err(0xA7));
    }

    #[test]
    fn displays_jvm_mnemonics() {
        assert_eq!(OPCode::IconstM1.to_string(), "iconst_m1");
        assert_eq!(OPCode::DupX2.to_string(), "dup_x2");
        assert_eq!(OPCode::LRem.to_string(), "lrem");
    }
}
