//! Instruction decode and the fetch/execute loop.
//!
//! An instruction has two phases: `fetch` consumes its immediate bytes from
//! the code stream (no frame access), `execute` mutates the current frame.
//! The loop wires them together and keeps the thread pc in sync.
use crate::bytecode::OPCode;
use crate::runtime::{Frame, RuntimeError, Thread};
use tracing::trace;

/// Position-advancing view over a method's code bytes, separate from the
/// class file parse cursor: it carries an externally observable pc and
/// supports signed reads for branch offsets and immediates.
pub struct CodeReader<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> CodeReader<'a> {
    pub fn new(code: &'a [u8], pc: usize) -> Self {
        Self { code, pc }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn reset(&mut self, code: &'a [u8], pc: usize) {
        self.code = code;
        self.pc = pc;
    }

    pub fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        let byte = *self
            .code
            .get(self.pc)
            .ok_or(RuntimeError::TruncatedCode(self.pc))?;
        self.pc += 1;
        Ok(byte)
    }

    pub fn read_i8(&mut self) -> Result<i8, RuntimeError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let byte1 = u16::from(self.read_u8()?);
        let byte2 = u16::from(self.read_u8()?);
        Ok(byte1 << 8 | byte2)
    }

    pub fn read_i16(&mut self) -> Result<i16, RuntimeError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32, RuntimeError> {
        let byte1 = i32::from(self.read_u8()?);
        let byte2 = i32::from(self.read_u8()?);
        let byte3 = i32::from(self.read_u8()?);
        let byte4 = i32::from(self.read_u8()?);
        Ok(byte1 << 24 | byte2 << 16 | byte3 << 8 | byte4)
    }
}

/// A decoded instruction with its operands folded in. The fixed-index and
/// immediate encodings of one family collapse into a single variant: all of
/// `iconst_m1..5`, `bipush` and `sipush` become `IConst`, and `iload_0..3`
/// become `ILoad` with the index made explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Nop,
    AConstNull,
    IConst(i32),
    LConst(i64),
    FConst(f32),
    DConst(f64),
    ILoad(u16),
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IStore(u16),
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
}

impl Inst {
    /// Consumes the immediate bytes following `opcode`, advancing the
    /// reader past the whole instruction.
    pub fn fetch(opcode: OPCode, reader: &mut CodeReader) -> Result<Self, RuntimeError> {
        let inst = match opcode {
            OPCode::NOP => Inst::Nop,
            OPCode::AConstNull => Inst::AConstNull,
            OPCode::IconstM1 => Inst::IConst(-1),
            OPCode::Iconst0 => Inst::IConst(0),
            OPCode::Iconst1 => Inst::IConst(1),
            OPCode::Iconst2 => Inst::IConst(2),
            OPCode::Iconst3 => Inst::IConst(3),
            OPCode::Iconst4 => Inst::IConst(4),
            OPCode::Iconst5 => Inst::IConst(5),
            OPCode::Lconst0 => Inst::LConst(0),
            OPCode::Lconst1 => Inst::LConst(1),
            OPCode::Fconst0 => Inst::FConst(0.0),
            OPCode::Fconst1 => Inst::FConst(1.0),
            OPCode::Fconst2 => Inst::FConst(2.0),
            OPCode::Dconst0 => Inst::DConst(0.0),
            OPCode::Dconst1 => Inst::DConst(1.0),
            OPCode::BiPush => Inst::IConst(i32::from(reader.read_i8()?)),
            OPCode::SiPush => Inst::IConst(i32::from(reader.read_i16()?)),
            OPCode::ILoad => Inst::ILoad(u16::from(reader.read_u8()?)),
            OPCode::LLoad => Inst::LLoad(u16::from(reader.read_u8()?)),
            OPCode::FLoad => Inst::FLoad(u16::from(reader.read_u8()?)),
            OPCode::DLoad => Inst::DLoad(u16::from(reader.read_u8()?)),
            OPCode::ALoad => Inst::ALoad(u16::from(reader.read_u8()?)),
            OPCode::ILoad0 => Inst::ILoad(0),
            OPCode::ILoad1 => Inst::ILoad(1),
            OPCode::ILoad2 => Inst::ILoad(2),
            OPCode::ILoad3 => Inst::ILoad(3),
            OPCode::LLoad0 => Inst::LLoad(0),
            OPCode::LLoad1 => Inst::LLoad(1),
            OPCode::LLoad2 => Inst::LLoad(2),
            OPCode::LLoad3 => Inst::LLoad(3),
            OPCode::FLoad0 => Inst::FLoad(0),
            OPCode::FLoad1 => Inst::FLoad(1),
            OPCode::FLoad2 => Inst::FLoad(2),
            OPCode::FLoad3 => Inst::FLoad(3),
            OPCode::DLoad0 => Inst::DLoad(0),
            OPCode::DLoad1 => Inst::DLoad(1),
            OPCode::DLoad2 => Inst::DLoad(2),
            OPCode::DLoad3 => Inst::DLoad(3),
            OPCode::ALoad0 => Inst::ALoad(0),
            OPCode::ALoad1 => Inst::ALoad(1),
            OPCode::ALoad2 => Inst::ALoad(2),
            OPCode::ALoad3 => Inst::ALoad(3),
            OPCode::IStore => Inst::IStore(u16::from(reader.read_u8()?)),
            OPCode::LStore => Inst::LStore(u16::from(reader.read_u8()?)),
            OPCode::FStore => Inst::FStore(u16::from(reader.read_u8()?)),
            OPCode::DStore => Inst::DStore(u16::from(reader.read_u8()?)),
            OPCode::AStore => Inst::AStore(u16::from(reader.read_u8()?)),
            OPCode::IStore0 => Inst::IStore(0),
            OPCode::IStore1 => Inst::IStore(1),
            OPCode::IStore2 => Inst::IStore(2),
            OPCode::IStore3 => Inst::IStore(3),
            OPCode::LStore0 => Inst::LStore(0),
            OPCode::LStore1 => Inst::LStore(1),
            OPCode::LStore2 => Inst::LStore(2),
            OPCode::LStore3 => Inst::LStore(3),
            OPCode::FStore0 => Inst::FStore(0),
            OPCode::FStore1 => Inst::FStore(1),
            OPCode::FStore2 => Inst::FStore(2),
            OPCode::FStore3 => Inst::FStore(3),
            OPCode::DStore0 => Inst::DStore(0),
            OPCode::DStore1 => Inst::DStore(1),
            OPCode::DStore2 => Inst::DStore(2),
            OPCode::DStore3 => Inst::DStore(3),
            OPCode::AStore0 => Inst::AStore(0),
            OPCode::AStore1 => Inst::AStore(1),
            OPCode::AStore2 => Inst::AStore(2),
            OPCode::AStore3 => Inst::AStore(3),
            OPCode::Pop => Inst::Pop,
            OPCode::Pop2 => Inst::Pop2,
            OPCode::Dup => Inst::Dup,
            OPCode::DupX1 => Inst::DupX1,
            OPCode::DupX2 => Inst::DupX2,
            OPCode::Dup2 => Inst::Dup2,
            OPCode::Dup2X1 => Inst::Dup2X1,
            OPCode::Dup2X2 => Inst::Dup2X2,
            OPCode::Swap => Inst::Swap,
            OPCode::IAdd => Inst::IAdd,
            OPCode::LAdd => Inst::LAdd,
            OPCode::FAdd => Inst::FAdd,
            OPCode::DAdd => Inst::DAdd,
            OPCode::ISub => Inst::ISub,
            OPCode::LSub => Inst::LSub,
            OPCode::FSub => Inst::FSub,
            OPCode::DSub => Inst::DSub,
            OPCode::IMul => Inst::IMul,
            OPCode::LMul => Inst::LMul,
            OPCode::FMul => Inst::FMul,
            OPCode::DMul => Inst::DMul,
            OPCode::IDiv => Inst::IDiv,
            OPCode::LDiv => Inst::LDiv,
            OPCode::FDiv => Inst::FDiv,
            OPCode::DDiv => Inst::DDiv,
            OPCode::IRem => Inst::IRem,
            OPCode::LRem => Inst::LRem,
            OPCode::FRem => Inst::FRem,
            OPCode::DRem => Inst::DRem,
            OPCode::INeg => Inst::INeg,
            OPCode::LNeg => Inst::LNeg,
            OPCode::FNeg => Inst::FNeg,
            OPCode::DNeg => Inst::DNeg,
        };
        Ok(inst)
    }

    /// Executes the instruction against the current frame. Non-commutative
    /// arithmetic pops `v2` first, then `v1`, and computes `v1 OP v2`.
    pub fn execute(&self, frame: &mut Frame) -> Result<(), RuntimeError> {
        match self {
            Inst::Nop => {}
            Inst::AConstNull => frame.stack.push_reference(None),
            Inst::IConst(value) => frame.stack.push_int(*value),
            Inst::LConst(value) => frame.stack.push_long(*value),
            Inst::FConst(value) => frame.stack.push_float(*value),
            Inst::DConst(value) => frame.stack.push_double(*value),
            Inst::ILoad(index) => {
                let value = frame.locals.get_int(*index)?;
                frame.stack.push_int(value);
            }
            Inst::LLoad(index) => {
                let value = frame.locals.get_long(*index)?;
                frame.stack.push_long(value);
            }
            Inst::FLoad(index) => {
                let value = frame.locals.get_float(*index)?;
                frame.stack.push_float(value);
            }
            Inst::DLoad(index) => {
                let value = frame.locals.get_double(*index)?;
                frame.stack.push_double(value);
            }
            Inst::ALoad(index) => {
                let value = frame.locals.get_reference(*index)?;
                frame.stack.push_reference(value);
            }
            Inst::IStore(index) => {
                let value = frame.stack.pop_int()?;
                frame.locals.set_int(*index, value)?;
            }
            Inst::LStore(index) => {
                let value = frame.stack.pop_long()?;
                frame.locals.set_long(*index, value)?;
            }
            Inst::FStore(index) => {
                let value = frame.stack.pop_float()?;
                frame.locals.set_float(*index, value)?;
            }
            Inst::DStore(index) => {
                let value = frame.stack.pop_double()?;
                frame.locals.set_double(*index, value)?;
            }
            Inst::AStore(index) => {
                let value = frame.stack.pop_reference()?;
                frame.locals.set_reference(*index, value)?;
            }
            Inst::Pop => {
                frame.stack.pop_slot();
            }
            Inst::Pop2 => {
                frame.stack.pop_slot();
                frame.stack.pop_slot();
            }
            Inst::Dup => {
                let top = frame.stack.pop_slot();
                frame.stack.push_slot(top.clone());
                frame.stack.push_slot(top);
            }
            // [..., c, b, a] -> [..., c, a, b, a]
            Inst::DupX1 => {
                let slot1 = frame.stack.pop_slot();
                let slot2 = frame.stack.pop_slot();
                frame.stack.push_slot(slot1.clone());
                frame.stack.push_slot(slot2);
                frame.stack.push_slot(slot1);
            }
            // [..., c, b, a] -> [..., a, c, b, a]
            Inst::DupX2 => {
                let slot1 = frame.stack.pop_slot();
                let slot2 = frame.stack.pop_slot();
                let slot3 = frame.stack.pop_slot();
                frame.stack.push_slot(slot1.clone());
                frame.stack.push_slot(slot3);
                frame.stack.push_slot(slot2);
                frame.stack.push_slot(slot1);
            }
            // [..., b, a] -> [..., b, a, b, a]
            Inst::Dup2 => {
                let slot1 = frame.stack.pop_slot();
                let slot2 = frame.stack.pop_slot();
                frame.stack.push_slot(slot2.clone());
                frame.stack.push_slot(slot1.clone());
                frame.stack.push_slot(slot2);
                frame.stack.push_slot(slot1);
            }
            // [..., c, b, a] -> [..., b, a, c, b, a]
            Inst::Dup2X1 => {
                let slot1 = frame.stack.pop_slot();
                let slot2 = frame.stack.pop_slot();
                let slot3 = frame.stack.pop_slot();
                frame.stack.push_slot(slot2.clone());
                frame.stack.push_slot(slot1.clone());
                frame.stack.push_slot(slot3);
                frame.stack.push_slot(slot2);
                frame.stack.push_slot(slot1);
            }
            // [..., d, c, b, a] -> [..., b, a, d, c, b, a]
            Inst::Dup2X2 => {
                let slot1 = frame.stack.pop_slot();
                let slot2 = frame.stack.pop_slot();
                let slot3 = frame.stack.pop_slot();
                let slot4 = frame.stack.pop_slot();
                frame.stack.push_slot(slot2.clone());
                frame.stack.push_slot(slot1.clone());
                frame.stack.push_slot(slot4);
                frame.stack.push_slot(slot3);
                frame.stack.push_slot(slot2);
                frame.stack.push_slot(slot1);
            }
            Inst::Swap => {
                let slot1 = frame.stack.pop_slot();
                let slot2 = frame.stack.pop_slot();
                frame.stack.push_slot(slot1);
                frame.stack.push_slot(slot2);
            }
            Inst::IAdd => {
                let v2 = frame.stack.pop_int()?;
                let v1 = frame.stack.pop_int()?;
                frame.stack.push_int(v1.wrapping_add(v2));
            }
            Inst::LAdd => {
                let v2 = frame.stack.pop_long()?;
                let v1 = frame.stack.pop_long()?;
                frame.stack.push_long(v1.wrapping_add(v2));
            }
            Inst::FAdd => {
                let v2 = frame.stack.pop_float()?;
                let v1 = frame.stack.pop_float()?;
                frame.stack.push_float(v1 + v2);
            }
            Inst::DAdd => {
                let v2 = frame.stack.pop_double()?;
                let v1 = frame.stack.pop_double()?;
                frame.stack.push_double(v1 + v2);
            }
            Inst::ISub => {
                let v2 = frame.stack.pop_int()?;
                let v1 = frame.stack.pop_int()?;
                frame.stack.push_int(v1.wrapping_sub(v2));
            }
            Inst::LSub => {
                let v2 = frame.stack.pop_long()?;
                let v1 = frame.stack.pop_long()?;
                frame.stack.push_long(v1.wrapping_sub(v2));
            }
            Inst::FSub => {
                let v2 = frame.stack.pop_float()?;
                let v1 = frame.stack.pop_float()?;
                frame.stack.push_float(v1 - v2);
            }
            Inst::DSub => {
                let v2 = frame.stack.pop_double()?;
                let v1 = frame.stack.pop_double()?;
                frame.stack.push_double(v1 - v2);
            }
            Inst::IMul => {
                let v2 = frame.stack.pop_int()?;
                let v1 = frame.stack.pop_int()?;
                frame.stack.push_int(v1.wrapping_mul(v2));
            }
            Inst::LMul => {
                let v2 = frame.stack.pop_long()?;
                let v1 = frame.stack.pop_long()?;
                frame.stack.push_long(v1.wrapping_mul(v2));
            }
            Inst::FMul => {
                let v2 = frame.stack.pop_float()?;
                let v1 = frame.stack.pop_float()?;
                frame.stack.push_float(v1 * v2);
            }
            Inst::DMul => {
                let v2 = frame.stack.pop_double()?;
                let v1 = frame.stack.pop_double()?;
                frame.stack.push_double(v1 * v2);
            }
            Inst::IDiv => {
                let v2 = frame.stack.pop_int()?;
                let v1 = frame.stack.pop_int()?;
                if v2 == 0 {
                    return Err(RuntimeError::Arithmetic);
                }
                frame.stack.push_int(v1.wrapping_div(v2));
            }
            Inst::LDiv => {
                let v2 = frame.stack.pop_long()?;
                let v1 = frame.stack.pop_long()?;
                if v2 == 0 {
                    return Err(RuntimeError::Arithmetic);
                }
                frame.stack.push_long(v1.wrapping_div(v2));
            }
            Inst::FDiv => {
                let v2 = frame.stack.pop_float()?;
                let v1 = frame.stack.pop_float()?;
                frame.stack.push_float(v1 / v2);
            }
            Inst::DDiv => {
                let v2 = frame.stack.pop_double()?;
                let v1 = frame.stack.pop_double()?;
                frame.stack.push_double(v1 / v2);
            }
            Inst::IRem => {
                let v2 = frame.stack.pop_int()?;
                let v1 = frame.stack.pop_int()?;
                if v2 == 0 {
                    return Err(RuntimeError::Arithmetic);
                }
                frame.stack.push_int(v1.wrapping_rem(v2));
            }
            Inst::LRem => {
                let v2 = frame.stack.pop_long()?;
                let v1 = frame.stack.pop_long()?;
                if v2 == 0 {
                    return Err(RuntimeError::Arithmetic);
                }
                frame.stack.push_long(v1.wrapping_rem(v2));
            }
            Inst::FRem => {
                let v2 = frame.stack.pop_float()?;
                let v1 = frame.stack.pop_float()?;
                frame.stack.push_float(v1 % v2);
            }
            Inst::DRem => {
                let v2 = frame.stack.pop_double()?;
                let v1 = frame.stack.pop_double()?;
                frame.stack.push_double(v1 % v2);
            }
            Inst::INeg => {
                let value = frame.stack.pop_int()?;
                frame.stack.push_int(value.wrapping_neg());
            }
            Inst::LNeg => {
                let value = frame.stack.pop_long()?;
                frame.stack.push_long(value.wrapping_neg());
            }
            Inst::FNeg => {
                let value = frame.stack.pop_float()?;
                frame.stack.push_float(-value);
            }
            Inst::DNeg => {
                let value = frame.stack.pop_double()?;
                frame.stack.push_double(-value);
            }
        }
        Ok(())
    }
}

/// Decodes and executes the single instruction at the thread's pc.
///
/// The frame's `next_pc` is set to the first byte past the instruction
/// before execution so a branching instruction can override it; afterwards
/// it is copied back into the thread's pc register.
pub fn step(thread: &mut Thread, code: &[u8]) -> Result<(), RuntimeError> {
    let pc = thread.pc().max(0) as usize;
    let mut reader = CodeReader::new(code, pc);
    let byte = reader.read_u8()?;
    let opcode = OPCode::try_from(byte).map_err(RuntimeError::UnsupportedOpcode)?;
    let inst = Inst::fetch(opcode, &mut reader)?;
    trace!(pc, %opcode, "executing");
    let frame = thread.current_frame().ok_or(RuntimeError::EmptyFrameStack)?;
    frame.next_pc = reader.pc() as i32;
    inst.execute(frame)?;
    let next_pc = frame.next_pc;
    thread.set_pc(next_pc);
    Ok(())
}

/// Runs one method activation to completion on `thread`.
///
/// A frame sized by the method's Code attribute is pushed, instructions are
/// stepped until the pc runs off the end of the code array (the implemented
/// subset has no return opcodes), and the finished frame is popped and
/// returned for inspection. Errors abort mid-method and leave the frame in
/// place.
pub fn run_method(
    thread: &mut Thread,
    max_locals: u16,
    max_stack: u16,
    code: &[u8],
) -> Result<Frame, RuntimeError> {
    thread.push_frame(Frame::new(max_locals, max_stack))?;
    thread.set_pc(0);
    while (thread.pc() as usize) < code.len() {
        step(thread, code)?;
    }
    thread.pop_frame()
}
